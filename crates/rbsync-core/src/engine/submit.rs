//! Running post-review for one entry and following up on the result.

use crate::changelist::ChangelistEntry;
use crate::events::{OutcomeError, ReviewOutcome};
use crate::history::BuildLedger;
use crate::matching::ResponseLine;
use crate::postreview::{build_invocation, Target};

use super::{Disposition, ReconciliationEngine, SubmitError};

/// Description attached to an updated review request's draft.
pub(crate) fn change_description(change_number: Option<u64>, message: &str) -> String {
    let number = change_number.map_or_else(String::new, |n| n.to_string());
    format!("Changelist ID: {number}\n\nDescription: {message}")
}

impl ReconciliationEngine<'_> {
    /// Create a new review request and record it.
    pub(super) fn create(
        &self,
        entry: &ChangelistEntry,
        key: &str,
        ledger: &mut BuildLedger,
        warnings: &mut Vec<String>,
    ) -> Result<u64, SubmitError> {
        let change_number = entry.change_number.ok_or_else(|| {
            SubmitError::Configuration(
                "a change number is required to create a review request".to_string(),
            )
        })?;

        let review_id = self.submit(entry, key, &Target::Create { change_number })?;
        self.record(entry, key, review_id, ledger)?;
        tracing::info!(key, review_id, "Created review request #{review_id}");
        self.follow_up(entry, key, review_id, true, warnings);
        Ok(review_id)
    }

    /// Update `review_id`, recreating it when post-review reports it missing.
    pub(super) fn update(
        &self,
        entry: &ChangelistEntry,
        key: &str,
        review_id: u64,
        ledger: &mut BuildLedger,
        warnings: &mut Vec<String>,
    ) -> Result<Disposition, SubmitError> {
        if entry.files.is_empty() {
            return Err(SubmitError::Configuration(format!(
                "review request #{review_id} exists for {key}, but no files were supplied to update it"
            )));
        }

        let target = Target::Update {
            review_id,
            files: entry.files.clone(),
        };

        match self.submit(entry, key, &target) {
            Ok(posted) => {
                self.record(entry, key, posted, ledger)?;
                tracing::info!(key, review_id = posted, "Updated review request #{posted}");
                self.follow_up(entry, key, posted, false, warnings);
                Ok(Disposition::Updated { review_id: posted })
            }
            Err(err) if err.allows_recreate(review_id) => {
                tracing::warn!(
                    key,
                    review_id,
                    error = %err,
                    "Review request unavailable, creating a new one"
                );
                let created = self.create(entry, key, ledger, warnings)?;
                Ok(Disposition::Recreated {
                    previous: review_id,
                    review_id: created,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Run post-review once and return the review request id it reported.
    fn submit(
        &self,
        entry: &ChangelistEntry,
        key: &str,
        target: &Target,
    ) -> Result<u64, SubmitError> {
        if key.is_empty() {
            return Err(SubmitError::Configuration("correlation key is empty".to_string()));
        }
        if entry.author.trim().is_empty() {
            return Err(SubmitError::Configuration("change author is empty".to_string()));
        }
        let Some(launcher) = self.launcher else {
            return Err(SubmitError::Configuration(
                "no launcher is available to run post-review".to_string(),
            ));
        };

        let invocation = build_invocation(&self.settings.server, &entry.author, target);
        tracing::info!(command = %invocation, "Running post-review");

        let mut tool = launcher.launch(&invocation)?;
        let mut verdict = None;
        while let Some(line) = tool.next_line()? {
            tracing::debug!(">> {line}");
            verdict = self.responses.classify(&line);
            if verdict.is_some() {
                break;
            }
        }
        let exit_code = tool.finish()?;

        match (exit_code, verdict) {
            (0, Some(ResponseLine::Posted(id))) => Ok(id),
            (0, _) => Err(SubmitError::Protocol(
                "no review request id was found in its output".to_string(),
            )),
            (exit_code, verdict) => Err(SubmitError::Submission {
                exit_code,
                error_code: match verdict {
                    Some(ResponseLine::Failed(code)) => Some(code),
                    _ => None,
                },
            }),
        }
    }

    fn record(
        &self,
        entry: &ChangelistEntry,
        key: &str,
        review_id: u64,
        ledger: &mut BuildLedger,
    ) -> Result<(), SubmitError> {
        let outcome = ReviewOutcome::new(
            key,
            entry.change_number,
            review_id,
            entry.author.as_str(),
            entry.message.as_str(),
        )
        .map_err(|err| match err {
            OutcomeError::InvalidReviewId => {
                SubmitError::Protocol(format!("it reported review request #{review_id}"))
            }
            other => SubmitError::Configuration(other.to_string()),
        })?;
        ledger.record(outcome)?;
        Ok(())
    }

    /// Best-effort metadata and publish calls after a successful submission.
    fn follow_up(
        &self,
        entry: &ChangelistEntry,
        key: &str,
        review_id: u64,
        created: bool,
        warnings: &mut Vec<String>,
    ) {
        let publisher = &self.settings.publisher;
        let mut attempt = |what: &str, result: Result<(), crate::api::ApiError>| {
            if let Err(err) = result {
                tracing::warn!(review_id, error = %err, "Failed to {what}");
                warnings.push(format!("Failed to {what} on review request #{review_id}: {err}"));
            }
        };

        if created {
            attempt(
                "set reviewers",
                self.api
                    .set_reviewers(review_id, &publisher.reviewers_for(&entry.author)),
            );
            attempt("set bugs", self.api.set_bugs(review_id, key));
            attempt("set groups", self.api.set_groups(review_id, &publisher.groups()));
        } else {
            attempt(
                "set change description",
                self.api.set_change_description(
                    review_id,
                    &change_description(entry.change_number, &entry.message),
                ),
            );
        }

        if publisher.publish {
            attempt("publish", self.api.publish(review_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_description_template() {
        assert_eq!(
            change_description(Some(1234), "Fix the frobnicator"),
            "Changelist ID: 1234\n\nDescription: Fix the frobnicator"
        );
        assert_eq!(change_description(None, "x"), "Changelist ID: \n\nDescription: x");
    }
}
