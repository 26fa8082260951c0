//! Reconciliation of one build's changelist against the review system.
//!
//! Each entry moves through extract, decide, and locate steps, then is
//! submitted through post-review as a create or an update. A failed update
//! whose error names the review being updated is retried once as a create.
//! Successful submissions are recorded on the current build so later builds
//! (and later entries of the same build) update instead of duplicating.

mod errors;
mod report;
mod submit;

pub use errors::SubmitError;
pub use report::{Disposition, EntryReport, RunCounts, RunReport};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::ReviewApi;
use crate::changelist::ChangelistEntry;
use crate::config::{ConfigError, Settings};
use crate::events::ReviewOutcome;
use crate::history::{BuildLedger, BuildRecord, HistorySearcher};
use crate::matching::{ActionDirective, KeyExtractor, OverrideParser, ResponseParser};
use crate::postreview::Launcher;

/// What the engine intends to do with an entry, before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// No correlation key
    Ignore,
    Skip {
        key: String,
        directive: ActionDirective,
        existing: Option<u64>,
    },
    Create {
        key: String,
        directive: ActionDirective,
    },
    Update {
        key: String,
        directive: ActionDirective,
        review_id: u64,
    },
}

impl Decision {
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Ignore => None,
            Self::Skip { key, .. } | Self::Create { key, .. } | Self::Update { key, .. } => {
                Some(key)
            }
        }
    }

    #[must_use]
    pub const fn directive(&self) -> Option<ActionDirective> {
        match self {
            Self::Ignore => None,
            Self::Skip { directive, .. }
            | Self::Create { directive, .. }
            | Self::Update { directive, .. } => Some(*directive),
        }
    }
}

/// Drives changelist entries through post-review and the review API.
pub struct ReconciliationEngine<'a> {
    settings: &'a Settings,
    launcher: Option<&'a dyn Launcher>,
    api: &'a dyn ReviewApi,
    keys: KeyExtractor,
    directives: OverrideParser,
    searcher: HistorySearcher,
    responses: ResponseParser,
}

impl std::fmt::Debug for ReconciliationEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("keys", &self.keys)
            .field("directives", &self.directives)
            .field("searcher", &self.searcher)
            .field("has_launcher", &self.launcher.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> ReconciliationEngine<'a> {
    /// Compile the configured patterns and policies.
    ///
    /// A missing launcher is not an error here; entries that need to submit
    /// fail individually instead.
    pub fn new(
        settings: &'a Settings,
        launcher: Option<&'a dyn Launcher>,
        api: &'a dyn ReviewApi,
    ) -> Result<Self, ConfigError> {
        let publisher = &settings.publisher;
        Ok(Self {
            settings,
            launcher,
            api,
            keys: KeyExtractor::new(publisher.key_pattern.as_deref())?,
            directives: OverrideParser::new(
                publisher.skip_unflagged,
                publisher.require_explicit_update,
            ),
            searcher: HistorySearcher::new(publisher.staleness()?),
            responses: ResponseParser::new()?,
        })
    }

    #[must_use]
    pub const fn searcher(&self) -> &HistorySearcher {
        &self.searcher
    }

    /// Decide what to do with `entry` given build history starting at `head`.
    pub fn decide<R: BuildRecord + Copy>(
        &self,
        entry: &ChangelistEntry,
        head: Option<R>,
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(key) = self.keys.extract(&entry.message) else {
            tracing::trace!(author = %entry.author, "No correlation key, ignoring change");
            return Decision::Ignore;
        };

        let resolution = self
            .directives
            .resolve(&entry.message, &key, head, &self.searcher, now);
        let directive = resolution.directive;

        match directive {
            ActionDirective::Skip => {
                let existing = self.searcher.find_at(head, &key, now);
                match existing {
                    Some(review_id) if !resolution.explicit => tracing::info!(
                        key = %key,
                        review_id,
                        "Existing review ignored, {} is required to update it",
                        ActionDirective::ForceUpdate
                    ),
                    _ => tracing::info!(
                        key = %key,
                        explicit = resolution.explicit,
                        "Skipping change"
                    ),
                }
                Decision::Skip {
                    key,
                    directive,
                    existing,
                }
            }
            ActionDirective::ForceNew => {
                tracing::info!(key = %key, "Creating a new review request as requested");
                Decision::Create { key, directive }
            }
            ActionDirective::ForceUpdate | ActionDirective::None => {
                match self.searcher.find_at(head, &key, now) {
                    Some(review_id) => {
                        tracing::info!(key = %key, review_id, "Updating existing review request");
                        Decision::Update {
                            key,
                            directive,
                            review_id,
                        }
                    }
                    None => {
                        if resolution.explicit && directive == ActionDirective::ForceUpdate {
                            tracing::info!(
                                key = %key,
                                "No existing review request to update, creating one instead"
                            );
                        } else {
                            tracing::info!(key = %key, "Creating review request");
                        }
                        Decision::Create { key, directive }
                    }
                }
            }
        }
    }

    /// Reconcile `entries` as build `build` (the next build when `None`).
    ///
    /// Entry failures are captured in the report. Only ledger failures
    /// starting the build abort the run.
    pub fn run(
        &self,
        entries: &[ChangelistEntry],
        ledger: &mut BuildLedger,
        build: Option<u64>,
    ) -> Result<RunReport> {
        let build = ledger.begin_build(build, Utc::now())?;
        let mut report = RunReport::new(build, false);

        tracing::info!(build, entries = entries.len(), "Reconciling changelist");

        for entry in entries {
            report.entries.push(self.process_entry(entry, ledger));
        }

        let counts = report.counts();
        tracing::info!(
            build,
            created = counts.created,
            updated = counts.updated,
            skipped = counts.skipped,
            failed = counts.failed,
            "Reconciliation finished"
        );
        Ok(report)
    }

    /// Report what `run` would do without launching anything or recording.
    ///
    /// Decisions are made against a detached copy of `ledger` that collects
    /// the outcomes the run would record, so a key repeated within the build
    /// plans as create then update, as it would run. Reviews this run would
    /// create have no id yet and are reported without one.
    pub fn plan(
        &self,
        entries: &[ChangelistEntry],
        ledger: &BuildLedger,
        build: Option<u64>,
    ) -> Result<RunReport> {
        let mut scratch = ledger.detached()?;
        let now = Utc::now();
        let build = scratch.begin_build(build, now)?;
        let mut report = RunReport::new(build, true);

        // Stand-in ids for planned creates count down from the top of the range
        let mut next_placeholder = u64::MAX;
        let known = |id: u64, next: u64| (id <= next).then_some(id);

        for entry in entries {
            let decision = self.decide(entry, scratch.head(), now);
            let (disposition, planned) = match &decision {
                Decision::Ignore => (Disposition::Ignored, None),
                Decision::Skip { existing, .. } => (
                    Disposition::Skipped {
                        existing: existing.and_then(|id| known(id, next_placeholder)),
                    },
                    None,
                ),
                Decision::Create { key, .. } => {
                    let planned = entry.change_number.map(|_| {
                        let id = next_placeholder;
                        next_placeholder -= 1;
                        (key, id)
                    });
                    (Disposition::WouldCreate, planned)
                }
                Decision::Update { key, review_id, .. } => (
                    Disposition::WouldUpdate {
                        review_id: known(*review_id, next_placeholder),
                    },
                    (!entry.files.is_empty()).then_some((key, *review_id)),
                ),
            };

            if let Some((key, id)) = planned {
                let outcome = ReviewOutcome::new(
                    key.as_str(),
                    entry.change_number,
                    id,
                    entry.author.as_str(),
                    entry.message.as_str(),
                );
                if let Ok(outcome) = outcome {
                    scratch.record(outcome)?;
                }
            }
            report.entries.push(entry_report(entry, &decision, disposition));
        }
        Ok(report)
    }

    #[tracing::instrument(
        skip(self, entry, ledger),
        fields(author = %entry.author, change = ?entry.change_number)
    )]
    fn process_entry(&self, entry: &ChangelistEntry, ledger: &mut BuildLedger) -> EntryReport {
        let decision = self.decide(entry, ledger.head(), Utc::now());
        let mut warnings = Vec::new();

        let disposition = match &decision {
            Decision::Ignore => Ok(Disposition::Ignored),
            Decision::Skip { existing, .. } => Ok(Disposition::Skipped {
                existing: *existing,
            }),
            Decision::Create { key, .. } => self
                .create(entry, key, ledger, &mut warnings)
                .map(|review_id| Disposition::Created { review_id }),
            Decision::Update { key, review_id, .. } => {
                self.update(entry, key, *review_id, ledger, &mut warnings)
            }
        }
        .unwrap_or_else(|err| {
            tracing::error!(key = ?decision.key(), error = %err, "Failed to submit change");
            Disposition::Failed {
                error: err.to_string(),
            }
        });

        let mut report = entry_report(entry, &decision, disposition);
        report.warnings = warnings;
        report
    }
}

fn entry_report(entry: &ChangelistEntry, decision: &Decision, disposition: Disposition) -> EntryReport {
    EntryReport {
        author: entry.author.clone(),
        change_number: entry.change_number,
        key: decision.key().map(ToString::to_string),
        directive: decision.directive(),
        disposition,
        warnings: Vec::new(),
    }
}
