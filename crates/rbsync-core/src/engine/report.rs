//! What happened to each entry of a run.

use serde::Serialize;

use crate::matching::ActionDirective;

/// Final state of one changelist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Disposition {
    /// No correlation key in the description
    Ignored,
    /// Skipped by directive; `existing` is the review that was left alone
    Skipped { existing: Option<u64> },
    Created { review_id: u64 },
    Updated { review_id: u64 },
    /// Updating `previous` failed, so a new review request was created
    Recreated { previous: u64, review_id: u64 },
    Failed { error: String },
    /// Dry run: a review request would be created
    WouldCreate,
    /// Dry run: this review request would be updated; `None` when it is the
    /// one an earlier entry of the same run would create
    WouldUpdate { review_id: Option<u64> },
}

impl Disposition {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Review request the entry ended up on, if one was posted.
    #[must_use]
    pub const fn review_id(&self) -> Option<u64> {
        match self {
            Self::Created { review_id }
            | Self::Updated { review_id }
            | Self::Recreated { review_id, .. } => Some(*review_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub author: String,
    pub change_number: Option<u64>,
    pub key: Option<String>,
    pub directive: Option<ActionDirective>,
    pub disposition: Disposition,
    /// Post-processing calls that failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Outcome of reconciling one build's changelist.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub build: u64,
    pub dry_run: bool,
    pub entries: Vec<EntryReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub ignored: usize,
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl RunReport {
    #[must_use]
    pub const fn new(build: u64, dry_run: bool) -> Self {
        Self {
            build,
            dry_run,
            entries: Vec::new(),
        }
    }

    /// True when no entry failed. An empty run succeeds.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.entries.iter().any(|e| e.disposition.is_failure())
    }

    /// Step result after applying the fail-build-on-error policy.
    #[must_use]
    pub fn step_passed(&self, fail_build_on_error: bool) -> bool {
        self.succeeded() || !fail_build_on_error
    }

    #[must_use]
    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts::default();
        for entry in &self.entries {
            match entry.disposition {
                Disposition::Ignored => counts.ignored += 1,
                Disposition::Skipped { .. } => counts.skipped += 1,
                Disposition::Created { .. }
                | Disposition::Recreated { .. }
                | Disposition::WouldCreate => counts.created += 1,
                Disposition::Updated { .. } | Disposition::WouldUpdate { .. } => {
                    counts.updated += 1;
                }
                Disposition::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(disposition: Disposition) -> EntryReport {
        EntryReport {
            author: "alice".to_string(),
            change_number: Some(1),
            key: Some("ABC-1".to_string()),
            directive: None,
            disposition,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_empty_run_passes() {
        let report = RunReport::new(1, false);
        assert!(report.succeeded());
        assert!(report.step_passed(true));
    }

    #[test]
    fn test_failure_downgraded_unless_fail_build() {
        let mut report = RunReport::new(1, false);
        report.entries.push(entry(Disposition::Created { review_id: 1 }));
        report.entries.push(entry(Disposition::Failed {
            error: "boom".to_string(),
        }));
        assert!(!report.succeeded());
        assert!(report.step_passed(false));
        assert!(!report.step_passed(true));
    }

    #[test]
    fn test_counts() {
        let mut report = RunReport::new(3, false);
        for d in [
            Disposition::Ignored,
            Disposition::Skipped { existing: None },
            Disposition::Created { review_id: 1 },
            Disposition::Recreated {
                previous: 1,
                review_id: 2,
            },
            Disposition::Updated { review_id: 3 },
        ] {
            report.entries.push(entry(d));
        }
        let counts = report.counts();
        assert_eq!(counts.ignored, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.created, 2);
        assert_eq!(counts.updated, 1);
        assert_eq!(counts.failed, 0);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(entry(Disposition::Recreated {
            previous: 42,
            review_id: 99,
        }))
        .unwrap();
        assert_eq!(json["disposition"]["status"], "recreated");
        assert_eq!(json["disposition"]["review_id"], 99);
        assert!(json.get("warnings").is_none());
    }
}
