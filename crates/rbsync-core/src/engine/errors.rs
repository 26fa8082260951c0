//! Per-entry failures.

use std::time::Duration;

use thiserror::Error;

use crate::postreview::ToolError;

/// Why one changelist entry could not be reconciled.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Missing author, key, change number, files, or launcher.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The tool reported success without a usable review request id.
    #[error("post-review succeeded but {0}")]
    Protocol(String),

    /// The tool exited non-zero.
    #[error("post-review exited with code {exit_code}")]
    Submission {
        exit_code: i32,
        /// Error code parsed from the tool's output, if any
        error_code: Option<u64>,
    },

    #[error(transparent)]
    Launch(ToolError),

    #[error("post-review did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    /// Ledger or other storage failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ToolError> for SubmitError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::TimedOut(after) => Self::Timeout(after),
            other => Self::Launch(other),
        }
    }
}

impl SubmitError {
    /// Whether this failure lets an update fall back to creating `review_id` anew.
    #[must_use]
    pub const fn allows_recreate(&self, review_id: u64) -> bool {
        matches!(self, Self::Submission { error_code: Some(code), .. } if *code == review_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_recreate_only_for_matching_code() {
        let err = SubmitError::Submission {
            exit_code: 1,
            error_code: Some(42),
        };
        assert!(err.allows_recreate(42));
        assert!(!err.allows_recreate(43));
        assert!(!SubmitError::Submission {
            exit_code: 1,
            error_code: None
        }
        .allows_recreate(42));
        assert!(!SubmitError::Protocol("no id".to_string()).allows_recreate(42));
    }

    #[test]
    fn test_timeout_conversion() {
        let err = SubmitError::from(ToolError::TimedOut(Duration::from_secs(5)));
        assert!(matches!(err, SubmitError::Timeout(_)));
        assert_eq!(err.to_string(), "post-review did not finish within 5s");
    }
}
