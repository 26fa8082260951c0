//! Event types for the rbsync build ledger.
//!
//! Every fact rbsync persists is wrapped in a common envelope and serialized
//! as one JSON line. A build record is the set of events sharing a build number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common envelope for all events in the build ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Timestamp when the event was written
    pub ts: DateTime<Utc>,
    /// Build number the event belongs to
    pub build: u64,
    /// The event payload
    #[serde(flatten)]
    pub event: Event,
}

/// All possible events in the build ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    /// A build began reconciling its changelists
    BuildStarted(BuildStarted),
    /// A changelist was successfully submitted to the review system
    ReviewRecorded(ReviewOutcome),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStarted {
    /// Build timestamp; staleness is measured from this instant
    pub started_at: DateTime<Utc>,
}

/// Reasons a review outcome cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutcomeError {
    #[error("correlation key cannot be empty")]
    EmptyKey,
    #[error("review request id must be greater than zero")]
    InvalidReviewId,
    #[error("author cannot be empty")]
    EmptyAuthor,
}

/// Immutable record of one successfully submitted changelist.
///
/// Construction enforces a non-empty key and author and a positive review id,
/// including when deserializing from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOutcome")]
pub struct ReviewOutcome {
    correlation_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    change_number: Option<u64>,
    review_id: u64,
    author: String,
    change_description: String,
}

#[derive(Deserialize)]
struct RawOutcome {
    correlation_key: String,
    #[serde(default)]
    change_number: Option<u64>,
    review_id: u64,
    author: String,
    #[serde(default)]
    change_description: String,
}

impl TryFrom<RawOutcome> for ReviewOutcome {
    type Error = OutcomeError;

    fn try_from(raw: RawOutcome) -> Result<Self, Self::Error> {
        Self::new(
            raw.correlation_key,
            raw.change_number,
            raw.review_id,
            raw.author,
            raw.change_description,
        )
    }
}

impl ReviewOutcome {
    /// Create a review outcome, validating its invariants.
    pub fn new(
        correlation_key: impl Into<String>,
        change_number: Option<u64>,
        review_id: u64,
        author: impl Into<String>,
        change_description: impl Into<String>,
    ) -> Result<Self, OutcomeError> {
        let correlation_key = correlation_key.into();
        let author = author.into();

        if correlation_key.is_empty() {
            return Err(OutcomeError::EmptyKey);
        }
        if review_id == 0 {
            return Err(OutcomeError::InvalidReviewId);
        }
        if author.is_empty() {
            return Err(OutcomeError::EmptyAuthor);
        }

        Ok(Self {
            correlation_key,
            change_number,
            review_id,
            author,
            change_description: change_description.into(),
        })
    }

    #[must_use]
    pub fn correlation_key(&self) -> &str {
        &self.correlation_key
    }

    #[must_use]
    pub const fn change_number(&self) -> Option<u64> {
        self.change_number
    }

    #[must_use]
    pub const fn review_id(&self) -> u64 {
        self.review_id
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    #[must_use]
    pub fn change_description(&self) -> &str {
        &self.change_description
    }

    /// Case-insensitive comparison against a correlation key.
    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        self.correlation_key.to_lowercase() == key.to_lowercase()
    }
}

impl EventEnvelope {
    /// Create a new event envelope with the current timestamp.
    pub fn new(build: u64, event: Event) -> Self {
        Self {
            ts: Utc::now(),
            build,
            event,
        }
    }

    /// Serialize the envelope to a JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an envelope from a JSON line.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
