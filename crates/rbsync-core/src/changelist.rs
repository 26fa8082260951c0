//! Changelist entries handed to rbsync by the build host.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One recorded set of source changes observed by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelistEntry {
    /// Source-control user who submitted the change
    pub author: String,
    /// Free-text change description
    pub message: String,
    /// Depot paths touched by the change
    #[serde(default)]
    pub files: Vec<String>,
    /// Numeric change number, when the SCM provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_number: Option<u64>,
}

impl ChangelistEntry {
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
            files: Vec::new(),
            change_number: None,
        }
    }

    #[must_use]
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_change_number(mut self, change_number: u64) -> Self {
        self.change_number = Some(change_number);
        self
    }
}

/// Accepted shapes for a changes document.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChangesDocument {
    List(Vec<ChangelistEntry>),
    Wrapped { changes: Vec<ChangelistEntry> },
}

/// Parse changelist entries from JSON.
///
/// Accepts either a bare array of entries or an object with a `changes` array.
pub fn parse_changes(json: &str) -> Result<Vec<ChangelistEntry>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: ChangesDocument =
        serde_json::from_str(json).context("Failed to parse changelist entries")?;

    Ok(match document {
        ChangesDocument::List(changes) | ChangesDocument::Wrapped { changes } => changes,
    })
}
