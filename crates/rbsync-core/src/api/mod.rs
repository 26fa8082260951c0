//! The review-system API consumed after post-review has run.
//!
//! Setting reviewers, bugs, groups, and change descriptions all act on the
//! pending draft of a review request; `publish` makes the draft public.

pub mod http;

pub use http::ReviewboardHttpApi;

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Failures talking to the review system.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} rejected the request: {message}")]
    Rejected { url: String, message: String },

    #[error("Unexpected response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

/// Operations on review requests and the user/group directory.
pub trait ReviewApi {
    /// Replace the draft's reviewers with a comma separated list of user names.
    fn set_reviewers(&self, review_id: u64, reviewers: &str) -> Result<(), ApiError>;

    /// Replace the draft's bugs closed with a comma separated list.
    fn set_bugs(&self, review_id: u64, bugs: &str) -> Result<(), ApiError>;

    /// Replace the draft's target groups with a comma separated list.
    fn set_groups(&self, review_id: u64, groups: &str) -> Result<(), ApiError>;

    /// Set the text describing what changed in this draft.
    fn set_change_description(&self, review_id: u64, text: &str) -> Result<(), ApiError>;

    fn publish(&self, review_id: u64) -> Result<(), ApiError>;

    /// User names matching `query`.
    fn query_users(&self, query: &str) -> Result<BTreeSet<String>, ApiError>;

    /// Group names matching `query`.
    fn query_groups(&self, query: &str) -> Result<BTreeSet<String>, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Reviewer,
    Group,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reviewer => f.write_str("Reviewer"),
            Self::Group => f.write_str("Group"),
        }
    }
}

/// A configured reviewer or group name the review system does not recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameProblem {
    NotFound {
        kind: NameKind,
        name: String,
    },
    Ambiguous {
        kind: NameKind,
        name: String,
        matches: Vec<String>,
    },
    /// Exactly one entry matched, but not with the same spelling
    Mismatch {
        kind: NameKind,
        name: String,
        suggestion: String,
    },
}

impl fmt::Display for NameProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { kind, name } => {
                write!(f, "{kind} \"{name}\" was not found in the review system")
            }
            Self::Ambiguous {
                kind,
                name,
                matches,
            } => write!(
                f,
                "{kind} \"{name}\" matched more than one entry: {}",
                matches.join(", ")
            ),
            Self::Mismatch {
                kind,
                name,
                suggestion,
            } => write!(
                f,
                "{kind} \"{name}\" did not match exactly (names are case-sensitive). Did you mean {suggestion}?"
            ),
        }
    }
}

/// Check that each name matches exactly one reviewer or group.
pub fn check_names(
    api: &dyn ReviewApi,
    kind: NameKind,
    names: &[String],
) -> Result<Vec<NameProblem>, ApiError> {
    let mut problems = Vec::new();
    for name in names {
        let found = match kind {
            NameKind::Reviewer => api.query_users(name)?,
            NameKind::Group => api.query_groups(name)?,
        };
        if let Some(problem) = classify_matches(kind, name, found) {
            problems.push(problem);
        }
    }
    Ok(problems)
}

fn classify_matches(kind: NameKind, name: &str, found: BTreeSet<String>) -> Option<NameProblem> {
    let name = name.to_string();
    match found.len() {
        0 => Some(NameProblem::NotFound { kind, name }),
        1 if found.contains(&name) => None,
        1 => Some(NameProblem::Mismatch {
            kind,
            name,
            suggestion: found.into_iter().next().unwrap_or_default(),
        }),
        _ => Some(NameProblem::Ambiguous {
            kind,
            name,
            matches: found.into_iter().collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Directory {
        users: Vec<&'static str>,
    }

    impl ReviewApi for Directory {
        fn set_reviewers(&self, _: u64, _: &str) -> Result<(), ApiError> {
            Ok(())
        }
        fn set_bugs(&self, _: u64, _: &str) -> Result<(), ApiError> {
            Ok(())
        }
        fn set_groups(&self, _: u64, _: &str) -> Result<(), ApiError> {
            Ok(())
        }
        fn set_change_description(&self, _: u64, _: &str) -> Result<(), ApiError> {
            Ok(())
        }
        fn publish(&self, _: u64) -> Result<(), ApiError> {
            Ok(())
        }
        fn query_users(&self, query: &str) -> Result<BTreeSet<String>, ApiError> {
            let query = query.to_lowercase();
            Ok(self
                .users
                .iter()
                .filter(|u| u.to_lowercase().starts_with(&query))
                .map(ToString::to_string)
                .collect())
        }
        fn query_groups(&self, _: &str) -> Result<BTreeSet<String>, ApiError> {
            Ok(BTreeSet::new())
        }
    }

    #[test]
    fn test_check_names() {
        let api = Directory {
            users: vec!["alice", "Bob", "carol", "carla"],
        };
        let names: Vec<String> = ["alice", "bob", "car", "zed"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let problems = check_names(&api, NameKind::Reviewer, &names).unwrap();
        assert_eq!(problems.len(), 3);
        assert_eq!(
            problems[0],
            NameProblem::Mismatch {
                kind: NameKind::Reviewer,
                name: "bob".to_string(),
                suggestion: "Bob".to_string(),
            }
        );
        assert!(matches!(problems[1], NameProblem::Ambiguous { ref matches, .. } if matches.len() == 2));
        assert!(matches!(problems[2], NameProblem::NotFound { .. }));
        assert!(problems[0].to_string().contains("Did you mean Bob?"));
    }

    #[test]
    fn test_groups_not_found() {
        let api = Directory { users: vec![] };
        let problems = check_names(&api, NameKind::Group, &["core".to_string()]).unwrap();
        assert_eq!(
            problems[0].to_string(),
            "Group \"core\" was not found in the review system"
        );
    }
}
