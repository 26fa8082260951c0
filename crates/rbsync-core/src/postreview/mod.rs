//! Command-line construction for the external post-review tool.
//!
//! The tool either creates a review request from a change number or updates
//! an existing request (`-r <id>`) from a list of files. Flags always come
//! before positional arguments.

pub mod launcher;

pub use launcher::{Launcher, ProcessLauncher, RunningTool, ToolError};

use std::fmt;

use serde::Serialize;

use crate::config::ServerSettings;

const PASSWORD_FLAG: &str = "--password=";

/// What a post-review run should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Target {
    /// Post a new review request for a change number
    Create { change_number: u64 },
    /// Post an updated diff for an existing review request
    Update { review_id: u64, files: Vec<String> },
}

impl Target {
    /// Review request being updated, if any.
    #[must_use]
    pub const fn review_id(&self) -> Option<u64> {
        match self {
            Self::Create { .. } => None,
            Self::Update { review_id, .. } => Some(*review_id),
        }
    }

    #[must_use]
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Create { .. })
    }
}

/// A fully-resolved program and argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Render for logs with the password value masked.
    #[must_use]
    pub fn redacted(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|arg| {
            if arg.starts_with(PASSWORD_FLAG) {
                format!("{PASSWORD_FLAG}********")
            } else {
                arg.clone()
            }
        }));
        parts.join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Build the post-review invocation submitting on behalf of `author`.
#[must_use]
pub fn build_invocation(server: &ServerSettings, author: &str, target: &Target) -> Invocation {
    let mut args = Vec::new();

    if let Target::Update { review_id, .. } = target {
        args.push("-r".to_string());
        args.push(review_id.to_string());
    }

    args.push(format!("--server={}", server.url));
    args.push(format!("--username={}", server.username));
    args.push(format!("{PASSWORD_FLAG}{}", server.password));
    args.push(format!("--submit-as={author}"));

    if let Some(client) = server.scm_client.as_deref().filter(|c| !c.is_empty()) {
        args.push(format!("--scm-client={client}"));
    }

    match target {
        Target::Create { change_number } => args.push(change_number.to_string()),
        Target::Update { files, .. } => args.extend(files.iter().cloned()),
    }

    Invocation {
        program: server.cmd_path.clone(),
        args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ServerSettings {
        ServerSettings {
            url: "https://reviews.example.com".to_string(),
            username: "builder".to_string(),
            password: "hunter2".to_string(),
            ..ServerSettings::default()
        }
    }

    #[test]
    fn test_create_shape() {
        let inv = build_invocation(
            &server(),
            "alice",
            &Target::Create {
                change_number: 1234,
            },
        );
        assert_eq!(inv.program, "post-review");
        assert_eq!(
            inv.args,
            vec![
                "--server=https://reviews.example.com",
                "--username=builder",
                "--password=hunter2",
                "--submit-as=alice",
                "1234",
            ]
        );
    }

    #[test]
    fn test_update_shape_with_scm_client() {
        let mut server = server();
        server.scm_client = Some("build-ws".to_string());
        let inv = build_invocation(
            &server,
            "bob",
            &Target::Update {
                review_id: 42,
                files: vec!["//depot/a.c".to_string(), "//depot/b.c".to_string()],
            },
        );
        assert_eq!(
            inv.args,
            vec![
                "-r",
                "42",
                "--server=https://reviews.example.com",
                "--username=builder",
                "--password=hunter2",
                "--submit-as=bob",
                "--scm-client=build-ws",
                "//depot/a.c",
                "//depot/b.c",
            ]
        );
    }

    #[test]
    fn test_empty_scm_client_omitted() {
        let mut server = server();
        server.scm_client = Some(String::new());
        let inv = build_invocation(&server, "a", &Target::Create { change_number: 1 });
        assert!(!inv.args.iter().any(|a| a.starts_with("--scm-client")));
    }

    #[test]
    fn test_redacted_masks_password() {
        let inv = build_invocation(&server(), "alice", &Target::Create { change_number: 7 });
        let shown = inv.redacted();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("--password=********"));
        assert_eq!(inv.to_string(), shown);
    }

    #[test]
    fn test_target_accessors() {
        let update = Target::Update {
            review_id: 9,
            files: vec![],
        };
        assert_eq!(update.review_id(), Some(9));
        assert!(!update.is_create());
        assert!(Target::Create { change_number: 1 }.is_create());
    }
}
