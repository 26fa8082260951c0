//! Implementation of `rbsync doctor` health check command.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::cli::commands::helpers::load_settings;
use crate::output::{Formatter, OutputFormat};
use rbsync_core::api::{check_names, NameKind, ReviewboardHttpApi};
use rbsync_core::config::Settings;
use rbsync_core::history::BuildLedger;

/// Result of a single health check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl CheckResult {
    fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: "pass".to_string(),
            message: message.to_string(),
            remediation: None,
        }
    }

    fn fail(name: &str, message: &str, remediation: &str) -> Self {
        Self {
            name: name.to_string(),
            status: "fail".to_string(),
            message: message.to_string(),
            remediation: Some(remediation.to_string()),
        }
    }

    fn warn(name: &str, message: &str, remediation: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            status: "warn".to_string(),
            message: message.to_string(),
            remediation: remediation.map(ToString::to_string),
        }
    }
}

/// Overall health status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checks: Vec<CheckResult>,
}

/// Run the health checks. Returns whether every check passed or warned.
#[tracing::instrument(skip(format))]
pub fn run_doctor(root: &Path, config: Option<&Path>, format: OutputFormat) -> Result<bool> {
    let mut checks = Vec::new();

    match load_settings(root, config) {
        Ok(settings) => {
            checks.push(CheckResult::pass("settings", "Settings loaded"));
            checks.extend(check_validation(&settings));
            checks.push(check_tool(&settings));
            checks.push(check_ledger(root));
            checks.extend(check_defaults(&settings));
        }
        Err(e) => {
            checks.push(CheckResult::fail(
                "settings",
                &format!("{e:#}"),
                "Fix .rbsync/config.toml or pass --config",
            ));
            checks.push(check_ledger(root));
        }
    }

    let healthy = checks.iter().all(|c| c.status != "fail");
    let report = HealthReport { healthy, checks };
    Formatter::new(format).print(&report)?;
    Ok(healthy)
}

fn check_validation(settings: &Settings) -> Vec<CheckResult> {
    match settings.validate() {
        Ok(warnings) if warnings.is_empty() => {
            vec![CheckResult::pass("validation", "Settings are valid")]
        }
        Ok(warnings) => warnings
            .iter()
            .map(|w| CheckResult::warn("validation", w, None))
            .collect(),
        Err(e) => vec![CheckResult::fail(
            "validation",
            &e.to_string(),
            "Correct the reported setting",
        )],
    }
}

fn check_tool(settings: &Settings) -> CheckResult {
    match settings.server.locate_tool() {
        Ok(path) => CheckResult::pass(
            "post_review",
            &format!("post-review found at {}", path.display()),
        ),
        Err(e) => CheckResult::fail(
            "post_review",
            &format!("{} not found: {e}", settings.server.cmd_path),
            "Install RBTools or set server.cmd_path",
        ),
    }
}

fn check_ledger(root: &Path) -> CheckResult {
    match BuildLedger::open_file(root) {
        Ok(ledger) => CheckResult::pass(
            "ledger",
            &format!("{} build records", ledger.history().len()),
        ),
        Err(e) => CheckResult::fail(
            "ledger",
            &format!("{e:#}"),
            "Repair or remove .rbsync/builds.jsonl",
        ),
    }
}

/// Confirm each default reviewer and group names exactly one entry.
fn check_defaults(settings: &Settings) -> Vec<CheckResult> {
    let reviewers = settings.publisher.default_reviewer_list();
    let groups = settings.publisher.default_group_list();
    if settings.server.url.trim().is_empty() || (reviewers.is_empty() && groups.is_empty()) {
        return Vec::new();
    }

    let api = match ReviewboardHttpApi::new(&settings.server) {
        Ok(api) => api,
        Err(e) => return vec![CheckResult::warn("review_system", &e.to_string(), None)],
    };

    [
        ("default_reviewers", NameKind::Reviewer, reviewers),
        ("default_groups", NameKind::Group, groups),
    ]
    .into_iter()
    .filter(|(_, _, names)| !names.is_empty())
    .map(|(name, kind, names)| match check_names(&api, kind, &names) {
        Ok(problems) if problems.is_empty() => CheckResult::pass(name, "All names resolve"),
        Ok(problems) => {
            let message = problems
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            CheckResult::fail(name, &message, "Names are case-sensitive; use the exact name")
        }
        Err(e) => CheckResult::warn(
            name,
            &format!("Could not query the review system: {e}"),
            Some("Check server.url and credentials"),
        ),
    })
    .collect()
}
