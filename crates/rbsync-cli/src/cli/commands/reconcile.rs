//! Implementation of `rbsync reconcile`.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::cli::commands::helpers::read_changes;
use crate::output::{Formatter, OutputFormat};
use rbsync_core::api::ReviewboardHttpApi;
use rbsync_core::config::Settings;
use rbsync_core::engine::{EntryReport, ReconciliationEngine, RunCounts, RunReport};
use rbsync_core::history::BuildLedger;
use rbsync_core::postreview::ProcessLauncher;

#[derive(Serialize)]
struct Summary {
    build: u64,
    dry_run: bool,
    passed: bool,
    #[serde(flatten)]
    counts: RunCounts,
}

#[derive(Serialize)]
struct ReconcileOutput<'a> {
    #[serde(flatten)]
    summary: Summary,
    entries: &'a [EntryReport],
}

#[derive(Serialize)]
struct AbortedOutput {
    passed: bool,
    error: String,
}

/// Reconcile one build's changelist. Returns the step result.
///
/// Failures that stop the whole run (invalid settings, an unreadable
/// changes file, ledger errors) are logged and fail the step only when
/// `publisher.fail_build_on_error` is set, like failures of single entries.
#[tracing::instrument(skip(settings, format))]
pub fn run_reconcile(
    root: &Path,
    settings: &Settings,
    changes: &Path,
    build: Option<u64>,
    dry_run: bool,
    format: OutputFormat,
) -> Result<bool> {
    let fail_build = settings.publisher.fail_build_on_error;

    match reconcile(root, settings, changes, build, dry_run) {
        Ok(report) => {
            let passed = report.step_passed(fail_build);
            if !report.succeeded() && passed {
                tracing::warn!("Some changes failed; not failing the build");
            }
            print_report(&report, passed, format)?;
            Ok(passed)
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "Reconciliation did not run");
            if !fail_build {
                tracing::warn!("Not failing the build; publisher.fail_build_on_error is off");
            }
            Formatter::new(format).print(&AbortedOutput {
                passed: !fail_build,
                error: format!("{err:#}"),
            })?;
            Ok(!fail_build)
        }
    }
}

fn reconcile(
    root: &Path,
    settings: &Settings,
    changes: &Path,
    build: Option<u64>,
    dry_run: bool,
) -> Result<RunReport> {
    for warning in settings.validate()? {
        tracing::warn!("{warning}");
    }

    let entries = read_changes(changes)?;
    let launcher = ProcessLauncher::new(settings.server.tool_timeout());
    let api = ReviewboardHttpApi::new(&settings.server)?;
    let engine = ReconciliationEngine::new(settings, Some(&launcher), &api)?;

    let mut ledger = BuildLedger::open_file(root)?;
    if dry_run {
        engine.plan(&entries, &ledger, build)
    } else {
        engine.run(&entries, &mut ledger, build)
    }
}

fn print_report(report: &RunReport, passed: bool, format: OutputFormat) -> Result<()> {
    let summary = Summary {
        build: report.build,
        dry_run: report.dry_run,
        passed,
        counts: report.counts(),
    };
    let formatter = Formatter::new(format);

    match format {
        OutputFormat::Json => formatter.print(&ReconcileOutput {
            summary,
            entries: &report.entries,
        }),
        OutputFormat::Text => {
            formatter.print(&summary)?;
            if !report.entries.is_empty() {
                formatter.print(&report.entries)?;
            }
            Ok(())
        }
    }
}
