//! Implementation of `rbsync history` and `rbsync find`.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::output::{Formatter, OutputFormat};
use rbsync_core::config::Settings;
use rbsync_core::history::{BuildHistory, BuildLedger, HistorySearcher};

/// One recorded outcome, flattened with its build.
#[derive(Debug, Serialize)]
struct OutcomeRow {
    build: u64,
    key: String,
    review_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    change_number: Option<u64>,
    author: String,
    recorded_at: DateTime<Utc>,
}

fn outcome_rows(
    history: &BuildHistory,
    key: Option<&str>,
    limit: Option<usize>,
) -> Vec<OutcomeRow> {
    history
        .newest_first()
        .flat_map(|build| build.outcomes.iter().rev().map(move |o| (build, o)))
        .filter(|(_, o)| key.map_or(true, |k| o.matches_key(k)))
        .take(limit.unwrap_or(usize::MAX))
        .map(|(build, o)| OutcomeRow {
            build: build.number,
            key: o.correlation_key().to_string(),
            review_id: o.review_id(),
            change_number: o.change_number(),
            author: o.author().to_string(),
            recorded_at: build.started_at,
        })
        .collect()
}

/// List recorded outcomes, newest first.
#[tracing::instrument(skip(format))]
pub fn run_history(
    root: &Path,
    key: Option<&str>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<bool> {
    let ledger = BuildLedger::open_file(root)?;
    let rows = outcome_rows(ledger.history(), key, limit);
    Formatter::new(format).print_list(&rows, "No review outcomes recorded", "outcomes")?;
    Ok(true)
}

#[derive(Debug, Serialize)]
struct FindOutput {
    key: String,
    review_id: Option<u64>,
    build: Option<u64>,
    builds_searched: usize,
}

/// Report the review an update for `key` would target. Fails when none is found.
#[tracing::instrument(skip(settings, format))]
pub fn run_find(root: &Path, settings: &Settings, key: &str, format: OutputFormat) -> Result<bool> {
    let ledger = BuildLedger::open_file(root)?;
    let searcher = HistorySearcher::new(settings.publisher.staleness()?);

    let found = searcher.locate_at(ledger.head(), key, Utc::now());
    let output = FindOutput {
        key: key.to_string(),
        review_id: found.map(|m| m.review_id),
        build: found.map(|m| m.build),
        builds_searched: found.map_or(ledger.history().len(), |m| m.visited),
    };

    Formatter::new(format).print(&output)?;
    Ok(found.is_some())
}
