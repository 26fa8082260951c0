//! Implementation of `rbsync prune`.

use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::output::{Formatter, OutputFormat};
use rbsync_core::history::BuildLedger;

#[derive(Debug, Serialize)]
struct PruneOutput {
    removed: Vec<u64>,
    retained: usize,
}

/// Discard all but the newest `keep` build records.
#[tracing::instrument(skip(format))]
pub fn run_prune(root: &Path, keep: usize, format: OutputFormat) -> Result<bool> {
    if keep == 0 {
        bail!("--keep must be at least 1");
    }

    let mut ledger = BuildLedger::open_file(root)?;
    let removed = ledger.prune(keep)?;
    if !removed.is_empty() {
        tracing::info!(removed = removed.len(), "Pruned build records");
    }

    Formatter::new(format).print(&PruneOutput {
        removed,
        retained: ledger.history().len(),
    })?;
    Ok(true)
}
