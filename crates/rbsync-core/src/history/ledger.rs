//! The build ledger: persisted event log plus its projected history.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use super::{BuildHistory, BuildRef};
use crate::events::{BuildStarted, Event, EventEnvelope, ReviewOutcome};
use crate::log::{ledger_path, open_or_create, AppendLog, MemoryLog};

/// Build records backed by an append-only log.
///
/// Outcomes are written to the log before they become visible in memory, so
/// a recorded outcome is never lost to a later crash in the same build.
pub struct BuildLedger {
    log: Box<dyn AppendLog>,
    history: BuildHistory,
    current: Option<u64>,
}

impl std::fmt::Debug for BuildLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildLedger")
            .field("builds", &self.history.len())
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl BuildLedger {
    /// Open a ledger over an existing log, projecting its events.
    pub fn open(log: Box<dyn AppendLog>) -> Result<Self> {
        let events = log.read_all().context("Failed to read build ledger")?;
        Ok(Self {
            history: BuildHistory::from_events(&events),
            log,
            current: None,
        })
    }

    /// Open (or create) the ledger file under `root/.rbsync/`.
    pub fn open_file(root: &Path) -> Result<Self> {
        let log = open_or_create(&ledger_path(root))?;
        Self::open(Box::new(log))
    }

    /// An empty ledger that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            log: Box::new(MemoryLog::new()),
            history: BuildHistory::new(),
            current: None,
        }
    }

    /// Copy of this ledger whose writes are discarded.
    pub fn detached(&self) -> Result<Self> {
        let events = self.log.read_all()?;
        Self::open(Box::new(MemoryLog::with_events(events)))
    }

    #[must_use]
    pub const fn history(&self) -> &BuildHistory {
        &self.history
    }

    /// Build currently accepting outcomes.
    #[must_use]
    pub const fn current_build(&self) -> Option<u64> {
        self.current
    }

    /// Newest build record, where history searches begin.
    #[must_use]
    pub fn head(&self) -> Option<BuildRef<'_>> {
        self.history.head()
    }

    /// Start (or resume) the build that subsequent outcomes attach to.
    ///
    /// With no explicit number the build after the latest recorded one is
    /// started. Resuming the latest build keeps its original timestamp.
    pub fn begin_build(&mut self, number: Option<u64>, started_at: DateTime<Utc>) -> Result<u64> {
        let number = number.unwrap_or_else(|| self.history.latest_number().map_or(1, |n| n + 1));

        if self.history.begin(number, started_at)? {
            let event = EventEnvelope::new(number, Event::BuildStarted(BuildStarted { started_at }));
            self.log.append(&event)?;
            tracing::debug!(build = number, "Started build record");
        } else {
            tracing::debug!(build = number, "Resumed build record");
        }

        self.current = Some(number);
        Ok(number)
    }

    /// Attach an outcome to the current build.
    pub fn record(&mut self, outcome: ReviewOutcome) -> Result<()> {
        let Some(build) = self.current else {
            bail!("Cannot record a review outcome before a build is started");
        };

        let event = EventEnvelope::new(build, Event::ReviewRecorded(outcome.clone()));
        self.log
            .append(&event)
            .with_context(|| format!("Failed to record review #{}", outcome.review_id()))?;
        self.history.push_outcome(outcome)?;
        Ok(())
    }

    /// Discard all but the newest `keep` build records.
    ///
    /// The retained set is computed from the log as it stands under the
    /// rewrite lock, so builds appended by another executor since this
    /// ledger was opened are counted and kept. Returns the discarded build
    /// numbers.
    pub fn prune(&mut self, keep: usize) -> Result<Vec<u64>> {
        let mut removed = Vec::new();
        self.log.rewrite_with(&mut |events| {
            let mut history = BuildHistory::from_events(&events);
            removed = history.retain_latest(keep);
            events
                .into_iter()
                .filter(|e| history.get(e.build).is_some())
                .collect()
        })?;

        self.history = BuildHistory::from_events(&self.log.read_all()?);
        if self.current.is_some_and(|c| removed.contains(&c)) {
            self.current = None;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::BuildRecord;
    use tempfile::tempdir;

    fn outcome(key: &str, id: u64) -> ReviewOutcome {
        ReviewOutcome::new(key, Some(10), id, "alice", "change").unwrap()
    }

    #[test]
    fn test_record_requires_build() {
        let mut ledger = BuildLedger::in_memory();
        assert!(ledger.record(outcome("K-1", 1)).is_err());
    }

    #[test]
    fn test_begin_build_numbers_sequentially() {
        let mut ledger = BuildLedger::in_memory();
        assert_eq!(ledger.begin_build(None, Utc::now()).unwrap(), 1);
        assert_eq!(ledger.begin_build(None, Utc::now()).unwrap(), 2);
        assert_eq!(ledger.begin_build(Some(10), Utc::now()).unwrap(), 10);
        assert!(ledger.begin_build(Some(4), Utc::now()).is_err());
    }

    #[test]
    fn test_outcomes_persist_across_reopen() {
        let dir = tempdir().unwrap();

        {
            let mut ledger = BuildLedger::open_file(dir.path()).unwrap();
            ledger.begin_build(Some(5), Utc::now()).unwrap();
            ledger.record(outcome("ABC-1", 42)).unwrap();
        }

        let ledger = BuildLedger::open_file(dir.path()).unwrap();
        let head = ledger.head().unwrap();
        assert_eq!(head.number(), 5);
        assert_eq!(head.outcomes()[0].review_id(), 42);
    }

    #[test]
    fn test_resume_keeps_original_timestamp() {
        let mut ledger = BuildLedger::in_memory();
        let first = Utc::now() - chrono::Duration::hours(3);
        ledger.begin_build(Some(1), first).unwrap();
        ledger.begin_build(Some(1), Utc::now()).unwrap();
        assert_eq!(ledger.head().unwrap().timestamp(), first);
        assert_eq!(ledger.history().len(), 1);
    }

    #[test]
    fn test_detached_writes_do_not_reach_file() {
        let dir = tempdir().unwrap();
        let mut ledger = BuildLedger::open_file(dir.path()).unwrap();
        ledger.begin_build(None, Utc::now()).unwrap();

        let mut dry = ledger.detached().unwrap();
        dry.begin_build(None, Utc::now()).unwrap();
        dry.record(outcome("K-1", 3)).unwrap();

        let reopened = BuildLedger::open_file(dir.path()).unwrap();
        assert_eq!(reopened.history().len(), 1);
        assert!(reopened.head().unwrap().outcomes().is_empty());
    }

    #[test]
    fn test_prune_rewrites_log() {
        let dir = tempdir().unwrap();
        let mut ledger = BuildLedger::open_file(dir.path()).unwrap();
        for id in 1..=4 {
            ledger.begin_build(None, Utc::now()).unwrap();
            ledger.record(outcome("K-1", id)).unwrap();
        }

        assert_eq!(ledger.prune(1).unwrap(), vec![1, 2, 3]);

        let reopened = BuildLedger::open_file(dir.path()).unwrap();
        assert_eq!(reopened.history().len(), 1);
        assert_eq!(reopened.head().unwrap().outcomes()[0].review_id(), 4);
    }

    #[test]
    fn test_prune_keeps_builds_written_by_another_executor() {
        let dir = tempdir().unwrap();
        let mut ledger = BuildLedger::open_file(dir.path()).unwrap();
        for id in 1..=2 {
            ledger.begin_build(None, Utc::now()).unwrap();
            ledger.record(outcome("K-1", id)).unwrap();
        }

        // A second executor starts build 3 after this ledger was loaded
        let mut other = BuildLedger::open_file(dir.path()).unwrap();
        other.begin_build(None, Utc::now()).unwrap();
        other.record(outcome("K-1", 3)).unwrap();

        assert_eq!(ledger.prune(1).unwrap(), vec![1, 2]);
        assert_eq!(ledger.history().latest_number(), Some(3));

        let reopened = BuildLedger::open_file(dir.path()).unwrap();
        assert_eq!(reopened.history().len(), 1);
        assert_eq!(reopened.head().unwrap().outcomes()[0].review_id(), 3);
    }
}
