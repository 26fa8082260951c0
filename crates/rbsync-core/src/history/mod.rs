//! Build history: the chain of prior build records and the search over it.
//!
//! Build records are projected from the ledger's event log. Each record holds
//! the review outcomes recorded while that build ran; older builds hold older
//! outcomes. [`HistorySearcher`] walks the chain backward from a head record
//! to find the review request previously created for a correlation key.

pub mod ledger;

pub use ledger::BuildLedger;

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::events::{Event, EventEnvelope, ReviewOutcome};

/// A build record that can be walked backward.
pub trait BuildRecord: Sized {
    /// Build number.
    fn number(&self) -> u64;

    /// When the build started; staleness is measured from here.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Outcomes recorded by this build, in submission order.
    fn outcomes(&self) -> &[ReviewOutcome];

    /// The next-older build record, if the host still retains one.
    fn previous(&self) -> Option<Self>;
}

/// One build's projected state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSnapshot {
    pub number: u64,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<ReviewOutcome>,
}

/// All retained build records, oldest first.
#[derive(Debug, Clone, Default)]
pub struct BuildHistory {
    builds: Vec<BuildSnapshot>,
}

impl BuildHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold ledger events into build records.
    ///
    /// Outcomes for a build whose start event is missing use the timestamp of
    /// the first event seen for that build.
    #[must_use]
    pub fn from_events(events: &[EventEnvelope]) -> Self {
        let mut builds: BTreeMap<u64, BuildSnapshot> = BTreeMap::new();

        for envelope in events {
            let snapshot = builds
                .entry(envelope.build)
                .or_insert_with(|| BuildSnapshot {
                    number: envelope.build,
                    started_at: envelope.ts,
                    outcomes: Vec::new(),
                });

            match &envelope.event {
                Event::BuildStarted(started) => snapshot.started_at = started.started_at,
                Event::ReviewRecorded(outcome) => snapshot.outcomes.push(outcome.clone()),
            }
        }

        Self {
            builds: builds.into_values().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.builds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }

    /// The most recent build record.
    #[must_use]
    pub fn head(&self) -> Option<BuildRef<'_>> {
        self.builds.len().checked_sub(1).map(|index| BuildRef {
            builds: &self.builds,
            index,
        })
    }

    /// Look up a build record by number.
    #[must_use]
    pub fn get(&self, number: u64) -> Option<BuildRef<'_>> {
        self.builds
            .binary_search_by_key(&number, |b| b.number)
            .ok()
            .map(|index| BuildRef {
                builds: &self.builds,
                index,
            })
    }

    #[must_use]
    pub fn latest_number(&self) -> Option<u64> {
        self.builds.last().map(|b| b.number)
    }

    /// Add a new newest build, or reopen the newest one if `number` matches it.
    ///
    /// Returns `true` when a new record was created.
    pub fn begin(&mut self, number: u64, started_at: DateTime<Utc>) -> Result<bool> {
        match self.latest_number() {
            Some(latest) if latest == number => Ok(false),
            Some(latest) if latest > number => {
                bail!("Build {number} is older than the latest recorded build {latest}")
            }
            _ => {
                self.builds.push(BuildSnapshot {
                    number,
                    started_at,
                    outcomes: Vec::new(),
                });
                Ok(true)
            }
        }
    }

    /// Attach an outcome to the newest build.
    pub fn push_outcome(&mut self, outcome: ReviewOutcome) -> Result<()> {
        let Some(current) = self.builds.last_mut() else {
            bail!("No build has been started");
        };
        current.outcomes.push(outcome);
        Ok(())
    }

    /// Keep only the newest `keep` builds. Returns the discarded build numbers.
    pub fn retain_latest(&mut self, keep: usize) -> Vec<u64> {
        let excess = self.builds.len().saturating_sub(keep);
        self.builds.drain(..excess).map(|b| b.number).collect()
    }

    /// Build records, newest first.
    pub fn newest_first(&self) -> impl Iterator<Item = &BuildSnapshot> {
        self.builds.iter().rev()
    }
}

/// Cursor onto one record of a [`BuildHistory`].
#[derive(Debug, Clone, Copy)]
pub struct BuildRef<'a> {
    builds: &'a [BuildSnapshot],
    index: usize,
}

impl<'a> BuildRef<'a> {
    #[must_use]
    pub fn snapshot(&self) -> &'a BuildSnapshot {
        &self.builds[self.index]
    }
}

impl BuildRecord for BuildRef<'_> {
    fn number(&self) -> u64 {
        self.snapshot().number
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.snapshot().started_at
    }

    fn outcomes(&self) -> &[ReviewOutcome] {
        &self.snapshot().outcomes
    }

    fn previous(&self) -> Option<Self> {
        self.index.checked_sub(1).map(|index| BuildRef {
            builds: self.builds,
            index,
        })
    }
}

/// How long a recorded review stays eligible for updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalenessPolicy {
    /// Reviews never go stale while their build record is retained.
    #[default]
    Never,
    /// Reviews go stale this many days after the build that recorded them.
    Days(u32),
}

impl StalenessPolicy {
    /// Interpret the configured day count; `-1` means never stale.
    ///
    /// Returns `None` for values below `-1`.
    #[must_use]
    pub fn from_days(days: i64) -> Option<Self> {
        match days {
            -1 => Some(Self::Never),
            d => u32::try_from(d).ok().map(Self::Days),
        }
    }

    /// Whether an outcome recorded by a build at `recorded_at` can still be updated.
    #[must_use]
    pub fn is_fresh(self, recorded_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Never => true,
            Self::Days(days) => Duration::try_days(i64::from(days))
                .and_then(|window| recorded_at.checked_add_signed(window))
                .map_or(true, |stale_at| now < stale_at),
        }
    }
}

/// A prior review located in build history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryMatch {
    /// Build that recorded the outcome
    pub build: u64,
    /// Review request id to update
    pub review_id: u64,
    /// Number of build records inspected, including the matching one
    pub visited: usize,
}

/// Backward search over build history for a correlation key.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistorySearcher {
    policy: StalenessPolicy,
}

impl HistorySearcher {
    #[must_use]
    pub const fn new(policy: StalenessPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> StalenessPolicy {
        self.policy
    }

    /// Find the review id previously recorded for `key`, measured against the current time.
    pub fn find<R: BuildRecord>(&self, head: Option<R>, key: &str) -> Option<u64> {
        self.find_at(head, key, Utc::now())
    }

    /// Find the review id previously recorded for `key` as of `now`.
    pub fn find_at<R: BuildRecord>(
        &self,
        head: Option<R>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        self.locate_at(head, key, now).map(|m| m.review_id)
    }

    /// Walk from `head` toward older builds looking for a fresh outcome for `key`.
    ///
    /// Only the first matching outcome of each record is considered. A stale
    /// match does not end the search; older records are still inspected.
    pub fn locate_at<R: BuildRecord>(
        &self,
        head: Option<R>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<HistoryMatch> {
        if key.is_empty() {
            return None;
        }

        let mut cursor = head;
        let mut visited = 0;

        while let Some(record) = cursor {
            visited += 1;

            if let Some(outcome) = record.outcomes().iter().find(|o| o.matches_key(key)) {
                // Measured from the matching record's own timestamp
                if self.policy.is_fresh(record.timestamp(), now) {
                    return Some(HistoryMatch {
                        build: record.number(),
                        review_id: outcome.review_id(),
                        visited,
                    });
                }
                tracing::debug!(
                    key,
                    build = record.number(),
                    review_id = outcome.review_id(),
                    "Ignoring stale review"
                );
            }

            cursor = record.previous();
        }

        tracing::trace!(key, visited, "No prior review found");
        None
    }
}
