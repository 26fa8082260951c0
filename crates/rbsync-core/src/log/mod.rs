//! Append-only build ledger storage.
//!
//! Every outcome rbsync records is written as one JSON line to
//! `.rbsync/builds.jsonl`. All access is serialized through an advisory lock
//! on the sidecar `.rbsync/builds.lock`, which is never replaced, so two
//! build executors sharing a workspace neither interleave partial lines nor
//! lose appends to a concurrent rewrite.

use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::events::EventEnvelope;

/// Directory holding rbsync state, relative to the workspace root.
pub const RBSYNC_DIR: &str = ".rbsync";

/// Ledger file name within [`RBSYNC_DIR`].
pub const LEDGER_FILE: &str = "builds.jsonl";

/// Trait for append-only event log operations.
pub trait AppendLog {
    /// Append an event to the log.
    fn append(&self, event: &EventEnvelope) -> Result<()>;

    /// Read all events from the log.
    fn read_all(&self) -> Result<Vec<EventEnvelope>>;

    /// Replace the log contents with `edit` applied to the current events.
    ///
    /// The read and the write happen under one exclusive lock. Only used when
    /// discarding old build records.
    fn rewrite_with(
        &self,
        edit: &mut dyn FnMut(Vec<EventEnvelope>) -> Vec<EventEnvelope>,
    ) -> Result<()>;

    /// Get the number of events in the log.
    fn len(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    /// Check if the log is empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Path to the ledger file for a workspace root.
pub fn ledger_path(root: &Path) -> PathBuf {
    root.join(RBSYNC_DIR).join(LEDGER_FILE)
}

/// File-based implementation of the append-only event log.
#[derive(Debug, Clone)]
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    /// Create a new `FileLog` pointing to the given path.
    ///
    /// Does not create the file; use [`open_or_create`] for that.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file the ledger lock is taken on.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Open the sidecar and take its lock. Released when the handle drops.
    fn lock(&self, exclusive: bool) -> Result<File> {
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open ledger lock: {}", lock_path.display()))?;

        if exclusive {
            file.lock_exclusive()
                .context("Failed to acquire exclusive lock")?;
        } else {
            file.lock_shared().context("Failed to acquire shared lock")?;
        }
        Ok(file)
    }

    /// Parse the ledger. Callers must hold the lock.
    fn read_locked(&self) -> Result<Vec<EventEnvelope>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open ledger: {}", self.path.display()))
            }
        };

        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for (idx, line_result) in reader.lines().enumerate() {
            let line_content =
                line_result.with_context(|| format!("Failed to read line {idx} from ledger"))?;

            if line_content.trim().is_empty() {
                continue;
            }

            let event = EventEnvelope::from_json_line(&line_content)
                .with_context(|| format!("Failed to parse event at line {idx}"))?;

            events.push(event);
        }

        Ok(events)
    }
}

impl AppendLog for FileLog {
    fn append(&self, event: &EventEnvelope) -> Result<()> {
        let json_line = event.to_json_line().context("Failed to serialize event")?;

        let _lock = self.lock(true)?;
        // Opened after locking so a rewrite that finished meanwhile is seen
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger: {}", self.path.display()))?;

        writeln!(file, "{json_line}").context("Failed to write event to ledger")?;
        file.flush().context("Failed to flush ledger")?;

        Ok(())
    }

    fn read_all(&self) -> Result<Vec<EventEnvelope>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let _lock = self.lock(false)?;
        self.read_locked()
    }

    fn rewrite_with(
        &self,
        edit: &mut dyn FnMut(Vec<EventEnvelope>) -> Vec<EventEnvelope>,
    ) -> Result<()> {
        let _lock = self.lock(true)?;
        let events = edit(self.read_locked()?);

        let mut contents = String::new();
        for event in &events {
            contents.push_str(&event.to_json_line().context("Failed to serialize event")?);
            contents.push('\n');
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace ledger: {}", self.path.display()))?;

        Ok(())
    }
}

/// Open an existing ledger file or create a new one.
///
/// Creates parent directories if they don't exist.
pub fn open_or_create(path: &Path) -> Result<FileLog> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directories: {}", parent.display())
            })?;
        }
    }

    if !path.exists() {
        File::create(path)
            .with_context(|| format!("Failed to create ledger: {}", path.display()))?;
    }

    Ok(FileLog::new(path))
}

/// In-memory log for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryLog {
    events: RefCell<Vec<EventEnvelope>>,
}

impl MemoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log with existing events.
    #[must_use]
    pub fn with_events(events: Vec<EventEnvelope>) -> Self {
        Self {
            events: RefCell::new(events),
        }
    }
}

impl AppendLog for MemoryLog {
    fn append(&self, event: &EventEnvelope) -> Result<()> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<EventEnvelope>> {
        Ok(self.events.borrow().clone())
    }

    fn rewrite_with(
        &self,
        edit: &mut dyn FnMut(Vec<EventEnvelope>) -> Vec<EventEnvelope>,
    ) -> Result<()> {
        let events = self.events.take();
        *self.events.borrow_mut() = edit(events);
        Ok(())
    }
}
