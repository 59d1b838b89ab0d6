//! Ingestion checkpoint ledger
//!
//! Progress is a `(file, offset)` pair stored under two string keys:
//!
//! ```text
//! progress:file      -> "<file id>"
//! progress:position  -> "<byte offset>"
//! ```
//!
//! The offset counts bytes consumed from the start of the file, line
//! terminators included, so it is always a valid seek position for the
//! next unread line.
//!
//! # Ordering
//!
//! The pipeline skips every file ordered before the checkpointed one, so the
//! ledger and the file enumeration must agree on [`FileId`] ordering.

use bazaar_core::{keys, Error, Result, Store, WriteBatch};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// FileId
// ============================================================================

/// Identifier of one input file
///
/// Ordering is numeric when both ids parse as unsigned integers and
/// lexicographic otherwise. Numeric ids sort before non-numeric ones, so
/// `"2" < "10" < "access.log"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    /// Wrap a file name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The file name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for FileId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            // "7" and "007" compare equal numerically; fall back to text
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for FileId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FileId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// ============================================================================
// Checkpoint
// ============================================================================

/// Last durable ingestion position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// File being processed, `None` before the first run
    pub file: Option<FileId>,
    /// Bytes of `file` already processed
    pub offset: u64,
}

impl Checkpoint {
    /// Checkpoint of a pipeline that never ran
    pub fn start() -> Self {
        Self::default()
    }

    /// Checkpoint at `offset` bytes into `file`
    pub fn new(file: FileId, offset: u64) -> Self {
        Self {
            file: Some(file),
            offset,
        }
    }

    /// Whether this is the never-run default
    pub fn is_start(&self) -> bool {
        self.file.is_none()
    }

    /// Where to start reading `file` when resuming from this checkpoint
    ///
    /// Returns `None` for files ordered before the checkpointed file (they
    /// are already done), the stored offset for the checkpointed file, and
    /// 0 for every later file.
    pub fn resume_offset(&self, file: &FileId) -> Option<u64> {
        match &self.file {
            None => Some(0),
            Some(current) => match file.cmp(current) {
                Ordering::Less => None,
                Ordering::Equal => Some(self.offset),
                Ordering::Greater => Some(0),
            },
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}@{}", file, self.offset),
            None => f.write_str("<start>"),
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Reads and writes the ingestion checkpoint in the shared store
#[derive(Clone)]
pub struct CheckpointLedger {
    store: Arc<dyn Store>,
}

impl CheckpointLedger {
    /// Ledger over `store`
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Current checkpoint, or [`Checkpoint::start`] if none was written
    ///
    /// # Errors
    /// `Error::InvalidCheckpoint` if the stored offset is not an unsigned
    /// integer.
    pub fn read_progress(&self) -> Result<Checkpoint> {
        let stored = self
            .store
            .mget(&[keys::PROGRESS_FILE, keys::PROGRESS_POSITION])?;
        let mut stored = stored.into_iter();
        let file = stored.next().flatten().filter(|f| !f.is_empty());
        let position = stored.next().flatten();

        let Some(file) = file else {
            return Ok(Checkpoint::start());
        };
        let offset = match position {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                Error::InvalidCheckpoint(format!(
                    "{} holds '{}', expected a byte offset",
                    keys::PROGRESS_POSITION,
                    raw
                ))
            })?,
            None => 0,
        };
        Ok(Checkpoint::new(FileId::new(file), offset))
    }

    /// Write `(file, offset)` as one atomic update
    pub fn write_progress(&self, file: &FileId, offset: u64) -> Result<()> {
        let mut batch = WriteBatch::new();
        self.stage_progress(&mut batch, file, offset);
        self.store.apply(batch)?;
        debug!(file = %file, offset, "checkpoint written");
        Ok(())
    }

    /// Append the checkpoint update to `batch`, after the data it describes
    pub fn stage_progress(&self, batch: &mut WriteBatch, file: &FileId, offset: u64) {
        batch.mset([
            (keys::PROGRESS_FILE, file.as_str().to_string()),
            (keys::PROGRESS_POSITION, offset.to_string()),
        ]);
    }

    /// Forget all progress; the next run starts from the first file
    pub fn reset(&self) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.del(keys::PROGRESS_FILE).del(keys::PROGRESS_POSITION);
        self.store.apply(batch)
    }
}

impl fmt::Debug for CheckpointLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointLedger").finish_non_exhaustive()
    }
}
