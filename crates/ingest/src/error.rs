//! Ingestion run failures

use bazaar_durability::{Checkpoint, FileId};
use thiserror::Error;

/// Boxed error raised by a line handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why an ingestion run stopped early
///
/// Every variant leaves the store at a consistent checkpoint: writes staged
/// after the last flush are discarded, and the next run resumes from the
/// checkpoint that was durable when the error occurred.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The line handler rejected a line
    #[error("handler failed on {file} at byte {offset}, resume from {checkpoint}: {source}")]
    Handler {
        /// File holding the failing line
        file: FileId,
        /// Byte offset where the failing line starts
        offset: u64,
        /// Last durable checkpoint
        checkpoint: Checkpoint,
        /// Error returned by the handler
        #[source]
        source: HandlerError,
    },

    /// Listing the log files failed
    #[error("cannot list log files: {source}")]
    List {
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Opening or reading a log file failed
    #[error("cannot read {file}, resume from {checkpoint}: {source}")]
    Read {
        /// File being read
        file: FileId,
        /// Last durable checkpoint
        checkpoint: Checkpoint,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The store rejected a read or flush
    #[error("store error, resume from {checkpoint}: {source}")]
    Store {
        /// Last durable checkpoint
        checkpoint: Checkpoint,
        /// Error returned by the store
        #[source]
        source: bazaar_core::Error,
    },

    /// The stored checkpoint could not be read
    #[error("cannot read checkpoint: {0}")]
    Checkpoint(#[source] bazaar_core::Error),
}

impl IngestError {
    /// Checkpoint the next run will resume from
    ///
    /// `None` when the run stopped before any file was opened.
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        match self {
            IngestError::Handler { checkpoint, .. }
            | IngestError::Read { checkpoint, .. }
            | IngestError::Store { checkpoint, .. } => Some(checkpoint),
            IngestError::List { .. } | IngestError::Checkpoint(_) => None,
        }
    }

    /// Whether the failure came from the caller's handler
    pub fn is_handler(&self) -> bool {
        matches!(self, IngestError::Handler { .. })
    }
}
