//! Unified error types for Bazaar.
//!
//! Component crates keep their own error enums; this module folds them into
//! one type with a stable shape for callers of the `bazaar` crate.

use bazaar_durability::Checkpoint;
use bazaar_ingest::IngestError;
use thiserror::Error;

/// All Bazaar errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The store could not be reached
    #[error("connection error: {0}")]
    Connection(String),

    /// A key holds a different data type than the operation needs
    #[error("wrong type for '{key}': expected {expected}, got {actual}")]
    WrongType {
        /// Key addressed
        key: String,
        /// Expected type
        expected: String,
        /// Actual type found
        actual: String,
    },

    /// Stored data could not be interpreted (non-integer counters,
    /// malformed checkpoint)
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Caller passed an argument the operation cannot accept
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A bounded wait ran out of time
    #[error("timed out: {0}")]
    Timeout(String),

    /// An ingestion run stopped early
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for Bazaar operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is transient.
    ///
    /// Connection failures and timeouts may succeed when the caller tries
    /// again later. Commit conflicts never surface as errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(_))
    }

    /// Check if the store could not be reached.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Checkpoint an interrupted ingestion run will resume from.
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        match self {
            Error::Ingest(e) => e.checkpoint(),
            _ => None,
        }
    }
}

// Convert from store errors
impl From<bazaar_core::Error> for Error {
    fn from(e: bazaar_core::Error) -> Self {
        use bazaar_core::Error as CoreError;
        match e {
            CoreError::Connection(msg) => Error::Connection(msg),
            CoreError::WrongType {
                key,
                expected,
                actual,
            } => Error::WrongType {
                key,
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
            CoreError::NotAnInteger { key } => {
                Error::InvalidData(format!("value at '{}' is not an integer", key))
            }
            CoreError::Overflow { key } => {
                Error::InvalidData(format!("increment of '{}' overflows", key))
            }
            CoreError::InvalidCheckpoint(msg) => {
                Error::InvalidData(format!("checkpoint: {}", msg))
            }
            CoreError::InvalidArgument(msg) => Error::InvalidArgument(msg),
            CoreError::Timeout(msg) => Error::Timeout(msg),
            CoreError::Io(io_err) => Error::Io(io_err),
            CoreError::Internal(msg) => Error::Internal(msg),
        }
    }
}

// Convert from TOML parse errors
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
