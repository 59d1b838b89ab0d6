//! Error types for store operations
//!
//! Every store call returns [`Result`]. Write conflicts detected at commit
//! time are NOT errors: they are reported through
//! [`CommitResult::Conflict`](crate::store::CommitResult) so callers can
//! drive a retry loop without matching on error variants.

use thiserror::Error;

/// Errors raised by the store client facade
#[derive(Debug, Error)]
pub enum Error {
    /// The store could not be reached or the connection broke mid-call
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Operation against a key holding a different data type
    #[error("wrong type for key '{key}': expected {expected}, found {actual}")]
    WrongType {
        /// Key the command addressed
        key: String,
        /// Type the command needs
        expected: &'static str,
        /// Type currently stored at the key
        actual: &'static str,
    },

    /// Increment of a value that does not parse as an integer
    #[error("value at '{key}' is not an integer")]
    NotAnInteger {
        /// Key (or `key/field` for hash fields) holding the bad value
        key: String,
    },

    /// Integer increment would overflow i64
    #[error("increment of '{key}' overflows")]
    Overflow {
        /// Key being incremented
        key: String,
    },

    /// Stored checkpoint fields could not be decoded
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// Caller passed an argument the operation cannot accept
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A bounded wait ran out of time
    #[error("timed out: {0}")]
    Timeout(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the failure came from reaching the store rather than from
    /// the data it holds
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Whether the failure is caused by the stored data having an
    /// unexpected shape
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Error::WrongType { .. }
                | Error::NotAnInteger { .. }
                | Error::Overflow { .. }
                | Error::InvalidCheckpoint(_)
        )
    }
}
