//! Log ingestion for Bazaar
//!
//! Replays log files line by line through a caller-supplied handler that
//! stages store writes, and flushes those writes together with the
//! ingestion checkpoint so a crashed run resumes exactly at the last
//! durable line.
//!
//! - [`LogSource`]: ordered file enumeration and seekable readers
//!   ([`DirectorySource`] for a directory on disk, [`MemorySource`] for
//!   in-process data)
//! - [`LogPipeline`]: the resumable ingestion loop
//! - [`IngestError`]: run failures, carrying the last durable checkpoint

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod pipeline;
pub mod source;

pub use error::{HandlerError, IngestError};
pub use pipeline::{IngestOptions, IngestReport, LogPipeline};
pub use source::{DirectorySource, LogSource, MemorySource};
