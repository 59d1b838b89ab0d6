//! Convenient imports for Bazaar.
//!
//! ```
//! use bazaar::prelude::*;
//!
//! let bazaar = Bazaar::in_memory();
//! bazaar.sessions.record_activity("token", "alice", Some("itemX")).unwrap();
//! ```

// Main entry point
pub use crate::database::{Bazaar, BazaarBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Configuration
pub use crate::config::BazaarConfig;

// Store
pub use bazaar_core::{Store, WriteBatch};
pub use bazaar_storage::MemoryStore;

// Components
pub use bazaar_concurrency::RetryPolicy;
pub use bazaar_durability::{Checkpoint, FileId, SyncOptions};
pub use bazaar_ingest::{DirectorySource, IngestOptions, LogPipeline, LogSource, MemorySource};
pub use bazaar_primitives::{Market, Rejection, SessionTracker, TradeOutcome};
