//! # Bazaar
//!
//! Optimistic marketplace transactions and crash-resumable log ingestion
//! over a shared key-value store.
//!
//! ## Quick Start
//!
//! ```
//! use bazaar::prelude::*;
//!
//! let bazaar = Bazaar::in_memory();
//!
//! // Seller lists, buyer purchases
//! bazaar.market.grant_item("userX", "itemX")?;
//! bazaar.market.deposit("userY", 125)?;
//! assert!(bazaar.market.list_item("itemX", "userX", 10)?.is_success());
//! assert!(bazaar.market.purchase_item("userY", "itemX", "userX", 10)?.is_success());
//!
//! // Ingest log lines, resuming from the stored checkpoint
//! let source = MemorySource::new().with_file("1", "GET /\nGET /about\n");
//! let report = bazaar
//!     .pipeline(source)
//!     .run(|batch, line| {
//!         batch.incr_by(format!("hits:{}", line), 1);
//!         Ok(())
//!     })?;
//! assert_eq!(report.lines_processed, 2);
//! # Ok::<(), bazaar::Error>(())
//! ```
//!
//! ## Components
//!
//! - [`Market`] - `list_item` / `purchase_item` with a tri-state
//!   [`TradeOutcome`]
//! - [`LogPipeline`] - checkpointed, resumable line ingestion
//! - [`SessionTracker`] - session tokens and recent views
//! - [`wait_for_sync`] - block until a replica has caught up
//!
//! Every component receives the store as `Arc<dyn Store>`; use
//! [`MemoryStore`] in-process or any other [`Store`] implementation.

#![warn(missing_docs)]

mod config;
mod database;
mod error;

pub mod prelude;

// Re-export main entry points
pub use config::{BazaarConfig, IngestConfig, MarketConfig, SessionConfig};
pub use database::{Bazaar, BazaarBuilder};
pub use error::{Error, Result};

// Re-export components
pub use bazaar_concurrency::{CancelToken, RetryPolicy};
pub use bazaar_core::{keys, Command, CommitResult, Store, Watch, WriteBatch};
pub use bazaar_durability::{wait_for_sync, Checkpoint, CheckpointLedger, FileId, SyncOptions, SyncReport};
pub use bazaar_ingest::{
    DirectorySource, IngestError, IngestOptions, IngestReport, LogPipeline, LogSource, MemorySource,
};
pub use bazaar_primitives::{Listing, Market, Rejection, SessionTracker, TradeOutcome};
pub use bazaar_storage::MemoryStore;
