//! Durability layer for Bazaar
//!
//! This crate keeps progress and replication state inside the shared store:
//! - Checkpoint ledger: `(file, byte offset)` of the ingestion pipeline,
//!   written either on its own or staged into the same batch as the data
//!   it describes
//! - File ordering: numeric-aware [`FileId`] comparison
//! - Replication wait: block until a replica has caught up with a token
//!   written on the primary

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod replication;

pub use checkpoint::{Checkpoint, CheckpointLedger, FileId};
pub use replication::{wait_for_sync, SyncOptions, SyncReport};
