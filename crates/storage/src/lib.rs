//! Storage layer for Bazaar
//!
//! This crate implements the in-process backend of the store facade:
//! - MemoryStore: RwLock-guarded keyspace of strings, sets, sorted sets
//!   and hashes
//! - Per-key revisions backing WATCH conflict detection
//! - All-or-nothing batch application
//! - Simulated server status fields for replication checks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod memory;

pub use entry::{Entry, SortedSet};
pub use memory::{MemoryStore, StoreStats};
