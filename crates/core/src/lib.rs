//! Core types for Bazaar
//!
//! This crate defines the store client facade the workflows are written
//! against:
//! - [`Store`]: typed reads, atomic batch writes, and optimistic
//!   watch/exec transactions
//! - [`WriteBatch`] / [`Command`]: staged writes
//! - [`Watch`] / [`CommitResult`]: conflict detection at commit time
//! - [`keys`]: the shared key layout
//! - [`Error`]: store error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod error;
pub mod keys;
pub mod store;

pub use batch::{Command, WriteBatch};
pub use error::{Error, Result};
pub use store::{CommitResult, Store, Watch};
