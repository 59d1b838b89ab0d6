//! Concurrency layer for Bazaar
//!
//! This crate implements optimistic concurrency control (OCC) over the
//! [`Store`](bazaar_core::Store) facade:
//! - [`OptimisticTxn`]: what a transaction watches, checks and writes
//! - [`AttemptState`]: per-attempt state machine with checked transitions
//! - [`OptimisticExecutor`]: conflict detection at commit time and a
//!   deadline-bounded retry loop
//! - [`RetryPolicy`] / [`Deadline`] / [`CancelToken`]: retry budget and
//!   early cancellation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod retry;
pub mod transaction;

pub use manager::{Attempt, Execution, ExecutionStats, OptimisticExecutor, TxnOutcome};
pub use retry::{CancelToken, Deadline, RetryPolicy};
pub use transaction::{AttemptState, AttemptStatus, OptimisticTxn, Validation};
