//! Per-attempt transaction state machine
//!
//! ```text
//! Start -> Watching -> Validating -> AbortedPrecondition
//!                                 -> Staging -> Committing -> Committed
//!                                                          -> Conflict -> Start
//! (any non-terminal state) -> Failed
//! ```
//!
//! `Conflict` is the only state that loops; whether it does is decided by
//! the retry deadline, not by the state machine.

use bazaar_core::{Error, Result, Store, WriteBatch};

/// Where an attempt currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptStatus {
    /// Nothing registered yet
    Start,
    /// Watch registered on the contended keys
    Watching,
    /// Reading state and checking preconditions
    Validating,
    /// Precondition failed; watch released, nothing written
    AbortedPrecondition,
    /// Building the write batch
    Staging,
    /// Conditional commit in flight
    Committing,
    /// Batch applied
    Committed,
    /// A watched key changed; nothing written
    Conflict,
    /// Abandoned: store error, cancellation or exhausted budget
    Failed,
}

impl AttemptStatus {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: AttemptStatus) -> bool {
        use AttemptStatus::*;
        match (self, next) {
            (Start, Watching)
            | (Watching, Validating)
            | (Validating, AbortedPrecondition)
            | (Validating, Staging)
            | (Staging, Committing)
            | (Committing, Committed)
            | (Committing, Conflict)
            | (Conflict, Start) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// States from which no further transition happens
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptStatus::AbortedPrecondition | AttemptStatus::Committed | AttemptStatus::Failed
        )
    }
}

/// Tracks the status of the current attempt and enforces legal moves
#[derive(Debug, Clone)]
pub struct AttemptState {
    status: AttemptStatus,
    attempt: u32,
}

impl AttemptState {
    /// First attempt, in `Start`
    pub fn new() -> Self {
        Self {
            status: AttemptStatus::Start,
            attempt: 1,
        }
    }

    /// Current status
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    /// 1-based number of the current attempt
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Move to `next`
    ///
    /// # Errors
    /// Returns `Error::Internal` if the move is not part of the protocol.
    pub fn advance(&mut self, next: AttemptStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "illegal transaction transition {:?} -> {:?} on attempt {}",
                self.status, next, self.attempt
            )));
        }
        if self.status == AttemptStatus::Conflict && next == AttemptStatus::Start {
            self.attempt += 1;
        }
        self.status = next;
        Ok(())
    }
}

impl Default for AttemptState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of reading and checking state under a watch
#[derive(Debug, Clone, PartialEq)]
pub enum Validation<S, R> {
    /// Preconditions hold; `S` carries what was read for staging
    Proceed(S),
    /// Preconditions do not hold; the attempt stops without retrying
    Reject(R),
}

/// One optimistic read-check-write transaction
///
/// Implementations describe WHAT to watch, check and write; the
/// [`OptimisticExecutor`](crate::OptimisticExecutor) drives the protocol
/// and the retry loop. `validate` and `stage` run again on every attempt,
/// always against fresh reads.
pub trait OptimisticTxn {
    /// Values read during validation and needed for staging
    type Snapshot;
    /// Why the transaction cannot proceed
    type Rejection;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Keys whose modification must invalidate the attempt
    fn watch_keys(&self) -> Vec<String>;

    /// Read current state and check preconditions
    fn validate(&self, store: &dyn Store) -> Result<Validation<Self::Snapshot, Self::Rejection>>;

    /// Stage the writes to commit
    fn stage(&self, snapshot: Self::Snapshot, batch: &mut WriteBatch);
}
