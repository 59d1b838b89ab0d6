//! Optimistic executor: drives the watch/validate/commit protocol
//!
//! Runs an [`OptimisticTxn`] against a [`Store`] until it commits, is
//! rejected by its own precondition check, or runs out of time.
//!
//! ## Attempt Sequence
//!
//! ```text
//! 1. watch(keys)                         Start -> Watching
//! 2. txn.validate(store)                 Watching -> Validating
//! 3. IF rejected: unwatch, return        Validating -> AbortedPrecondition
//! 4. txn.stage(snapshot, batch)          Validating -> Staging
//! 5. exec(watch, batch)                  Staging -> Committing
//! 6. IF committed: return                Committing -> Committed
//! 7. IF conflict and time remains:       Committing -> Conflict -> Start
//!    pause, go to 1
//! 8. ELSE: return exhausted              Conflict -> Failed
//! ```
//!
//! Store errors end the run immediately. The watch is released on every
//! path that does not reach `exec`.

use crate::retry::{CancelToken, RetryPolicy};
use crate::transaction::{AttemptState, AttemptStatus, OptimisticTxn, Validation};
use bazaar_core::{CommitResult, Result, Store, WriteBatch};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How an optimistic run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOutcome<R> {
    /// The staged writes were committed
    Committed,
    /// The precondition check failed; nothing was written
    Rejected(R),
    /// Every attempt conflicted until the budget ran out or the run was
    /// cancelled; nothing was written
    Exhausted,
}

impl<R> TxnOutcome<R> {
    /// Whether the writes were committed
    pub fn is_committed(&self) -> bool {
        matches!(self, TxnOutcome::Committed)
    }
}

/// Counters for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Attempts started
    pub attempts: u32,
    /// Attempts that ended in a conflict
    pub conflicts: u32,
    /// Whether the run stopped because of its cancel token
    pub cancelled: bool,
    /// Wall-clock time spent
    pub elapsed: Duration,
}

/// Outcome plus counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution<R> {
    /// How the run ended
    pub outcome: TxnOutcome<R>,
    /// What it took
    pub stats: ExecutionStats,
}

/// Runs optimistic transactions under a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct OptimisticExecutor {
    policy: RetryPolicy,
    cancel: Option<CancelToken>,
}

impl OptimisticExecutor {
    /// Executor with the given retry policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    /// Stop retrying once `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }

    /// Run `txn` to completion
    ///
    /// # Errors
    /// Store failures are returned as-is and never retried.
    pub fn run<T: OptimisticTxn>(
        &self,
        store: &dyn Store,
        txn: &T,
    ) -> Result<Execution<T::Rejection>> {
        let started = Instant::now();
        let deadline = self.policy.deadline();
        let mut state = AttemptState::new();
        let mut conflicts = 0u32;

        loop {
            if self.cancelled() {
                state.advance(AttemptStatus::Failed)?;
                warn!(txn = txn.name(), attempt = state.attempt(), "transaction cancelled");
                return Ok(finish(TxnOutcome::Exhausted, &state, conflicts, true, started));
            }

            match self.run_once(store, txn, &mut state)? {
                Attempt::Rejected(reason) => {
                    return Ok(finish(
                        TxnOutcome::Rejected(reason),
                        &state,
                        conflicts,
                        false,
                        started,
                    ));
                }
                Attempt::Finished(CommitResult::Committed) => {
                    debug!(txn = txn.name(), attempt = state.attempt(), "committed");
                    return Ok(finish(TxnOutcome::Committed, &state, conflicts, false, started));
                }
                Attempt::Finished(CommitResult::Conflict) => {
                    conflicts += 1;
                    debug!(txn = txn.name(), attempt = state.attempt(), "conflict");
                }
            }

            if deadline.expired() {
                state.advance(AttemptStatus::Failed)?;
                warn!(
                    txn = txn.name(),
                    attempts = state.attempt(),
                    conflicts,
                    "retry budget exhausted"
                );
                return Ok(finish(TxnOutcome::Exhausted, &state, conflicts, false, started));
            }

            let pause = self.policy.pause(&deadline);
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
            state.advance(AttemptStatus::Start)?;
        }
    }
}

fn finish<R>(
    outcome: TxnOutcome<R>,
    state: &AttemptState,
    conflicts: u32,
    cancelled: bool,
    started: Instant,
) -> Execution<R> {
    Execution {
        outcome,
        stats: ExecutionStats {
            attempts: state.attempt(),
            conflicts,
            cancelled,
            elapsed: started.elapsed(),
        },
    }
}

/// What a single attempt produced
#[derive(Debug)]
pub enum Attempt<R> {
    /// Reached `exec`
    Finished(CommitResult),
    /// Precondition failed; the watch was released
    Rejected(R),
}

impl OptimisticExecutor {
    /// Run exactly one attempt
    pub fn run_once<T: OptimisticTxn>(
        &self,
        store: &dyn Store,
        txn: &T,
        state: &mut AttemptState,
    ) -> Result<Attempt<T::Rejection>> {
        let keys = txn.watch_keys();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

        let watch = store.watch(&key_refs)?;
        state.advance(AttemptStatus::Watching)?;

        state.advance(AttemptStatus::Validating)?;
        let snapshot = match txn.validate(store) {
            Ok(Validation::Proceed(snapshot)) => snapshot,
            Ok(Validation::Reject(reason)) => {
                store.unwatch(watch)?;
                state.advance(AttemptStatus::AbortedPrecondition)?;
                debug!(txn = txn.name(), attempt = state.attempt(), "precondition failed");
                return Ok(Attempt::Rejected(reason));
            }
            Err(e) => {
                // Release the watch, but report the original failure
                let _ = store.unwatch(watch);
                let _ = state.advance(AttemptStatus::Failed);
                return Err(e);
            }
        };

        state.advance(AttemptStatus::Staging)?;
        let mut batch = WriteBatch::new();
        txn.stage(snapshot, &mut batch);

        state.advance(AttemptStatus::Committing)?;
        let result = match store.exec(watch, batch) {
            Ok(result) => result,
            Err(e) => {
                let _ = state.advance(AttemptStatus::Failed);
                return Err(e);
            }
        };

        match result {
            CommitResult::Committed => state.advance(AttemptStatus::Committed)?,
            CommitResult::Conflict => state.advance(AttemptStatus::Conflict)?,
        }
        Ok(Attempt::Finished(result))
    }
}
