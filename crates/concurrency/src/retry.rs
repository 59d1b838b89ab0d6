//! Retry budgets, deadlines and cancellation
//!
//! Conflicting commits are retried until a wall-clock [`Deadline`] passes.
//! Between attempts the caller sleeps for a short, jittered backoff so that
//! two contending writers do not stay in lock-step.

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long and how eagerly to retry conflicting commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wall-clock time after which no new attempt is started
    pub budget: Duration,
    /// Base pause between attempts
    pub backoff: Duration,
    /// Whether to add up to `backoff` of random jitter to each pause
    pub jitter: bool,
}

impl RetryPolicy {
    /// Default budget for listing an item
    pub const LIST_BUDGET: Duration = Duration::from_secs(5);

    /// Default budget for purchasing an item
    pub const PURCHASE_BUDGET: Duration = Duration::from_secs(10);

    /// Default pause between attempts
    pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1);

    /// Policy with the given budget and default backoff
    pub fn with_budget(budget: Duration) -> Self {
        Self {
            budget,
            backoff: Self::DEFAULT_BACKOFF,
            jitter: true,
        }
    }

    /// Policy used for `list_item`
    pub fn listing() -> Self {
        Self::with_budget(Self::LIST_BUDGET)
    }

    /// Policy used for `purchase_item`
    pub fn purchase() -> Self {
        Self::with_budget(Self::PURCHASE_BUDGET)
    }

    /// Replace the base backoff
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Disable random jitter (deterministic pauses)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Deadline for a run starting now
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.budget)
    }

    /// Pause before the next attempt, never longer than what the deadline
    /// leaves
    pub fn pause(&self, deadline: &Deadline) -> Duration {
        let base = if self.jitter && !self.backoff.is_zero() {
            let extra = rand::thread_rng().gen_range(0..=self.backoff.as_micros() as u64);
            self.backoff + Duration::from_micros(extra)
        } else {
            self.backoff
        };
        base.min(deadline.remaining())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::listing()
    }
}

/// Point in time after which no new attempt starts
///
/// A budget too large to represent as an `Instant` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
        }
    }

    /// Whether the deadline has passed
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, zero once expired
    pub fn remaining(&self) -> Duration {
        match self.at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }
}

/// Shared flag for forcing a retry loop to stop early
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets() {
        assert_eq!(RetryPolicy::listing().budget, Duration::from_secs(5));
        assert_eq!(RetryPolicy::purchase().budget, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_budget_deadline_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_unrepresentable_budget_never_expires() {
        let policy = RetryPolicy::with_budget(Duration::MAX).backoff(Duration::from_millis(1));
        let deadline = policy.deadline();
        assert!(!deadline.expired());
        assert!(deadline.remaining() > Duration::from_secs(3600));
        assert!(policy.pause(&deadline) <= Duration::from_millis(2));
    }

    #[test]
    fn test_pause_respects_jitter_bounds() {
        let policy = RetryPolicy::with_budget(Duration::from_secs(1)).backoff(Duration::from_millis(2));
        let deadline = policy.deadline();
        for _ in 0..50 {
            let pause = policy.pause(&deadline);
            assert!(pause >= Duration::from_millis(2));
            assert!(pause <= Duration::from_millis(4));
        }
    }

    #[test]
    fn test_pause_capped_by_deadline() {
        let policy = RetryPolicy::with_budget(Duration::ZERO).backoff(Duration::from_secs(1));
        let deadline = policy.deadline();
        assert_eq!(policy.pause(&deadline), Duration::ZERO);
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!handle.is_cancelled());
        token.cancel();
        assert!(handle.is_cancelled());
    }
}
