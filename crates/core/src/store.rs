//! The store client facade
//!
//! [`Store`] is the single seam between application logic and the shared
//! key-value store. Components receive it as `Arc<dyn Store>`; nothing in
//! the workspace reaches for a process-global client.
//!
//! ## Optimistic transactions
//!
//! ```text
//! 1. watch(keys)      -> Watch     (revision of every key, present or not)
//! 2. reads            -> validate against the current snapshot
//! 3a. unwatch(watch)               (precondition failed: release and stop)
//! 3b. exec(watch, batch)           (Committed, or Conflict if any watched
//!                                   key changed since step 1)
//! ```
//!
//! A [`Watch`] is consumed by either `exec` or `unwatch`, so a caller cannot
//! leave the watch registered by accident.

use crate::batch::{Command, WriteBatch};
use crate::error::Result;

/// Revision snapshot of a set of watched keys
///
/// Opaque to callers: produced by [`Store::watch`], consumed by
/// [`Store::exec`] or [`Store::unwatch`].
#[must_use = "a watch must be committed with `exec` or released with `unwatch`"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    observed: Vec<(String, u64)>,
}

impl Watch {
    /// Build a watch from `(key, revision)` pairs observed by a store
    pub fn new(observed: Vec<(String, u64)>) -> Self {
        Self { observed }
    }

    /// Watched keys with the revision seen at registration
    pub fn observed(&self) -> &[(String, u64)] {
        &self.observed
    }
}

/// Result of a conditional commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// Every staged command was applied
    Committed,
    /// A watched key changed after registration; nothing was applied
    Conflict,
}

impl CommitResult {
    /// Whether the batch was applied
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::Committed)
    }
}

/// Typed operations against the shared key-value store
///
/// Reads return the committed state at the moment of the call. Writes go
/// through [`Store::apply`] (unconditional, all-or-nothing) or
/// [`Store::exec`] (conditional on a [`Watch`]).
pub trait Store: Send + Sync {
    // ========================================================================
    // Strings
    // ========================================================================

    /// `GET key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// `MGET key...`, one slot per requested key
    fn mget(&self, keys: &[&str]) -> Result<Vec<Option<String>>>;

    /// `EXISTS key`
    fn exists(&self, key: &str) -> Result<bool>;

    // ========================================================================
    // Sets
    // ========================================================================

    /// `SISMEMBER key member`
    fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    /// `SMEMBERS key`, sorted for stable output
    fn smembers(&self, key: &str) -> Result<Vec<String>>;

    // ========================================================================
    // Sorted sets
    // ========================================================================

    /// `ZSCORE key member`
    fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;

    /// `ZRANGE key start stop WITHSCORES`, ascending by score
    fn zrange_with_scores(&self, key: &str, start: i64, stop: i64) -> Result<Vec<(String, f64)>>;

    /// `ZCARD key`
    fn zcard(&self, key: &str) -> Result<usize>;

    // ========================================================================
    // Hashes
    // ========================================================================

    /// `HGET key field`
    fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// `HGETALL key`, sorted by field
    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>>;

    // ========================================================================
    // Server status
    // ========================================================================

    /// Read one field of the server's status report (`INFO`)
    fn info(&self, field: &str) -> Result<Option<String>>;

    // ========================================================================
    // Writes and transactions
    // ========================================================================

    /// Apply a batch atomically (`MULTI ... EXEC` without a watch)
    ///
    /// If any command fails, none of the batch is applied.
    fn apply(&self, batch: WriteBatch) -> Result<()>;

    /// `WATCH key...`: record the current revision of each key
    fn watch(&self, keys: &[&str]) -> Result<Watch>;

    /// `MULTI ... EXEC` gated on `watch`
    ///
    /// Returns [`CommitResult::Conflict`] without applying anything if any
    /// watched key was modified since the watch was taken.
    fn exec(&self, watch: Watch, batch: WriteBatch) -> Result<CommitResult>;

    /// `UNWATCH`: release a watch without committing
    fn unwatch(&self, watch: Watch) -> Result<()>;

    // ========================================================================
    // Single-command conveniences
    // ========================================================================

    /// `SET key value`
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.apply(
            Command::Set {
                key: key.to_string(),
                value: value.to_string(),
            }
            .into(),
        )
    }

    /// `DEL key`
    fn del(&self, key: &str) -> Result<()> {
        self.apply(Command::Del { key: key.to_string() }.into())
    }

    /// `SADD key member`
    fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.apply(
            Command::SAdd {
                key: key.to_string(),
                member: member.to_string(),
            }
            .into(),
        )
    }

    /// `SREM key member`
    fn srem(&self, key: &str, member: &str) -> Result<()> {
        self.apply(
            Command::SRem {
                key: key.to_string(),
                member: member.to_string(),
            }
            .into(),
        )
    }

    /// `ZADD key score member`
    fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.apply(
            Command::ZAdd {
                key: key.to_string(),
                member: member.to_string(),
                score,
            }
            .into(),
        )
    }

    /// `ZREM key member`
    fn zrem(&self, key: &str, member: &str) -> Result<()> {
        self.apply(
            Command::ZRem {
                key: key.to_string(),
                member: member.to_string(),
            }
            .into(),
        )
    }

    /// `HSET key field value`
    fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.apply(
            Command::HSet {
                key: key.to_string(),
                field: field.to_string(),
                value: value.to_string(),
            }
            .into(),
        )
    }

    /// `HINCRBY key field delta`
    fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<()> {
        self.apply(
            Command::HIncrBy {
                key: key.to_string(),
                field: field.to_string(),
                delta,
            }
            .into(),
        )
    }
}
