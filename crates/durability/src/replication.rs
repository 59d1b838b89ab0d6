//! Wait for a replica to catch up with the primary
//!
//! # Sequence
//!
//! ```text
//! 1. ZADD sync:wait <now> <token>           on the primary
//! 2. poll replica INFO master_link_status   until "up"
//! 3. poll replica ZSCORE sync:wait <token>  until present
//! 4. poll replica INFO aof_pending_bio_fsync == 0, for at most ~1 s
//! 5. ZREM the token and ZREMRANGEBYSCORE tokens older than 15 minutes
//! ```
//!
//! Steps 2 and 3 are bounded by [`SyncOptions::link_timeout`]. Step 4 is
//! best effort: a replica that keeps fsyncs pending is not an error. Step 5
//! runs on every exit path once the token was written.

use bazaar_core::{keys, Error, Result, Store, WriteBatch};
use chrono::Utc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Tokens older than this are removed during cleanup
pub const STALE_TOKEN_AGE_SECS: i64 = 900;

/// Upper bound for the disk-sync wait
pub const FSYNC_WAIT: Duration = Duration::from_millis(1010);

/// Polling knobs for [`wait_for_sync`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Pause between status polls
    pub poll_interval: Duration,
    /// Longest wait for the replication link and for the token to arrive
    pub link_timeout: Duration,
    /// Longest wait for pending fsyncs to drain
    pub fsync_wait: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            link_timeout: Duration::from_secs(30),
            fsync_wait: FSYNC_WAIT,
        }
    }
}

/// What [`wait_for_sync`] observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Token written to the primary
    pub token: String,
    /// Whether the replica reported no pending fsyncs before the wait ended
    pub fsynced: bool,
    /// Total time spent
    pub elapsed: Duration,
}

/// Block until `replica` has received everything written to `primary`
/// before this call
///
/// # Errors
/// `Error::Timeout` if the link does not come up or the token does not
/// arrive within `options.link_timeout`. Store errors propagate.
pub fn wait_for_sync(
    primary: &dyn Store,
    replica: &dyn Store,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let started = Instant::now();
    let token = Uuid::new_v4().to_string();
    primary.zadd(keys::SYNC_WAIT, &token, Utc::now().timestamp() as f64)?;
    debug!(token = %token, "sync token written");

    let waited = wait_on_replica(replica, &token, options);
    let cleaned = cleanup(primary, &token);

    let fsynced = waited?;
    cleaned?;

    Ok(SyncReport {
        token,
        fsynced,
        elapsed: started.elapsed(),
    })
}

fn wait_on_replica(replica: &dyn Store, token: &str, options: &SyncOptions) -> Result<bool> {
    let link_deadline = Instant::now() + options.link_timeout;

    poll_until(options, link_deadline, "replica link to come up", || {
        Ok(replica.info("master_link_status")?.as_deref() == Some("up"))
    })?;

    poll_until(options, link_deadline, "sync token to reach the replica", || {
        Ok(replica.zscore(keys::SYNC_WAIT, token)?.is_some())
    })?;

    let fsync_deadline = Instant::now() + options.fsync_wait;
    loop {
        let pending = replica
            .info("aof_pending_bio_fsync")?
            .and_then(|v| v.trim().parse::<u64>().ok());
        if pending == Some(0) {
            return Ok(true);
        }
        if Instant::now() >= fsync_deadline {
            warn!(token = %token, ?pending, "replica still has pending fsyncs");
            return Ok(false);
        }
        thread::sleep(options.poll_interval);
    }
}

fn poll_until(
    options: &SyncOptions,
    deadline: Instant,
    what: &str,
    mut ready: impl FnMut() -> Result<bool>,
) -> Result<()> {
    loop {
        if ready()? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout(format!(
                "waited {:?} for {}",
                options.link_timeout, what
            )));
        }
        thread::sleep(options.poll_interval);
    }
}

fn cleanup(primary: &dyn Store, token: &str) -> Result<()> {
    let cutoff = Utc::now().timestamp() - STALE_TOKEN_AGE_SECS;
    let mut batch = WriteBatch::new();
    batch
        .zrem(keys::SYNC_WAIT, token)
        .zrem_range_by_score(keys::SYNC_WAIT, 0.0, cutoff as f64);
    primary.apply(batch)
}
