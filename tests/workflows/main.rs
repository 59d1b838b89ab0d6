//! Workflow Test Suite
//!
//! End-to-end tests for the marketplace, ingestion, session and replication
//! workflows, run through the `bazaar` facade against `MemoryStore`.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run the whole suite
//! cargo test --test workflows
//!
//! # Run marketplace tests only
//! cargo test --test workflows market::
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use bazaar::prelude::*;
use bazaar::{CommitResult, Watch};

// Test modules
pub mod ingest;
pub mod market;
pub mod replication;
pub mod session;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Bazaar over a fresh store, with short retry budgets
pub fn create_bazaar() -> (Arc<MemoryStore>, Bazaar) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let bazaar = Bazaar::builder()
        .store(store.clone())
        .list_budget(Duration::from_secs(2))
        .purchase_budget(Duration::from_secs(2))
        .open()
        .expect("failed to open bazaar");
    (store, bazaar)
}

/// Sum of every user's funds
pub fn total_funds(store: &MemoryStore, users: &[&str]) -> i64 {
    users
        .iter()
        .map(|u| {
            store
                .hget(&bazaar::keys::account(u), bazaar::keys::FUNDS_FIELD)
                .unwrap()
                .map_or(0, |v| v.parse::<i64>().unwrap())
        })
        .sum()
}

/// How a [`FaultyStore`] misbehaves on `exec`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every commit reports a conflict
    AlwaysConflict,
    /// Every commit fails to reach the store
    ConnectionLost,
}

/// Store wrapper that injects faults into conditional commits and counts
/// released watches
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fault: Fault,
    pub execs: AtomicU32,
    pub unwatches: AtomicU32,
}

impl FaultyStore {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: MemoryStore::new(),
            fault,
            execs: AtomicU32::new(0),
            unwatches: AtomicU32::new(0),
        }
    }
}

impl Store for FaultyStore {
    fn get(&self, key: &str) -> bazaar_core::Result<Option<String>> {
        self.inner.get(key)
    }
    fn mget(&self, keys: &[&str]) -> bazaar_core::Result<Vec<Option<String>>> {
        self.inner.mget(keys)
    }
    fn exists(&self, key: &str) -> bazaar_core::Result<bool> {
        self.inner.exists(key)
    }
    fn sismember(&self, key: &str, member: &str) -> bazaar_core::Result<bool> {
        self.inner.sismember(key, member)
    }
    fn smembers(&self, key: &str) -> bazaar_core::Result<Vec<String>> {
        self.inner.smembers(key)
    }
    fn zscore(&self, key: &str, member: &str) -> bazaar_core::Result<Option<f64>> {
        self.inner.zscore(key, member)
    }
    fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> bazaar_core::Result<Vec<(String, f64)>> {
        self.inner.zrange_with_scores(key, start, stop)
    }
    fn zcard(&self, key: &str) -> bazaar_core::Result<usize> {
        self.inner.zcard(key)
    }
    fn hget(&self, key: &str, field: &str) -> bazaar_core::Result<Option<String>> {
        self.inner.hget(key, field)
    }
    fn hgetall(&self, key: &str) -> bazaar_core::Result<Vec<(String, String)>> {
        self.inner.hgetall(key)
    }
    fn info(&self, field: &str) -> bazaar_core::Result<Option<String>> {
        self.inner.info(field)
    }
    fn apply(&self, batch: WriteBatch) -> bazaar_core::Result<()> {
        self.inner.apply(batch)
    }
    fn watch(&self, keys: &[&str]) -> bazaar_core::Result<Watch> {
        self.inner.watch(keys)
    }
    fn exec(&self, _watch: Watch, _batch: WriteBatch) -> bazaar_core::Result<CommitResult> {
        self.execs.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::AlwaysConflict => Ok(CommitResult::Conflict),
            Fault::ConnectionLost => Err(bazaar_core::Error::Connection(
                "connection reset by peer".into(),
            )),
        }
    }
    fn unwatch(&self, watch: Watch) -> bazaar_core::Result<()> {
        self.unwatches.fetch_add(1, Ordering::SeqCst);
        self.inner.unwatch(watch)
    }
}
