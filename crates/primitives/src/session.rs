//! Session token tracker
//!
//! Records which user a token belongs to, when it was last active, and the
//! items it viewed. This is telemetry: writes are unconditional and the last
//! writer wins, so no watch or retry is involved.
//!
//! ```text
//! login:           hash  token -> user
//! recent:          zset  token scored by last activity
//! viewed:<token>   zset  item scored by view time, newest 25 kept
//! viewed:          zset  item scored by -(view count)
//! ```
//!
//! All writes for one activity event go out in a single batch.

use bazaar_core::{keys, Result, Store, WriteBatch};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Default number of recent views kept per token
pub const DEFAULT_RECENT_VIEWS: usize = 25;

/// Tracks session activity in the shared store
#[derive(Clone)]
pub struct SessionTracker {
    store: Arc<dyn Store>,
    recent_views: usize,
}

impl SessionTracker {
    /// Tracker keeping the default 25 recent views per token
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            recent_views: DEFAULT_RECENT_VIEWS,
        }
    }

    /// Keep `limit` recent views per token instead (at least 1, at most
    /// `i64::MAX`)
    pub fn with_recent_views(mut self, limit: usize) -> Self {
        self.recent_views = limit.clamp(1, i64::MAX as usize);
        self
    }

    /// Record activity for `token` now
    pub fn record_activity(&self, token: &str, user: &str, item: Option<&str>) -> Result<()> {
        self.record_activity_at(token, user, item, Utc::now())
    }

    /// Record activity for `token` at `at`
    pub fn record_activity_at(
        &self,
        token: &str,
        user: &str,
        item: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let score = at.timestamp_millis() as f64 / 1000.0;
        let mut batch = WriteBatch::new();
        batch
            .hset(keys::LOGIN, token, user)
            .zadd(keys::RECENT, token, score);

        if let Some(item) = item {
            let viewed = keys::viewed_by(token);
            batch
                .zadd(viewed.as_str(), item, score)
                .zrem_range_by_rank(viewed, 0, -(self.recent_views as i64) - 1)
                .zincr_by(keys::VIEWED, item, -1.0);
        }
        self.store.apply(batch)
    }

    /// User a token belongs to
    pub fn user_for_token(&self, token: &str) -> Result<Option<String>> {
        self.store.hget(keys::LOGIN, token)
    }

    /// When `token` was last active
    pub fn last_seen(&self, token: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .zscore(keys::RECENT, token)?
            .and_then(|secs| Utc.timestamp_millis_opt((secs * 1000.0).round() as i64).single()))
    }

    /// Items viewed by `token`, newest first
    pub fn recent_views(&self, token: &str) -> Result<Vec<String>> {
        let mut views: Vec<String> = self
            .store
            .zrange_with_scores(&keys::viewed_by(token), 0, -1)?
            .into_iter()
            .map(|(item, _)| item)
            .collect();
        views.reverse();
        Ok(views)
    }

    /// Global view tally of `item` (0 if never viewed)
    pub fn view_count(&self, item: &str) -> Result<u64> {
        let score = self.store.zscore(keys::VIEWED, item)?.unwrap_or(0.0);
        Ok((-score).max(0.0) as u64)
    }
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("recent_views", &self.recent_views)
            .finish_non_exhaustive()
    }
}
