//! Configuration for Bazaar.
//!
//! Loaded from TOML; every field has a default, so an empty file is valid.
//!
//! ```toml
//! [market]
//! list_budget_ms = 5000
//! purchase_budget_ms = 10000
//! backoff_ms = 1
//! jitter = true
//!
//! [ingest]
//! flush_every = 1000
//! log_dir = "/var/log/bazaar"
//!
//! [session]
//! recent_views = 25
//! ```

use crate::error::{Error, Result};
use bazaar_concurrency::RetryPolicy;
use bazaar_ingest::IngestOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Marketplace retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Retry budget for `list_item`, in milliseconds
    pub list_budget_ms: u64,
    /// Retry budget for `purchase_item`, in milliseconds
    pub purchase_budget_ms: u64,
    /// Pause between conflicting attempts, in milliseconds
    pub backoff_ms: u64,
    /// Add random jitter to the pause
    pub jitter: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            list_budget_ms: RetryPolicy::LIST_BUDGET.as_millis() as u64,
            purchase_budget_ms: RetryPolicy::PURCHASE_BUDGET.as_millis() as u64,
            backoff_ms: RetryPolicy::DEFAULT_BACKOFF.as_millis() as u64,
            jitter: true,
        }
    }
}

impl MarketConfig {
    fn policy(&self, budget_ms: u64) -> RetryPolicy {
        let policy = RetryPolicy::with_budget(Duration::from_millis(budget_ms))
            .backoff(Duration::from_millis(self.backoff_ms));
        if self.jitter {
            policy
        } else {
            policy.without_jitter()
        }
    }

    /// Policy for listing
    pub fn list_policy(&self) -> RetryPolicy {
        self.policy(self.list_budget_ms)
    }

    /// Policy for purchasing
    pub fn purchase_policy(&self) -> RetryPolicy {
        self.policy(self.purchase_budget_ms)
    }
}

/// Ingestion settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Lines between flushes
    pub flush_every: usize,
    /// Directory holding the log files
    pub log_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            flush_every: IngestOptions::default().flush_every,
            log_dir: None,
        }
    }
}

impl IngestConfig {
    /// Pipeline options
    pub fn options(&self) -> IngestOptions {
        IngestOptions {
            flush_every: self.flush_every,
        }
    }
}

/// Session tracker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Recent views kept per token
    pub recent_views: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recent_views: bazaar_primitives::session::DEFAULT_RECENT_VIEWS,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BazaarConfig {
    /// `[market]`
    pub market: MarketConfig,
    /// `[ingest]`
    pub ingest: IngestConfig,
    /// `[session]`
    pub session: SessionConfig,
}

impl BazaarConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Reject settings no component can run with
    pub fn validate(&self) -> Result<()> {
        if self.ingest.flush_every == 0 {
            return Err(Error::Config("ingest.flush_every must be at least 1".into()));
        }
        if self.session.recent_views == 0 {
            return Err(Error::Config("session.recent_views must be at least 1".into()));
        }
        Ok(())
    }
}
