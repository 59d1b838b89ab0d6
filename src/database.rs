//! Main entry point for Bazaar.
//!
//! This module provides the `Bazaar` struct, which wires every component to
//! one shared store.

use crate::config::BazaarConfig;
use crate::error::{Error, Result};
use bazaar_core::Store;
use bazaar_durability::{wait_for_sync, Checkpoint, CheckpointLedger, SyncOptions, SyncReport};
use bazaar_ingest::{DirectorySource, LogPipeline, LogSource};
use bazaar_primitives::{Market, SessionTracker};
use bazaar_storage::MemoryStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Marketplace, session tracking and log ingestion over one store.
///
/// # Example
///
/// ```
/// use bazaar::prelude::*;
///
/// let bazaar = Bazaar::in_memory();
/// bazaar.market.grant_item("userX", "itemX").unwrap();
/// let listed = bazaar.market.list_item("itemX", "userX", 10).unwrap();
/// assert!(listed.is_success());
/// ```
pub struct Bazaar {
    store: Arc<dyn Store>,
    config: BazaarConfig,

    /// Listing and purchasing
    pub market: Market,

    /// Session activity
    pub sessions: SessionTracker,
}

impl Bazaar {
    /// Bazaar over a fresh in-process store with default settings.
    pub fn in_memory() -> Self {
        Self::from_parts(Arc::new(MemoryStore::new()), BazaarConfig::default())
    }

    /// Create a builder.
    ///
    /// # Example
    ///
    /// ```
    /// use bazaar::prelude::*;
    /// use std::time::Duration;
    ///
    /// let bazaar = Bazaar::builder()
    ///     .purchase_budget(Duration::from_secs(2))
    ///     .flush_every(500)
    ///     .open()
    ///     .unwrap();
    /// assert_eq!(bazaar.config().ingest.flush_every, 500);
    /// ```
    pub fn builder() -> BazaarBuilder {
        BazaarBuilder::new()
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Settings in effect.
    pub fn config(&self) -> &BazaarConfig {
        &self.config
    }

    /// Ingestion pipeline over `source`, using the configured flush cadence.
    pub fn pipeline<S: LogSource>(&self, source: S) -> LogPipeline<S> {
        LogPipeline::new(Arc::clone(&self.store), source).with_options(self.config.ingest.options())
    }

    /// Ingestion pipeline over the configured `ingest.log_dir`.
    ///
    /// # Errors
    /// `Error::Config` if no log directory is configured.
    pub fn log_pipeline(&self) -> Result<LogPipeline<DirectorySource>> {
        let dir = self
            .config
            .ingest
            .log_dir
            .as_ref()
            .ok_or_else(|| Error::Config("ingest.log_dir is not set".into()))?;
        Ok(self.pipeline(DirectorySource::new(dir)))
    }

    /// Current ingestion checkpoint.
    pub fn checkpoint(&self) -> Result<Checkpoint> {
        Ok(CheckpointLedger::new(Arc::clone(&self.store)).read_progress()?)
    }

    /// Block until `replica` has caught up with this store.
    pub fn wait_for_replica(&self, replica: &dyn Store, options: &SyncOptions) -> Result<SyncReport> {
        Ok(wait_for_sync(self.store.as_ref(), replica, options)?)
    }

    fn from_parts(store: Arc<dyn Store>, config: BazaarConfig) -> Self {
        let market = Market::new(Arc::clone(&store))
            .with_list_policy(config.market.list_policy())
            .with_purchase_policy(config.market.purchase_policy());
        let sessions =
            SessionTracker::new(Arc::clone(&store)).with_recent_views(config.session.recent_views);
        Self {
            store,
            config,
            market,
            sessions,
        }
    }
}

impl std::fmt::Debug for Bazaar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bazaar")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Bazaar`].
///
/// Settings are applied in order: configuration file, then explicit
/// overrides.
#[derive(Default)]
pub struct BazaarBuilder {
    store: Option<Arc<dyn Store>>,
    config: BazaarConfig,
    config_file: Option<PathBuf>,
    overrides: Vec<Box<dyn FnOnce(&mut BazaarConfig) + Send>>,
}

impl BazaarBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `store` instead of a fresh in-process store.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Start from `config` instead of the defaults.
    pub fn config(mut self, config: BazaarConfig) -> Self {
        self.config = config;
        self
    }

    /// Load settings from a TOML file when opening.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    fn with(mut self, apply: impl FnOnce(&mut BazaarConfig) + Send + 'static) -> Self {
        self.overrides.push(Box::new(apply));
        self
    }

    /// Retry budget for listing.
    pub fn list_budget(self, budget: Duration) -> Self {
        self.with(move |c| c.market.list_budget_ms = budget.as_millis() as u64)
    }

    /// Retry budget for purchasing.
    pub fn purchase_budget(self, budget: Duration) -> Self {
        self.with(move |c| c.market.purchase_budget_ms = budget.as_millis() as u64)
    }

    /// Lines between ingestion flushes.
    pub fn flush_every(self, lines: usize) -> Self {
        self.with(move |c| c.ingest.flush_every = lines)
    }

    /// Directory holding the log files.
    pub fn log_dir(self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        self.with(move |c| c.ingest.log_dir = Some(dir))
    }

    /// Recent views kept per session token.
    pub fn recent_views(self, limit: usize) -> Self {
        self.with(move |c| c.session.recent_views = limit)
    }

    /// Build the [`Bazaar`].
    ///
    /// # Errors
    /// `Error::Config` or `Error::Io` if the configuration file cannot be
    /// loaded or the final settings are invalid.
    pub fn open(self) -> Result<Bazaar> {
        let mut config = match &self.config_file {
            Some(path) => BazaarConfig::from_file(path)?,
            None => self.config,
        };
        for apply in self.overrides {
            apply(&mut config);
        }
        config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn Store>);
        info!(
            list_budget_ms = config.market.list_budget_ms,
            purchase_budget_ms = config.market.purchase_budget_ms,
            flush_every = config.ingest.flush_every,
            "opening bazaar"
        );
        Ok(Bazaar::from_parts(store, config))
    }
}
