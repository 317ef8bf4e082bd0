use std::sync::Arc;

use mediakeep_blob::BlobStore;
use mediakeep_core::{Clock, SystemClock};
use mediakeep_store::{AssetLock, MediaRepository};

use crate::catalog::AssetCatalog;
use crate::config::EngineConfig;
use crate::duplicates::DuplicateIndex;
use crate::engine::MediaEngine;
use crate::error::EngineError;
use crate::locking::LockSettings;
use crate::metrics::EngineMetrics;
use crate::retention::RetentionEngine;
use crate::shares::{ShareLinkAuthority, TokenGenerator};
use crate::sweeper::RetentionSweeper;
use crate::versions::VersionChain;

/// Fluent builder for a [`MediaEngine`].
///
/// A repository, a blob store and an asset lock must be supplied. The clock
/// defaults to [`SystemClock`] and the configuration to
/// [`EngineConfig::default`].
#[derive(Default)]
pub struct EngineBuilder {
    repo: Option<Arc<dyn MediaRepository>>,
    blobs: Option<Arc<dyn BlobStore>>,
    lock: Option<Arc<dyn AssetLock>>,
    clock: Option<Arc<dyn Clock>>,
    config: EngineConfig,
    metrics: Option<Arc<EngineMetrics>>,
    tokens: Option<TokenGenerator>,
}

impl EngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn repository(mut self, repo: Arc<dyn MediaRepository>) -> Self {
        self.repo = Some(repo);
        self
    }

    #[must_use]
    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    #[must_use]
    pub fn lock(mut self, lock: Arc<dyn AssetLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share metrics with another owner, e.g. a process-wide registry.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Override how share tokens are generated.
    #[must_use]
    pub fn token_generator(mut self, tokens: TokenGenerator) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn build(self) -> Result<MediaEngine, EngineError> {
        let repo = self
            .repo
            .ok_or_else(|| EngineError::Configuration("repository is required".into()))?;
        let blobs = self
            .blobs
            .ok_or_else(|| EngineError::Configuration("blob store is required".into()))?;
        let lock = self
            .lock
            .ok_or_else(|| EngineError::Configuration("asset lock is required".into()))?;

        let config = self.config;
        if config.hash_chunk_size == 0 {
            return Err(EngineError::Configuration(
                "hash_chunk_size must be positive".into(),
            ));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = self.metrics.unwrap_or_default();
        let lock_settings = LockSettings {
            ttl: config.lock_ttl,
            timeout: config.lock_timeout,
        };

        let catalog = AssetCatalog::new(
            Arc::clone(&repo),
            Arc::clone(&blobs),
            Arc::clone(&clock),
            Arc::clone(&metrics),
            config.hash_chunk_size,
        );
        let retention = Arc::new(RetentionEngine::new(
            Arc::clone(&repo),
            Arc::clone(&blobs),
            Arc::clone(&lock),
            Arc::clone(&clock),
            Arc::clone(&metrics),
            config.default_retention,
            lock_settings,
        ));
        let versions = VersionChain::new(
            Arc::clone(&repo),
            Arc::clone(&blobs),
            Arc::clone(&lock),
            Arc::clone(&clock),
            Arc::clone(&metrics),
            lock_settings,
            config.version_insert_retries,
            config.hash_chunk_size,
        );
        let mut shares = ShareLinkAuthority::new(
            Arc::clone(&repo),
            blobs,
            lock,
            Arc::clone(&clock),
            Arc::clone(&metrics),
            lock_settings,
            config.default_share_days,
            config.share_token_retries,
        );
        if let Some(tokens) = self.tokens {
            shares = shares.with_token_generator(tokens);
        }
        let sweeper = Arc::new(RetentionSweeper::new(
            Arc::clone(&repo),
            Arc::clone(&retention),
            Arc::clone(&metrics),
        ));
        let duplicates = DuplicateIndex::new(repo);

        Ok(MediaEngine {
            catalog,
            retention,
            versions,
            duplicates,
            shares,
            sweeper,
            clock,
            metrics,
            config,
        })
    }
}
