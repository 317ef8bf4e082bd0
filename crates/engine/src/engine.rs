use std::sync::Arc;

use mediakeep_core::Clock;

use crate::background::{SweepConfig, SweepProcessorBuilder};
use crate::catalog::AssetCatalog;
use crate::config::EngineConfig;
use crate::duplicates::DuplicateIndex;
use crate::metrics::EngineMetrics;
use crate::retention::RetentionEngine;
use crate::shares::ShareLinkAuthority;
use crate::sweeper::RetentionSweeper;
use crate::versions::VersionChain;

/// The media lifecycle engine.
///
/// Every component shares one repository, blob store, asset lock, clock and
/// metrics instance. Construct with [`EngineBuilder`](crate::EngineBuilder).
pub struct MediaEngine {
    pub(crate) catalog: AssetCatalog,
    pub(crate) retention: Arc<RetentionEngine>,
    pub(crate) versions: VersionChain,
    pub(crate) duplicates: DuplicateIndex,
    pub(crate) shares: ShareLinkAuthority,
    pub(crate) sweeper: Arc<RetentionSweeper>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Arc<EngineMetrics>,
    pub(crate) config: EngineConfig,
}

impl MediaEngine {
    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    pub fn retention(&self) -> &RetentionEngine {
        &self.retention
    }

    pub fn versions(&self) -> &VersionChain {
        &self.versions
    }

    pub fn duplicates(&self) -> &DuplicateIndex {
        &self.duplicates
    }

    pub fn shares(&self) -> &ShareLinkAuthority {
        &self.shares
    }

    /// The sweeper, shareable with a [`SweepProcessor`](crate::SweepProcessor).
    pub fn sweeper(&self) -> Arc<RetentionSweeper> {
        Arc::clone(&self.sweeper)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A processor builder already wired to this engine's sweeper and clock.
    pub fn sweep_processor(&self, config: SweepConfig) -> SweepProcessorBuilder {
        SweepProcessorBuilder::new()
            .config(config)
            .sweeper(self.sweeper())
            .clock(Arc::clone(&self.clock))
    }
}
