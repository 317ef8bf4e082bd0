//! Periodic retention sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use mediakeep_core::{Clock, SystemClock};

use crate::error::EngineError;
use crate::sweeper::{RetentionSweeper, SweepReport};

/// Configuration for the sweep processor.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps (default: 1 hour). The first sweep runs at start.
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
        }
    }
}

/// Emitted after every completed sweep.
#[derive(Debug, Clone)]
pub struct SweepEvent {
    pub report: SweepReport,
    pub swept_at: DateTime<Utc>,
}

/// Runs [`RetentionSweeper::sweep`] on an interval until shut down.
pub struct SweepProcessor {
    config: SweepConfig,
    sweeper: Arc<RetentionSweeper>,
    clock: Arc<dyn Clock>,
    shutdown_rx: mpsc::Receiver<()>,
    report_tx: Option<mpsc::Sender<SweepEvent>>,
}

impl SweepProcessor {
    pub(crate) fn new(
        config: SweepConfig,
        sweeper: Arc<RetentionSweeper>,
        clock: Arc<dyn Clock>,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            config,
            sweeper,
            clock,
            shutdown_rx,
            report_tx: None,
        }
    }

    /// Send a [`SweepEvent`] after each sweep.
    #[must_use]
    pub fn with_report_channel(mut self, tx: mpsc::Sender<SweepEvent>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    /// Run until shutdown is signaled or the shutdown sender is dropped.
    pub async fn run(&mut self) {
        info!(interval = ?self.config.interval, "sweep processor starting");

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("sweep processor received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "retention sweep failed");
                    }
                }
            }
        }

        info!("sweep processor stopped");
    }

    async fn run_once(&self) -> Result<(), EngineError> {
        let now = self.clock.now();
        let report = self.sweeper.sweep(now).await?;

        if let Some(ref tx) = self.report_tx {
            let event = SweepEvent {
                report,
                swept_at: now,
            };
            if tx.send(event).await.is_err() {
                warn!("sweep report channel closed");
            }
        }
        Ok(())
    }
}

/// Builder for [`SweepProcessor`].
#[derive(Default)]
pub struct SweepProcessorBuilder {
    config: SweepConfig,
    sweeper: Option<Arc<RetentionSweeper>>,
    clock: Option<Arc<dyn Clock>>,
    report_tx: Option<mpsc::Sender<SweepEvent>>,
}

impl SweepProcessorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: SweepConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn sweeper(mut self, sweeper: Arc<RetentionSweeper>) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    /// Clock used to timestamp each sweep. Defaults to the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn report_channel(mut self, tx: mpsc::Sender<SweepEvent>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    /// Build the processor.
    ///
    /// Returns the processor and a shutdown sender.
    pub fn build(self) -> Result<(SweepProcessor, mpsc::Sender<()>), EngineError> {
        let sweeper = self
            .sweeper
            .ok_or_else(|| EngineError::Configuration("sweeper is required".into()))?;
        if self.config.interval.is_zero() {
            return Err(EngineError::Configuration(
                "sweep interval must be positive".into(),
            ));
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let mut processor = SweepProcessor::new(self.config, sweeper, clock, shutdown_rx);
        if let Some(tx) = self.report_tx {
            processor = processor.with_report_channel(tx);
        }
        Ok((processor, shutdown_tx))
    }
}

#[cfg(test)]
mod tests {
    use mediakeep_blob::{BlobStore, MemoryBlobStore, PutHint};
    use mediakeep_core::{
        Asset, Client, ClientId, ManualClock, MediaKind, Project, ProjectId, RetentionDays,
        UserId,
    };
    use mediakeep_store::MediaRepository;
    use mediakeep_store_memory::{MemoryAssetLock, MemoryRepository};

    use super::*;
    use crate::builder::EngineBuilder;
    use crate::engine::MediaEngine;

    async fn engine_with_expired_asset(clock: Arc<ManualClock>) -> MediaEngine {
        let repo = Arc::new(MemoryRepository::new());
        let blobs = Arc::new(MemoryBlobStore::default());
        let now = clock.now();
        repo.insert_client(&Client {
            id: ClientId::new("c"),
            owner: UserId::new("o"),
            name: "c".into(),
            created_at: now,
        })
        .await
        .unwrap();
        repo.insert_project(&Project {
            id: ProjectId::new("p"),
            client: ClientId::new("c"),
            name: "p".into(),
            created_at: now,
        })
        .await
        .unwrap();
        let locator = blobs
            .put(bytes::Bytes::from_static(b"x"), &PutHint::upload(now))
            .await
            .unwrap();
        let asset = Asset::new(ProjectId::new("p"), locator, MediaKind::Image, now).with_id("a1");
        repo.insert_asset(&asset).await.unwrap();

        let engine = EngineBuilder::new()
            .repository(repo)
            .blob_store(blobs)
            .lock(Arc::new(MemoryAssetLock::new()))
            .clock(clock)
            .build()
            .unwrap();
        engine
            .retention()
            .soft_delete(&asset.id, Some(RetentionDays::new(0)))
            .await
            .unwrap();
        engine
    }

    #[test]
    fn builder_requires_sweeper() {
        assert!(matches!(
            SweepProcessorBuilder::new().build(),
            Err(EngineError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn builder_rejects_zero_interval() {
        let engine = engine_with_expired_asset(Arc::new(ManualClock::default())).await;
        let result = SweepProcessorBuilder::new()
            .config(SweepConfig {
                interval: Duration::ZERO,
            })
            .sweeper(engine.sweeper())
            .build();
        assert!(matches!(result, Err(EngineError::Configuration(ref m)) if m.contains("interval")));
    }

    #[test]
    fn default_interval_is_hourly() {
        assert_eq!(SweepConfig::default().interval, Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_each_tick_and_reports() {
        let clock = Arc::new(ManualClock::default());
        let engine = engine_with_expired_asset(clock.clone()).await;
        let (tx, mut rx) = mpsc::channel(4);

        let (mut processor, shutdown_tx) = SweepProcessorBuilder::new()
            .config(SweepConfig {
                interval: Duration::from_secs(60),
            })
            .sweeper(engine.sweeper())
            .clock(clock)
            .report_channel(tx)
            .build()
            .unwrap();
        let handle = tokio::spawn(async move { processor.run().await });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.report.purged_count, 1);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.report, SweepReport::default(), "nothing left to purge");

        shutdown_tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("processor should stop after shutdown")
            .unwrap();
        assert_eq!(engine.metrics().snapshot().sweeps, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_shutdown_sender_is_dropped() {
        let engine = engine_with_expired_asset(Arc::new(ManualClock::default())).await;
        let (mut processor, shutdown_tx) = SweepProcessorBuilder::new()
            .sweeper(engine.sweeper())
            .build()
            .unwrap();
        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(5), processor.run())
            .await
            .expect("processor should stop once the sender is gone");
    }
}
