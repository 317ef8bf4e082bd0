//! Subcommand implementations, kept out of `main` so they can be tested
//! against an in-memory engine.

use std::future::Future;

use serde::Serialize;
use tracing::{info, warn};

use mediakeep_core::{Clock, RetentionRecord};
use mediakeep_engine::{DuplicateReport, MediaEngine, SweepConfig, SweepReport};

use crate::error::WorkerError;

/// Result of the `sweep` subcommand.
#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SweepOutput {
    /// `--dry-run`: what would be purged.
    DryRun { pending: Vec<RetentionRecord> },
    Swept { report: SweepReport },
}

/// One sweep pass at the engine clock's current time.
pub async fn sweep(engine: &MediaEngine, dry_run: bool) -> Result<SweepOutput, WorkerError> {
    if dry_run {
        return Ok(SweepOutput::DryRun {
            pending: pending(engine).await?,
        });
    }
    let report = engine.sweeper().sweep(engine.clock().now()).await?;
    for failure in &report.failures {
        warn!(
            asset = %failure.asset_id,
            kind = ?failure.kind,
            message = %failure.message,
            "sweep failure"
        );
    }
    Ok(SweepOutput::Swept { report })
}

/// Retention records eligible for purge right now.
pub async fn pending(engine: &MediaEngine) -> Result<Vec<RetentionRecord>, WorkerError> {
    Ok(engine.sweeper().pending(engine.clock().now()).await?)
}

pub async fn duplicates(engine: &MediaEngine) -> Result<DuplicateReport, WorkerError> {
    let report = engine.duplicates().scan().await?;
    info!(
        groups = report.groups.len(),
        redundant = report.redundant_count,
        "duplicate scan finished"
    );
    Ok(report)
}

/// Sweep on a schedule until `shutdown` resolves.
pub async fn run(
    engine: &MediaEngine,
    config: SweepConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<(), WorkerError> {
    let (mut processor, shutdown_tx) = engine.sweep_processor(config).build()?;
    let processor_task = tokio::spawn(async move { processor.run().await });

    shutdown.await;
    info!("stopping sweep processor");
    // The processor also stops if the sender is dropped, so a failed send is harmless.
    let _ = shutdown_tx.send(()).await;
    processor_task
        .await
        .map_err(|e| WorkerError::Config(format!("sweep processor task failed: {e}")))?;
    Ok(())
}

/// Render any output as pretty JSON.
pub fn render<T: Serialize>(value: &T) -> Result<String, WorkerError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mediakeep_core::{MediaKind, RetentionDays, UserId};
    use mediakeep_engine::AssetUpload;

    use super::*;
    use crate::config::WorkerConfig;
    use crate::factory::build_engine;

    async fn engine_with_deleted_asset() -> MediaEngine {
        let engine = build_engine(&WorkerConfig::default()).await.unwrap();
        let client = engine
            .catalog()
            .create_client(&UserId::new("o"), "client")
            .await
            .unwrap();
        let project = engine
            .catalog()
            .create_project(&client.id, "project")
            .await
            .unwrap();
        for _ in 0..2 {
            engine
                .catalog()
                .register_asset(AssetUpload::new(
                    project.id.clone(),
                    &b"same"[..],
                    MediaKind::Image,
                ))
                .await
                .unwrap();
        }
        let doomed = engine
            .catalog()
            .register_asset(AssetUpload::new(project.id, &b"gone"[..], MediaKind::Video))
            .await
            .unwrap();
        engine
            .retention()
            .soft_delete(&doomed.id, Some(RetentionDays::new(0)))
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn dry_run_leaves_records_in_place() {
        let engine = engine_with_deleted_asset().await;
        let SweepOutput::DryRun { pending } = sweep(&engine, true).await.unwrap() else {
            panic!("expected a dry run");
        };
        assert_eq!(pending.len(), 1);
        assert_eq!(self::pending(&engine).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_purges_and_renders() {
        let engine = engine_with_deleted_asset().await;
        let output = sweep(&engine, false).await.unwrap();
        let json = render(&output).unwrap();
        assert!(json.contains("\"mode\": \"swept\""), "{json}");
        assert!(json.contains("\"purged_count\": 1"), "{json}");
        assert!(self::pending(&engine).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_scan_counts_copies() {
        let engine = engine_with_deleted_asset().await;
        let report = duplicates(&engine).await.unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.redundant_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let engine = engine_with_deleted_asset().await;
        run(
            &engine,
            SweepConfig {
                interval: Duration::from_secs(60),
            },
            tokio::time::sleep(Duration::from_secs(90)),
        )
        .await
        .unwrap();
        assert!(engine.metrics().snapshot().sweeps >= 1);
        assert_eq!(engine.metrics().snapshot().purged, 1);
    }

    #[tokio::test]
    async fn run_rejects_zero_interval() {
        let engine = engine_with_deleted_asset().await;
        let result = run(
            &engine,
            SweepConfig {
                interval: Duration::ZERO,
            },
            std::future::ready(()),
        )
        .await;
        assert!(matches!(
            result,
            Err(WorkerError::Engine(mediakeep_engine::EngineError::Configuration(_)))
        ));
        assert_eq!(engine.metrics().snapshot().sweeps, 0);
    }
}
