//! Retention expiry sweeps.
//!
//! A sweep lists every retention record whose expiry has passed and purges
//! each asset independently: one bad record never stops the rest. Sweeps are
//! safe to run concurrently from several workers; an asset another sweep got
//! to first is skipped without being reported.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use mediakeep_core::{AssetId, RetentionRecord};
use mediakeep_store::MediaRepository;

use crate::error::EngineError;
use crate::metrics::EngineMetrics;
use crate::retention::{PurgeOutcome, RetentionEngine};

/// Where a sweep failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Blob deletion failed. The asset row was still purged.
    Storage,
    /// The asset could not be purged. It stays in the recycle bin and is
    /// picked up again by the next sweep.
    Repository,
}

/// One asset the sweep could not fully clean up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub asset_id: AssetId,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of a sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Asset rows removed by this pass.
    pub purged_count: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Purges soft-deleted assets whose retention window has elapsed.
pub struct RetentionSweeper {
    repo: Arc<dyn MediaRepository>,
    retention: Arc<RetentionEngine>,
    metrics: Arc<EngineMetrics>,
}

impl RetentionSweeper {
    pub(crate) fn new(
        repo: Arc<dyn MediaRepository>,
        retention: Arc<RetentionEngine>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            repo,
            retention,
            metrics,
        }
    }

    /// Records that a sweep at `now` would purge, soonest expiry first.
    pub async fn pending(&self, now: DateTime<Utc>) -> Result<Vec<RetentionRecord>, EngineError> {
        Ok(self.repo.list_expired_retention(now).await?)
    }

    /// Purge every asset whose retention expired at or before `now`.
    ///
    /// Only listing the expired records can fail the whole pass; everything
    /// after that is reported per asset.
    #[instrument(skip(self), fields(now = %now))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, EngineError> {
        let expired = self.pending(now).await?;
        debug!(candidates = expired.len(), "sweep starting");

        let mut report = SweepReport::default();
        for record in expired {
            let asset_id = record.asset_id;
            match self.retention.purge_at(&asset_id, now).await {
                Ok(PurgeOutcome::Purged { warnings }) => {
                    report.purged_count += 1;
                    report
                        .failures
                        .extend(warnings.into_iter().map(|w| SweepFailure {
                            asset_id: w.asset_id,
                            kind: FailureKind::Storage,
                            message: format!("blob {}: {}", w.locator, w.message),
                        }));
                }
                Ok(PurgeOutcome::AlreadyPurged) => {
                    debug!(asset = %asset_id, "already purged, skipping");
                }
                Err(EngineError::InvalidState(reason)) => {
                    // Restored (or re-deleted with a later expiry) since the listing.
                    debug!(asset = %asset_id, reason = %reason, "no longer eligible, skipping");
                }
                Err(e) => {
                    warn!(asset = %asset_id, error = %e, "purge failed");
                    report.failures.push(SweepFailure {
                        asset_id,
                        kind: FailureKind::Repository,
                        message: e.to_string(),
                    });
                }
            }
        }

        self.metrics.increment_sweeps();
        info!(
            purged = report.purged_count,
            failures = report.failures.len(),
            "sweep complete"
        );
        Ok(report)
    }
}
