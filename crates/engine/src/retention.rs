//! Applies lifecycle transitions to storage.
//!
//! Each operation loads the asset, asks [`mediakeep_core::lifecycle`] for the
//! transition, and applies the resulting effects through the repository and
//! blob store. Soft-delete and restore run under the per-asset lock. Purge
//! holds the lock only while it re-checks the asset and removes the row; blob
//! deletion happens after the lock is released.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use mediakeep_blob::BlobStore;
use mediakeep_core::lifecycle::{self, Effect};
use mediakeep_core::{Asset, AssetId, BlobLocator, Clock, RetentionDays, RetentionRecord};
use mediakeep_store::{AssetLock, MediaRepository};

use crate::error::EngineError;
use crate::locking::{self, LockSettings};
use crate::metrics::EngineMetrics;

/// A blob that could not be removed during purge.
///
/// Non-fatal: the asset row is already gone when this is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageWarning {
    pub asset_id: AssetId,
    pub locator: BlobLocator,
    pub message: String,
}

impl std::fmt::Display for StorageWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "asset {}: could not delete blob {}: {}",
            self.asset_id, self.locator, self.message
        )
    }
}

/// Result of a purge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurgeOutcome {
    /// The row was removed. Blob deletions that failed are listed.
    Purged { warnings: Vec<StorageWarning> },
    /// The asset row was already gone, typically removed by a concurrent sweep.
    AlreadyPurged,
}

impl PurgeOutcome {
    #[must_use]
    pub fn is_purged(&self) -> bool {
        matches!(self, Self::Purged { .. })
    }
}

/// Soft-delete, restore and purge.
pub struct RetentionEngine {
    repo: Arc<dyn MediaRepository>,
    blobs: Arc<dyn BlobStore>,
    lock: Arc<dyn AssetLock>,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
    default_window: RetentionDays,
    lock_settings: LockSettings,
}

impl RetentionEngine {
    pub(crate) fn new(
        repo: Arc<dyn MediaRepository>,
        blobs: Arc<dyn BlobStore>,
        lock: Arc<dyn AssetLock>,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
        default_window: RetentionDays,
        lock_settings: LockSettings,
    ) -> Self {
        Self {
            repo,
            blobs,
            lock,
            clock,
            metrics,
            default_window,
            lock_settings,
        }
    }

    /// Window applied when `soft_delete` is called without one.
    #[must_use]
    pub fn default_window(&self) -> RetentionDays {
        self.default_window
    }

    /// Move an asset to the recycle bin.
    ///
    /// Returns the asset's retention record. An already soft-deleted asset is
    /// left as is and its original record is returned.
    #[instrument(skip(self), fields(asset = %asset_id))]
    pub async fn soft_delete(
        &self,
        asset_id: &AssetId,
        window: Option<RetentionDays>,
    ) -> Result<RetentionRecord, EngineError> {
        let window = window.unwrap_or(self.default_window);
        let guard = locking::acquire(self.lock.as_ref(), asset_id, self.lock_settings).await?;
        let result = self.soft_delete_locked(asset_id, window).await;
        locking::release(guard, asset_id).await;
        result
    }

    async fn soft_delete_locked(
        &self,
        asset_id: &AssetId,
        window: RetentionDays,
    ) -> Result<RetentionRecord, EngineError> {
        let asset = self.load(asset_id).await?;
        let existing = self.repo.get_retention(asset_id).await?;
        let transition = lifecycle::soft_delete(&asset, existing.as_ref(), window, self.clock.now());

        for effect in &transition.effects {
            if let Effect::MarkDeleted(record) = effect {
                if self.repo.soft_delete(record).await? {
                    self.metrics.increment_soft_deleted();
                    info!(expiry = %record.expiry, window = %window, "asset soft-deleted");
                    return Ok(record.clone());
                }
            }
        }

        // Already deleted, here or by another process between the read and the write.
        debug!("asset already soft-deleted");
        self.repo.get_retention(asset_id).await?.ok_or_else(|| {
            EngineError::InvalidState(format!(
                "asset {asset_id} is flagged deleted but has no retention record"
            ))
        })
    }

    /// Bring a soft-deleted asset back. Restoring an active asset is a no-op.
    #[instrument(skip(self), fields(asset = %asset_id))]
    pub async fn restore(&self, asset_id: &AssetId) -> Result<Asset, EngineError> {
        let guard = locking::acquire(self.lock.as_ref(), asset_id, self.lock_settings).await?;
        let result = self.restore_locked(asset_id).await;
        locking::release(guard, asset_id).await;
        result
    }

    async fn restore_locked(&self, asset_id: &AssetId) -> Result<Asset, EngineError> {
        let asset = self.load(asset_id).await?;
        let record = self.repo.get_retention(asset_id).await?;
        let transition = lifecycle::restore(&asset, record.as_ref());

        for effect in &transition.effects {
            if let Effect::ClearDeleted(id) = effect {
                if self.repo.restore(id).await? {
                    self.metrics.increment_restored();
                    info!("asset restored");
                }
            }
        }
        Ok(transition.asset.unwrap_or(asset))
    }

    /// Purge a soft-deleted asset whose retention window has elapsed.
    ///
    /// Fails with [`EngineError::InvalidState`] for active assets and for
    /// assets still inside their window.
    pub async fn purge(&self, asset_id: &AssetId) -> Result<PurgeOutcome, EngineError> {
        self.purge_at(asset_id, self.clock.now()).await
    }

    /// Purge as of `now`. Used by the sweeper so one pass shares one instant.
    #[instrument(skip(self), fields(asset = %asset_id))]
    pub async fn purge_at(
        &self,
        asset_id: &AssetId,
        now: DateTime<Utc>,
    ) -> Result<PurgeOutcome, EngineError> {
        let guard = locking::acquire(self.lock.as_ref(), asset_id, self.lock_settings).await?;
        let planned = self.remove_row_locked(asset_id, now).await;
        locking::release(guard, asset_id).await;

        let Some(blob_effects) = planned? else {
            debug!("asset already purged");
            return Ok(PurgeOutcome::AlreadyPurged);
        };

        let mut warnings = Vec::new();
        for effect in &blob_effects {
            if let Effect::DeleteBlob { asset_id, locator } = effect {
                if let Some(warning) = self.delete_blob(asset_id, locator).await {
                    warnings.push(warning);
                }
            }
        }

        self.metrics.increment_purged();
        info!(warnings = warnings.len(), "asset purged");
        Ok(PurgeOutcome::Purged { warnings })
    }

    /// Verify the asset is purgeable and delete its row.
    ///
    /// Returns the blob deletions still to perform, or `None` if the row was
    /// already gone.
    async fn remove_row_locked(
        &self,
        asset_id: &AssetId,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<Effect>>, EngineError> {
        let Some(asset) = self.repo.get_asset(asset_id).await? else {
            return Ok(None);
        };
        let record = self.repo.get_retention(asset_id).await?;
        let transition = lifecycle::purge(&asset, record.as_ref(), now)?;

        // Version bytes go with the asset.
        let versions = self.repo.list_versions(asset_id).await?;

        let mut blob_effects = Vec::new();
        for effect in transition.effects {
            match effect {
                Effect::DeleteAsset(id) => {
                    if !self.repo.delete_asset(&id).await? {
                        return Ok(None);
                    }
                }
                blob @ Effect::DeleteBlob { .. } => blob_effects.push(blob),
                Effect::MarkDeleted(_) | Effect::ClearDeleted(_) => {}
            }
        }
        blob_effects.extend(versions.into_iter().map(|v| Effect::DeleteBlob {
            asset_id: v.asset_id,
            locator: v.locator,
        }));
        Ok(Some(blob_effects))
    }

    /// Best-effort blob removal. An absent blob counts as removed.
    async fn delete_blob(&self, asset_id: &AssetId, locator: &BlobLocator) -> Option<StorageWarning> {
        match self.blobs.delete(locator).await {
            Ok(true) => None,
            Ok(false) => {
                warn!(asset = %asset_id, locator = %locator, "blob already absent during purge");
                None
            }
            Err(e) => {
                self.metrics.increment_storage_warnings();
                warn!(asset = %asset_id, locator = %locator, error = %e, "blob deletion failed");
                Some(StorageWarning {
                    asset_id: asset_id.clone(),
                    locator: locator.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn load(&self, asset_id: &AssetId) -> Result<Asset, EngineError> {
        self.repo
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("asset {asset_id}")))
    }
}
