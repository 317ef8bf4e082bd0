//! Per-asset version history.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use mediakeep_blob::{BlobStore, PutHint};
use mediakeep_core::version::sort_newest_first;
use mediakeep_core::{
    Asset, AssetId, Clock, UserId, Version, VersionId, fingerprint_reader, next_version_number,
};
use mediakeep_store::{AssetLock, MediaRepository};

use crate::error::EngineError;
use crate::locking::{self, LockSettings};
use crate::metrics::EngineMetrics;

/// Appends immutable versions to an asset.
///
/// Numbers follow the highest number in use, so they stay strictly
/// increasing even when older rows are removed. Adds for one asset are
/// serialized by the per-asset lock; a writer in another process that bypasses
/// the lock still cannot reuse a number because the repository rejects it and
/// the add retries with the next one.
pub struct VersionChain {
    repo: Arc<dyn MediaRepository>,
    blobs: Arc<dyn BlobStore>,
    lock: Arc<dyn AssetLock>,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
    lock_settings: LockSettings,
    insert_retries: u32,
    chunk_size: usize,
}

impl VersionChain {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        repo: Arc<dyn MediaRepository>,
        blobs: Arc<dyn BlobStore>,
        lock: Arc<dyn AssetLock>,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
        lock_settings: LockSettings,
        insert_retries: u32,
        chunk_size: usize,
    ) -> Self {
        Self {
            repo,
            blobs,
            lock,
            clock,
            metrics,
            lock_settings,
            insert_retries,
            chunk_size,
        }
    }

    /// Store `data` as the next version of an active asset.
    ///
    /// The bytes are fingerprinted and written before the per-asset lock is
    /// taken; the lock covers only the re-check and the numbered insert. The
    /// asset's own locator and fingerprint are left untouched.
    #[instrument(skip(self, data, note), fields(asset = %asset_id, size = data.len()))]
    pub async fn add_version(
        &self,
        asset_id: &AssetId,
        data: Bytes,
        created_by: &UserId,
        note: Option<String>,
    ) -> Result<Version, EngineError> {
        if data.is_empty() {
            return Err(EngineError::Validation("version content is empty".into()));
        }
        self.active_asset(asset_id).await?;

        let fingerprint = fingerprint_reader(data.as_ref(), self.chunk_size)?;
        let now = self.clock.now();
        let locator = self.blobs.put(data, &PutHint::version(now)).await?;

        let mut version = Version {
            id: VersionId::generate(),
            asset_id: asset_id.clone(),
            version_number: 0,
            locator,
            fingerprint: Some(fingerprint),
            created_by: created_by.clone(),
            note,
            created_at: now,
        };

        let result = match locking::acquire(self.lock.as_ref(), asset_id, self.lock_settings).await
        {
            Ok(guard) => {
                let inserted = self.insert_locked(&mut version).await;
                locking::release(guard, asset_id).await;
                inserted
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(true) => {
                self.metrics.increment_versions_added();
                info!(version = version.version_number, "version added");
                Ok(version)
            }
            Ok(false) => {
                self.discard_blob(&version).await;
                Err(EngineError::Conflict(format!(
                    "asset {asset_id}: no free version number after {} retries",
                    self.insert_retries
                )))
            }
            Err(e) => {
                self.discard_blob(&version).await;
                Err(e)
            }
        }
    }

    /// The asset may have been deleted while the bytes were uploading.
    async fn insert_locked(&self, version: &mut Version) -> Result<bool, EngineError> {
        self.active_asset(&version.asset_id).await?;
        self.insert_next(version).await
    }

    /// Try successive numbers until one sticks or retries run out.
    async fn insert_next(&self, version: &mut Version) -> Result<bool, EngineError> {
        for attempt in 0..=self.insert_retries {
            let highest = self.repo.latest_version_number(&version.asset_id).await?;
            version.version_number = next_version_number(highest);
            if self.repo.insert_version(version).await? {
                return Ok(true);
            }
            debug!(
                attempt,
                version = version.version_number,
                "version number taken, retrying"
            );
        }
        Ok(false)
    }

    async fn discard_blob(&self, version: &Version) {
        if let Err(e) = self.blobs.delete(&version.locator).await {
            warn!(
                asset = %version.asset_id,
                locator = %version.locator,
                error = %e,
                "failed to remove blob of rejected version"
            );
        }
    }

    /// Versions of an active asset, newest first.
    pub async fn list_versions(&self, asset_id: &AssetId) -> Result<Vec<Version>, EngineError> {
        self.active_asset(asset_id).await?;
        let mut versions = self.repo.list_versions(asset_id).await?;
        sort_newest_first(&mut versions);
        Ok(versions)
    }

    async fn active_asset(&self, asset_id: &AssetId) -> Result<Asset, EngineError> {
        self.repo
            .get_asset(asset_id)
            .await?
            .filter(Asset::is_active)
            .ok_or_else(|| EngineError::NotFound(format!("asset {asset_id}")))
    }
}
