use std::time::Duration;

use tracing::warn;

use mediakeep_core::AssetId;
use mediakeep_store::{AssetLock, AssetLockGuard};

use crate::error::EngineError;

/// TTL and wait budget for per-asset locks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LockSettings {
    pub ttl: Duration,
    pub timeout: Duration,
}

pub(crate) async fn acquire(
    lock: &dyn AssetLock,
    asset: &AssetId,
    settings: LockSettings,
) -> Result<Box<dyn AssetLockGuard>, EngineError> {
    lock.lock(asset, settings.ttl, settings.timeout)
        .await
        .map_err(|e| EngineError::LockFailed(format!("asset {asset}: {e}")))
}

/// Release a guard. A failed release is only logged; the lock lapses at its TTL.
pub(crate) async fn release(guard: Box<dyn AssetLockGuard>, asset: &AssetId) {
    if let Err(e) = guard.release().await {
        warn!(asset = %asset, error = %e, "asset lock release failed");
    }
}
