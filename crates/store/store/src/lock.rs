use std::time::Duration;

use async_trait::async_trait;

use mediakeep_core::AssetId;

use crate::error::StoreError;

/// A held per-asset lock. Dropping without releasing is allowed (the lock
/// lapses after its TTL), but explicit release is preferred.
#[async_trait]
pub trait AssetLockGuard: Send + Sync {
    /// Explicitly release the lock.
    async fn release(self: Box<Self>) -> Result<(), StoreError>;

    /// Check whether this guard still owns the lock.
    async fn is_held(&self) -> Result<bool, StoreError>;
}

/// Single-writer lock scoped to one asset.
///
/// Serializes lifecycle operations on the same asset while leaving
/// operations on different assets fully parallel.
#[async_trait]
pub trait AssetLock: Send + Sync {
    /// Try to take the lock for `asset` without waiting.
    /// Returns `None` if another owner holds it.
    async fn try_lock(
        &self,
        asset: &AssetId,
        ttl: Duration,
    ) -> Result<Option<Box<dyn AssetLockGuard>>, StoreError>;

    /// Take the lock, waiting up to `timeout` for it to become free.
    async fn lock(
        &self,
        asset: &AssetId,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn AssetLockGuard>, StoreError>;
}

/// Name under which an asset's lock is stored by backends.
#[must_use]
pub fn lock_name(asset: &AssetId) -> String {
    format!("asset:{asset}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_dyn_guard(_: &dyn AssetLockGuard) {}
    fn _assert_dyn_lock(_: &dyn AssetLock) {}

    #[test]
    fn lock_name_is_scoped_to_asset() {
        assert_eq!(lock_name(&AssetId::new("a-1")), "asset:a-1");
    }
}
