use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use uuid::Uuid;

use mediakeep_core::AssetId;
use mediakeep_store::error::StoreError;
use mediakeep_store::lock::{AssetLock, AssetLockGuard, lock_name};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
struct Held {
    owner: String,
    expires_at: Instant,
}

impl Held {
    fn lapsed(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process [`AssetLock`] backed by a [`DashMap`].
///
/// Suitable when a single engine instance owns the repository. Lapsed locks
/// are evicted lazily on the next attempt for the same asset.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetLock {
    held: Arc<DashMap<String, Held>>,
}

impl MemoryAssetLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of locks currently recorded, including lapsed ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

#[async_trait]
impl AssetLock for MemoryAssetLock {
    async fn try_lock(
        &self,
        asset: &AssetId,
        ttl: Duration,
    ) -> Result<Option<Box<dyn AssetLockGuard>>, StoreError> {
        let name = lock_name(asset);
        self.held.remove_if(&name, |_, h| h.lapsed());

        match self.held.entry(name.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let owner = Uuid::new_v4().to_string();
                slot.insert(Held {
                    owner: owner.clone(),
                    expires_at: Instant::now() + ttl,
                });
                Ok(Some(Box::new(MemoryLockGuard {
                    held: Arc::clone(&self.held),
                    name,
                    owner,
                })))
            }
        }
    }

    async fn lock(
        &self,
        asset: &AssetId,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Box<dyn AssetLockGuard>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(guard) = self.try_lock(asset, ttl).await? {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(StoreError::Timeout(timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Guard returned by [`MemoryAssetLock`].
#[derive(Debug)]
pub struct MemoryLockGuard {
    held: Arc<DashMap<String, Held>>,
    name: String,
    owner: String,
}

#[async_trait]
impl AssetLockGuard for MemoryLockGuard {
    async fn release(self: Box<Self>) -> Result<(), StoreError> {
        // A lapsed lock may already belong to someone else.
        self.held.remove_if(&self.name, |_, h| h.owner == self.owner);
        Ok(())
    }

    async fn is_held(&self) -> Result<bool, StoreError> {
        Ok(self
            .held
            .get(&self.name)
            .is_some_and(|h| h.owner == self.owner && !h.lapsed()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use mediakeep_store::testing::run_lock_conformance_tests;

    use super::*;

    #[tokio::test]
    async fn conformance() {
        let lock = MemoryAssetLock::new();
        run_lock_conformance_tests(&lock)
            .await
            .expect("lock conformance tests should pass");
    }

    #[tokio::test(start_paused = true)]
    async fn lock_lapses_after_ttl() {
        let lock = MemoryAssetLock::new();
        let asset = AssetId::new("a-ttl");

        let guard = lock
            .try_lock(&asset, Duration::from_secs(2))
            .await
            .unwrap()
            .expect("should acquire");
        assert!(guard.is_held().await.unwrap());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!guard.is_held().await.unwrap());

        let next = lock
            .try_lock(&asset, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(next.is_some(), "lapsed lock can be taken over");

        // The stale guard must not free the new owner's lock.
        guard.release().await.unwrap();
        assert!(next.unwrap().is_held().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn lock_waits_for_release() {
        let lock = MemoryAssetLock::new();
        let asset = AssetId::new("a-wait");
        let guard = lock
            .try_lock(&asset, Duration::from_secs(30))
            .await
            .unwrap()
            .expect("should acquire");

        let waiter = {
            let lock = lock.clone();
            let asset = asset.clone();
            tokio::spawn(async move {
                lock.lock(&asset, Duration::from_secs(5), Duration::from_secs(10))
                    .await
            })
        };

        tokio::time::advance(Duration::from_millis(500)).await;
        guard.release().await.unwrap();

        let acquired = waiter.await.unwrap();
        assert!(acquired.is_ok(), "waiter should get the lock after release");
    }

    #[tokio::test]
    async fn one_holder_at_a_time() {
        let lock = Arc::new(MemoryAssetLock::new());
        let inside = Arc::new(AtomicU32::new(0));
        let done = Arc::new(AtomicU32::new(0));
        let asset = AssetId::new("a-contended");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let done = Arc::clone(&done);
            let asset = asset.clone();
            handles.push(tokio::spawn(async move {
                let guard = lock
                    .lock(&asset, Duration::from_secs(5), Duration::from_secs(5))
                    .await
                    .expect("should eventually acquire");
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::task::yield_now().await;
                inside.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
                guard.release().await.expect("release should succeed");
            }));
        }
        for h in handles {
            h.await.expect("task should not panic");
        }
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert!(lock.is_empty());
    }
}
