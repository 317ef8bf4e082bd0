use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking lifecycle outcomes.
///
/// All counters use relaxed ordering. For a point-in-time view, call
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Assets registered through the catalog.
    pub assets_registered: AtomicU64,
    /// Active assets moved to the recycle bin.
    pub soft_deleted: AtomicU64,
    /// Assets brought back from the recycle bin.
    pub restored: AtomicU64,
    /// Assets permanently removed.
    pub purged: AtomicU64,
    /// Blob deletions that failed and were downgraded to warnings.
    pub storage_warnings: AtomicU64,
    /// Versions appended to an asset's chain.
    pub versions_added: AtomicU64,
    /// Share links issued.
    pub shares_issued: AtomicU64,
    /// Successful share link accesses.
    pub share_accesses: AtomicU64,
    /// Share link lookups rejected as unknown or expired.
    pub share_rejections: AtomicU64,
    /// Completed sweep passes.
    pub sweeps: AtomicU64,
}

impl EngineMetrics {
    pub fn increment_assets_registered(&self) {
        self.assets_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_soft_deleted(&self) {
        self.soft_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_restored(&self) {
        self.restored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_purged(&self) {
        self.purged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_storage_warnings(&self) {
        self.storage_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_versions_added(&self) {
        self.versions_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_shares_issued(&self) {
        self.shares_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_share_accesses(&self) {
        self.share_accesses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_share_rejections(&self) {
        self.share_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sweeps(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            assets_registered: self.assets_registered.load(Ordering::Relaxed),
            soft_deleted: self.soft_deleted.load(Ordering::Relaxed),
            restored: self.restored.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            storage_warnings: self.storage_warnings.load(Ordering::Relaxed),
            versions_added: self.versions_added.load(Ordering::Relaxed),
            shares_issued: self.shares_issued.load(Ordering::Relaxed),
            share_accesses: self.share_accesses.load(Ordering::Relaxed),
            share_rejections: self.share_rejections.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`EngineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub assets_registered: u64,
    pub soft_deleted: u64,
    pub restored: u64,
    pub purged: u64,
    pub storage_warnings: u64,
    pub versions_added: u64,
    pub shares_issued: u64,
    pub share_accesses: u64,
    pub share_rejections: u64,
    pub sweeps: u64,
}
