use std::time::Duration;

use mediakeep_core::{DEFAULT_CHUNK_SIZE, RetentionDays};

/// Days a share link stays valid when the issuer does not say.
pub const DEFAULT_SHARE_DAYS: i64 = 7;

/// Tunables shared by the engine components.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retention window used when a soft-delete does not pass one.
    pub default_retention: RetentionDays,
    /// Share link lifetime used when the issuer does not pass one.
    pub default_share_days: i64,
    /// Extra attempts after a share token collision before giving up.
    pub share_token_retries: u32,
    /// Extra attempts after losing a version-number race before giving up.
    pub version_insert_retries: u32,
    /// TTL for per-asset locks.
    pub lock_ttl: Duration,
    /// How long to wait for a per-asset lock.
    pub lock_timeout: Duration,
    /// Read size used when fingerprinting content.
    pub hash_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_retention: RetentionDays::default(),
            default_share_days: DEFAULT_SHARE_DAYS,
            share_token_retries: 3,
            version_insert_retries: 5,
            lock_ttl: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(5),
            hash_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_retention.days(), 7);
        assert_eq!(cfg.default_share_days, 7);
        assert_eq!(cfg.share_token_retries, 3);
        assert_eq!(cfg.hash_chunk_size, 4096);
    }
}
