//! Worker configuration, loaded from `mediakeep.toml`.
//!
//! Every field has a default, so an empty or missing file yields a working
//! in-memory setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use mediakeep_core::RetentionDays;
use mediakeep_engine::{EngineConfig, SweepConfig};

use crate::error::WorkerError;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub store: StoreConfig,
    pub blob: BlobConfig,
    pub retention: RetentionConfig,
    pub sweeper: SweeperConfig,
}

/// Repository and asset lock backend.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `"memory"` or `"postgres"`.
    pub backend: String,
    /// Connection URL for `postgres`.
    pub url: Option<String>,
    /// Table prefix for `postgres`. Defaults to `"mediakeep_"`.
    pub prefix: Option<String>,
    /// Schema for `postgres`. Defaults to `"public"`.
    pub schema: Option<String>,
    /// How long a per-asset lock is held before it lapses.
    pub lock_ttl_seconds: u64,
    /// How long to wait for a per-asset lock.
    pub lock_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            url: None,
            prefix: None,
            schema: None,
            lock_ttl_seconds: 30,
            lock_timeout_seconds: 5,
        }
    }
}

/// Blob storage backend.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// `"memory"` or `"fs"`.
    pub backend: String,
    /// Root directory for `fs`.
    pub root: PathBuf,
    /// Prefix for public blob URLs.
    pub base_url: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            root: PathBuf::from("media"),
            base_url: "/media".to_owned(),
        }
    }
}

/// Retention and sharing defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days a soft-deleted asset stays restorable.
    pub default_days: i64,
    /// Days a share link stays valid when the issuer does not say.
    pub share_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_days: i64::from(mediakeep_core::DEFAULT_RETENTION_DAYS),
            share_days: mediakeep_engine::DEFAULT_SHARE_DAYS,
        }
    }
}

/// Background sweep schedule for `run`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600,
        }
    }
}

impl WorkerConfig {
    /// Read `path`, or fall back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, WorkerError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::parse(&contents)
        } else {
            Self::parse("")
        }
    }

    pub fn parse(contents: &str) -> Result<Self, WorkerError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants [`WorkerConfig::parse`] enforces. Call again
    /// after applying command-line overrides.
    pub fn validate(&self) -> Result<(), WorkerError> {
        RetentionDays::try_from(self.retention.default_days)
            .map_err(|e| WorkerError::Config(format!("[retention] default_days: {e}")))?;
        if self.sweeper.interval_seconds == 0 {
            return Err(WorkerError::Config(
                "[sweeper] interval_seconds must be positive".into(),
            ));
        }
        if self.store.lock_ttl_seconds == 0 {
            return Err(WorkerError::Config(
                "[store] lock_ttl_seconds must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Engine tunables derived from this file.
    pub fn engine_config(&self) -> Result<EngineConfig, WorkerError> {
        let default_retention = RetentionDays::try_from(self.retention.default_days)
            .map_err(|e| WorkerError::Config(format!("[retention] default_days: {e}")))?;
        Ok(EngineConfig {
            default_retention,
            default_share_days: self.retention.share_days,
            lock_ttl: Duration::from_secs(self.store.lock_ttl_seconds),
            lock_timeout: Duration::from_secs(self.store.lock_timeout_seconds),
            ..EngineConfig::default()
        })
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            interval: Duration::from_secs(self.sweeper.interval_seconds),
        }
    }
}
