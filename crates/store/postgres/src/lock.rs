use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::time::Instant;

use mediakeep_core::AssetId;
use mediakeep_store::error::StoreError;
use mediakeep_store::lock::{AssetLock, AssetLockGuard, lock_name};

use crate::config::PostgresConfig;
use crate::migrations;

/// Retry interval when waiting for a held lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// PostgreSQL-backed implementation of [`AssetLock`].
///
/// One row per held lock in the `{prefix}asset_locks` table. Lapsed rows are
/// removed before each attempt so a crashed holder cannot block an asset
/// beyond its TTL.
pub struct PostgresAssetLock {
    pool: PgPool,
    config: Arc<PostgresConfig>,
}

impl PostgresAssetLock {
    /// Connect, create the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if pool creation fails, or
    /// [`StoreError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        let pool = crate::store::connect(&config).await?;
        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    /// Build from an existing pool, typically the one behind a
    /// [`PostgresRepository`](crate::PostgresRepository).
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    async fn clean_lapsed(&self) -> Result<(), StoreError> {
        let table = self.config.locks_table();
        let query = format!("DELETE FROM {table} WHERE expires_at <= NOW()");
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AssetLock for PostgresAssetLock {
    async fn try_lock(
        &self,
        asset: &AssetId,
        ttl: Duration,
    ) -> Result<Option<Box<dyn AssetLockGuard>>, StoreError> {
        self.clean_lapsed().await?;

        let table = self.config.locks_table();
        let name = lock_name(asset);
        let owner = uuid::Uuid::new_v4().to_string();
        let expires_at = chrono::Utc::now() + ttl;

        let query = format!(
            "INSERT INTO {table} (name, owner, expires_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO NOTHING"
        );
        let result = sqlx::query(&query)
            .bind(&name)
            .bind(&owner)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(Box::new(PostgresLockGuard {
            pool: self.pool.clone(),
            config: Arc::clone(&self.config),
            name,
            owner,
        })))
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
            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::Timeout(timeout));
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

/// A held asset lock row.
pub struct PostgresLockGuard {
    pool: PgPool,
    config: Arc<PostgresConfig>,
    name: String,
    owner: String,
}

#[async_trait]
impl AssetLockGuard for PostgresLockGuard {
    async fn release(self: Box<Self>) -> Result<(), StoreError> {
        let table = self.config.locks_table();
        let query = format!("DELETE FROM {table} WHERE name = $1 AND owner = $2");
        sqlx::query(&query)
            .bind(&self.name)
            .bind(&self.owner)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn is_held(&self) -> Result<bool, StoreError> {
        let table = self.config.locks_table();
        let query = format!(
            "SELECT 1 FROM {table} WHERE name = $1 AND owner = $2 AND expires_at > NOW()"
        );
        let row: Option<(i32,)> = sqlx::query_as(&query)
            .bind(&self.name)
            .bind(&self.owner)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(row.is_some())
    }
}
