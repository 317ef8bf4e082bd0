use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use mediakeep_core::{
    Asset, AssetId, BlobLocator, Client, ClientId, Fingerprint, MediaKind, Permission, Project,
    ProjectId, RetentionRecord, ShareLink, ShareLinkId, ShareToken, UserId, Version, VersionId,
    WorkflowStatus,
};
use mediakeep_store::error::StoreError;
use mediakeep_store::repository::{AssetFilter, MediaRepository};

use crate::config::PostgresConfig;
use crate::migrations;

/// Build `PgConnectOptions` from a [`PostgresConfig`], applying SSL settings
/// when configured.
pub(crate) fn build_connect_options(
    config: &PostgresConfig,
) -> Result<sqlx::postgres::PgConnectOptions, StoreError> {
    let mut options: sqlx::postgres::PgConnectOptions = config
        .url
        .parse()
        .map_err(|e: sqlx::Error| StoreError::Connection(e.to_string()))?;

    if let Some(ref mode) = config.ssl_mode {
        let ssl_mode = match mode.as_str() {
            "disable" => sqlx::postgres::PgSslMode::Disable,
            "prefer" => sqlx::postgres::PgSslMode::Prefer,
            "require" => sqlx::postgres::PgSslMode::Require,
            "verify-ca" => sqlx::postgres::PgSslMode::VerifyCa,
            "verify-full" => sqlx::postgres::PgSslMode::VerifyFull,
            other => {
                return Err(StoreError::Connection(format!("unknown ssl_mode: {other}")));
            }
        };
        options = options.ssl_mode(ssl_mode);
    }
    if let Some(ref path) = config.ssl_root_cert {
        options = options.ssl_root_cert(path);
    }
    if let Some(ref path) = config.ssl_cert {
        options = options.ssl_client_cert(path);
    }
    if let Some(ref path) = config.ssl_key {
        options = options.ssl_client_key(path);
    }
    Ok(options)
}

/// Open a pool and run migrations.
pub(crate) async fn connect(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    let connect_options = build_connect_options(config)?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect_with(connect_options)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    migrations::run_migrations(&pool, config)
        .await
        .map_err(backend)?;
    debug!(schema = %config.schema, prefix = %config.table_prefix, "postgres migrations applied");
    Ok(pool)
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map constraint violations on insert to the repository's error vocabulary.
fn insert_error(
    e: sqlx::Error,
    conflict: impl FnOnce() -> String,
    missing: impl FnOnce() -> String,
) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return StoreError::Conflict(conflict());
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound(missing());
        }
    }
    backend(e)
}

fn decode<T, E: std::fmt::Display>(value: Result<T, E>) -> Result<T, StoreError> {
    value.map_err(|e| StoreError::Serialization(e.to_string()))
}

fn client_from_row(row: &PgRow) -> Result<Client, StoreError> {
    Ok(Client {
        id: ClientId::new(row.try_get::<String, _>("id").map_err(backend)?),
        owner: UserId::new(row.try_get::<String, _>("owner").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn project_from_row(row: &PgRow) -> Result<Project, StoreError> {
    Ok(Project {
        id: ProjectId::new(row.try_get::<String, _>("id").map_err(backend)?),
        client: ClientId::new(row.try_get::<String, _>("client_id").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn asset_from_row(row: &PgRow) -> Result<Asset, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(Asset {
        id: AssetId::new(row.try_get::<String, _>("id").map_err(backend)?),
        project: ProjectId::new(row.try_get::<String, _>("project_id").map_err(backend)?),
        uploaded_by: row
            .try_get::<Option<String>, _>("uploaded_by")
            .map_err(backend)?
            .map(UserId::new),
        locator: BlobLocator::new(row.try_get::<String, _>("locator").map_err(backend)?),
        kind: decode(MediaKind::parse(&kind))?,
        status: decode(WorkflowStatus::parse(&status))?,
        fingerprint: row
            .try_get::<Option<String>, _>("fingerprint")
            .map_err(backend)?
            .map(Fingerprint::new),
        is_deleted: row.try_get("is_deleted").map_err(backend)?,
        deleted_at: row.try_get("deleted_at").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn retention_from_row(row: &PgRow) -> Result<RetentionRecord, StoreError> {
    Ok(RetentionRecord {
        asset_id: AssetId::new(row.try_get::<String, _>("asset_id").map_err(backend)?),
        deleted_at: row.try_get("deleted_at").map_err(backend)?,
        expiry: row.try_get("expiry").map_err(backend)?,
    })
}

fn version_from_row(row: &PgRow) -> Result<Version, StoreError> {
    let number: i32 = row.try_get("version_number").map_err(backend)?;
    Ok(Version {
        id: VersionId::new(row.try_get::<String, _>("id").map_err(backend)?),
        asset_id: AssetId::new(row.try_get::<String, _>("asset_id").map_err(backend)?),
        version_number: decode(u32::try_from(number))?,
        locator: BlobLocator::new(row.try_get::<String, _>("locator").map_err(backend)?),
        fingerprint: row
            .try_get::<Option<String>, _>("fingerprint")
            .map_err(backend)?
            .map(Fingerprint::new),
        created_by: UserId::new(row.try_get::<String, _>("created_by").map_err(backend)?),
        note: row.try_get("note").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn share_link_from_row(row: &PgRow) -> Result<ShareLink, StoreError> {
    let permission: String = row.try_get("permission").map_err(backend)?;
    let access_count: i64 = row.try_get("access_count").map_err(backend)?;
    Ok(ShareLink {
        id: ShareLinkId::new(row.try_get::<String, _>("id").map_err(backend)?),
        asset_id: AssetId::new(row.try_get::<String, _>("asset_id").map_err(backend)?),
        token: ShareToken::new(row.try_get::<String, _>("token").map_err(backend)?),
        created_by: UserId::new(row.try_get::<String, _>("created_by").map_err(backend)?),
        permission: decode(Permission::parse(&permission))?,
        expires_at: row.try_get("expires_at").map_err(backend)?,
        access_count: decode(u64::try_from(access_count))?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

/// PostgreSQL-backed implementation of [`MediaRepository`].
///
/// Insert-if-absent operations rely on `ON CONFLICT DO NOTHING` and the
/// unique constraints created by [`migrations::run_migrations`], so they stay
/// correct across several worker processes sharing one database.
pub struct PostgresRepository {
    pool: PgPool,
    config: Arc<PostgresConfig>,
}

impl PostgresRepository {
    /// Connect, create the pool, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if pool creation fails, or
    /// [`StoreError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        let pool = connect(&config).await?;
        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    /// Build from an existing pool, for sharing it with [`PostgresAssetLock`](crate::PostgresAssetLock).
    /// Runs migrations on creation.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(backend)?;
        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn version_number(n: u32) -> Result<i32, StoreError> {
        i32::try_from(n).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl MediaRepository for PostgresRepository {
    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        let table = self.config.clients_table();
        let query =
            format!("INSERT INTO {table} (id, owner, name, created_at) VALUES ($1, $2, $3, $4)");
        sqlx::query(&query)
            .bind(client.id.as_str())
            .bind(client.owner.as_str())
            .bind(&client.name)
            .bind(client.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                insert_error(
                    e,
                    || format!("client {}", client.id),
                    || format!("client {}", client.id),
                )
            })?;
        Ok(())
    }

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StoreError> {
        let table = self.config.clients_table();
        let query = format!("SELECT id, owner, name, created_at FROM {table} WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(client_from_row).transpose()
    }

    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        let table = self.config.projects_table();
        let query = format!(
            "INSERT INTO {table} (id, client_id, name, created_at) VALUES ($1, $2, $3, $4)"
        );
        sqlx::query(&query)
            .bind(project.id.as_str())
            .bind(project.client.as_str())
            .bind(&project.name)
            .bind(project.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                insert_error(
                    e,
                    || format!("project {}", project.id),
                    || format!("client {}", project.client),
                )
            })?;
        Ok(())
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        let table = self.config.projects_table();
        let query = format!("SELECT id, client_id, name, created_at FROM {table} WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn insert_asset(&self, asset: &Asset) -> Result<(), StoreError> {
        let table = self.config.assets_table();
        let query = format!(
            "INSERT INTO {table} \
             (id, project_id, uploaded_by, locator, kind, status, fingerprint, is_deleted, deleted_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        sqlx::query(&query)
            .bind(asset.id.as_str())
            .bind(asset.project.as_str())
            .bind(asset.uploaded_by.as_deref())
            .bind(asset.locator.as_str())
            .bind(asset.kind.as_str())
            .bind(asset.status.as_str())
            .bind(asset.fingerprint.as_deref())
            .bind(asset.is_deleted)
            .bind(asset.deleted_at)
            .bind(asset.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                insert_error(
                    e,
                    || format!("asset {}", asset.id),
                    || format!("project {}", asset.project),
                )
            })?;
        Ok(())
    }

    async fn get_asset(&self, id: &AssetId) -> Result<Option<Asset>, StoreError> {
        let table = self.config.assets_table();
        let query = format!("SELECT * FROM {table} WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(asset_from_row).transpose()
    }

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, StoreError> {
        let table = self.config.assets_table();
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT * FROM {table} WHERE TRUE"));
        if !filter.include_deleted {
            qb.push(" AND NOT is_deleted");
        }
        if filter.fingerprinted_only {
            qb.push(" AND fingerprint IS NOT NULL");
        }
        if let Some(ref project) = filter.project {
            qb.push(" AND project_id = ").push_bind(project.as_str().to_owned());
        }
        if let Some(ref fp) = filter.fingerprint {
            qb.push(" AND fingerprint = ").push_bind(fp.as_str().to_owned());
        }
        qb.push(" ORDER BY created_at DESC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(backend)?;
        rows.iter().map(asset_from_row).collect()
    }

    async fn update_status(
        &self,
        id: &AssetId,
        status: WorkflowStatus,
    ) -> Result<bool, StoreError> {
        let table = self.config.assets_table();
        let query = format!("UPDATE {table} SET status = $2 WHERE id = $1");
        let result = sqlx::query(&query)
            .bind(id.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_asset(&self, id: &AssetId) -> Result<bool, StoreError> {
        let table = self.config.assets_table();
        let query = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&query)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, record: &RetentionRecord) -> Result<bool, StoreError> {
        let assets = self.config.assets_table();
        let retention = self.config.retention_table();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let lock_row = format!("SELECT id FROM {assets} WHERE id = $1 FOR UPDATE");
        let exists = sqlx::query(&lock_row)
            .bind(record.asset_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("asset {}", record.asset_id)));
        }

        let insert = format!(
            "INSERT INTO {retention} (asset_id, deleted_at, expiry) VALUES ($1, $2, $3) \
             ON CONFLICT (asset_id) DO NOTHING"
        );
        let inserted = sqlx::query(&insert)
            .bind(record.asset_id.as_str())
            .bind(record.deleted_at)
            .bind(record.expiry)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await.map_err(backend)?;
            return Ok(false);
        }

        let flag = format!("UPDATE {assets} SET is_deleted = TRUE, deleted_at = $2 WHERE id = $1");
        sqlx::query(&flag)
            .bind(record.asset_id.as_str())
            .bind(record.deleted_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn restore(&self, id: &AssetId) -> Result<bool, StoreError> {
        let assets = self.config.assets_table();
        let retention = self.config.retention_table();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let delete = format!("DELETE FROM {retention} WHERE asset_id = $1");
        let removed = sqlx::query(&delete)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if removed.rows_affected() == 0 {
            tx.rollback().await.map_err(backend)?;
            return Ok(false);
        }

        let clear =
            format!("UPDATE {assets} SET is_deleted = FALSE, deleted_at = NULL WHERE id = $1");
        sqlx::query(&clear)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn get_retention(&self, id: &AssetId) -> Result<Option<RetentionRecord>, StoreError> {
        let table = self.config.retention_table();
        let query = format!("SELECT asset_id, deleted_at, expiry FROM {table} WHERE asset_id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(retention_from_row).transpose()
    }

    async fn list_retention(&self) -> Result<Vec<RetentionRecord>, StoreError> {
        let table = self.config.retention_table();
        let query =
            format!("SELECT asset_id, deleted_at, expiry FROM {table} ORDER BY expiry ASC");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(retention_from_row).collect()
    }

    async fn list_expired_retention(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RetentionRecord>, StoreError> {
        let table = self.config.retention_table();
        let query = format!(
            "SELECT asset_id, deleted_at, expiry FROM {table} WHERE expiry <= $1 ORDER BY expiry ASC"
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(retention_from_row).collect()
    }

    async fn insert_version(&self, version: &Version) -> Result<bool, StoreError> {
        let table = self.config.versions_table();
        let query = format!(
            "INSERT INTO {table} \
             (id, asset_id, version_number, locator, fingerprint, created_by, note, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (asset_id, version_number) DO NOTHING"
        );
        let result = sqlx::query(&query)
            .bind(version.id.as_str())
            .bind(version.asset_id.as_str())
            .bind(Self::version_number(version.version_number)?)
            .bind(version.locator.as_str())
            .bind(version.fingerprint.as_deref())
            .bind(version.created_by.as_str())
            .bind(version.note.as_deref())
            .bind(version.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                insert_error(
                    e,
                    || format!("version {}", version.id),
                    || format!("asset {}", version.asset_id),
                )
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_versions(&self, asset: &AssetId) -> Result<Vec<Version>, StoreError> {
        let table = self.config.versions_table();
        let query =
            format!("SELECT * FROM {table} WHERE asset_id = $1 ORDER BY version_number DESC");
        let rows = sqlx::query(&query)
            .bind(asset.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(version_from_row).collect()
    }

    async fn latest_version_number(&self, asset: &AssetId) -> Result<Option<u32>, StoreError> {
        let table = self.config.versions_table();
        let query = format!("SELECT MAX(version_number) FROM {table} WHERE asset_id = $1");
        let max: Option<i32> = sqlx::query_scalar(&query)
            .bind(asset.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        max.map(|n| decode(u32::try_from(n))).transpose()
    }

    async fn insert_share_link(&self, link: &ShareLink) -> Result<bool, StoreError> {
        let table = self.config.share_links_table();
        let query = format!(
            "INSERT INTO {table} \
             (id, asset_id, token, created_by, permission, expires_at, access_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (token) DO NOTHING"
        );
        let result = sqlx::query(&query)
            .bind(link.id.as_str())
            .bind(link.asset_id.as_str())
            .bind(link.token.as_str())
            .bind(link.created_by.as_str())
            .bind(link.permission.as_str())
            .bind(link.expires_at)
            .bind(decode(i64::try_from(link.access_count))?)
            .bind(link.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                insert_error(
                    e,
                    || format!("share link {}", link.id),
                    || format!("asset {}", link.asset_id),
                )
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_share_link(&self, id: &ShareLinkId) -> Result<Option<ShareLink>, StoreError> {
        let table = self.config.share_links_table();
        let query = format!("SELECT * FROM {table} WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(share_link_from_row).transpose()
    }

    async fn find_share_link(&self, token: &ShareToken) -> Result<Option<ShareLink>, StoreError> {
        let table = self.config.share_links_table();
        let query = format!("SELECT * FROM {table} WHERE token = $1");
        let row = sqlx::query(&query)
            .bind(token.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(share_link_from_row).transpose()
    }

    async fn list_share_links(&self, asset: &AssetId) -> Result<Vec<ShareLink>, StoreError> {
        let table = self.config.share_links_table();
        let query = format!("SELECT * FROM {table} WHERE asset_id = $1 ORDER BY created_at DESC");
        let rows = sqlx::query(&query)
            .bind(asset.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(share_link_from_row).collect()
    }

    async fn delete_share_link(&self, id: &ShareLinkId) -> Result<bool, StoreError> {
        let table = self.config.share_links_table();
        let query = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&query)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_share_access(&self, id: &ShareLinkId) -> Result<Option<u64>, StoreError> {
        let table = self.config.share_links_table();
        let query = format!(
            "UPDATE {table} SET access_count = access_count + 1 WHERE id = $1 RETURNING access_count"
        );
        let count: Option<i64> = sqlx::query_scalar(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        count.map(|n| decode(u64::try_from(n))).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_ssl_mode() {
        let config = PostgresConfig {
            ssl_mode: Some("sometimes".into()),
            ..PostgresConfig::default()
        };
        let err = build_connect_options(&config).unwrap_err();
        assert!(matches!(err, StoreError::Connection(msg) if msg.contains("sometimes")));
    }

    #[test]
    fn accepts_known_ssl_modes() {
        for mode in ["disable", "prefer", "require", "verify-ca", "verify-full"] {
            let config = PostgresConfig {
                ssl_mode: Some(mode.into()),
                ..PostgresConfig::default()
            };
            assert!(build_connect_options(&config).is_ok(), "mode {mode}");
        }
    }

    #[test]
    fn rejects_malformed_url() {
        let config = PostgresConfig {
            url: "not a url".into(),
            ..PostgresConfig::default()
        };
        assert!(matches!(
            build_connect_options(&config),
            Err(StoreError::Connection(_))
        ));
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    fn test_config() -> PostgresConfig {
        PostgresConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/mediakeep_test".to_string()),
            table_prefix: format!("test_{}_", uuid::Uuid::new_v4().simple()),
            ..PostgresConfig::default()
        }
    }

    #[tokio::test]
    async fn repository_conformance() {
        let repo = PostgresRepository::new(test_config())
            .await
            .expect("pool creation should succeed");
        mediakeep_store::testing::run_repository_conformance_tests(&repo)
            .await
            .expect("repository conformance tests should pass");
    }
}
