use std::sync::Arc;

use tracing::info;

use mediakeep_blob::{BlobStore, FsBlobStore, MemoryBlobStore};
use mediakeep_engine::{EngineBuilder, MediaEngine};
use mediakeep_store::{AssetLock, MediaRepository};
use mediakeep_store_memory::{MemoryAssetLock, MemoryRepository};
#[cfg(feature = "postgres")]
use mediakeep_store_postgres::{PostgresAssetLock, PostgresConfig, PostgresRepository};

use crate::config::{BlobConfig, StoreConfig, WorkerConfig};
use crate::error::WorkerError;

/// A repository and the asset lock that goes with it.
pub type RepositoryPair = (Arc<dyn MediaRepository>, Arc<dyn AssetLock>);

/// Construct the repository and lock named by `[store]`.
pub async fn create_repository(config: &StoreConfig) -> Result<RepositoryPair, WorkerError> {
    match config.backend.as_str() {
        "memory" => Ok(create_memory()),
        #[cfg(feature = "postgres")]
        "postgres" => create_postgres(config).await,
        other => Err(WorkerError::Config(format!(
            "unsupported store backend: {other} (is the feature enabled?)"
        ))),
    }
}

fn create_memory() -> RepositoryPair {
    let repo = Arc::new(MemoryRepository::new());
    let lock = Arc::new(MemoryAssetLock::new());
    (repo, lock)
}

#[cfg(feature = "postgres")]
async fn create_postgres(config: &StoreConfig) -> Result<RepositoryPair, WorkerError> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| WorkerError::Config("postgres backend requires 'url' in [store]".into()))?;
    let defaults = PostgresConfig::default();
    let pg_config = PostgresConfig {
        url: url.to_owned(),
        table_prefix: config.prefix.clone().unwrap_or(defaults.table_prefix),
        schema: config.schema.clone().unwrap_or(defaults.schema),
        ..PostgresConfig::default()
    };
    let repo = PostgresRepository::new(pg_config.clone())
        .await
        .map_err(|e| WorkerError::Config(format!("postgres repository: {e}")))?;
    let lock = PostgresAssetLock::from_pool(repo.pool().clone(), pg_config)
        .await
        .map_err(|e| WorkerError::Config(format!("postgres lock: {e}")))?;
    Ok((Arc::new(repo), Arc::new(lock)))
}

/// Construct the blob store named by `[blob]`.
pub async fn create_blob_store(config: &BlobConfig) -> Result<Arc<dyn BlobStore>, WorkerError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryBlobStore::new(config.base_url.clone()))),
        "fs" => {
            tokio::fs::create_dir_all(&config.root).await?;
            info!(root = %config.root.display(), "using filesystem blob store");
            Ok(Arc::new(FsBlobStore::new(
                config.root.clone(),
                config.base_url.clone(),
            )))
        }
        other => Err(WorkerError::Config(format!(
            "unsupported blob backend: {other}"
        ))),
    }
}

/// Wire a [`MediaEngine`] from the whole configuration.
pub async fn build_engine(config: &WorkerConfig) -> Result<MediaEngine, WorkerError> {
    let (repo, lock) = create_repository(&config.store).await?;
    let blobs = create_blob_store(&config.blob).await?;
    let engine = EngineBuilder::new()
        .repository(repo)
        .blob_store(blobs)
        .lock(lock)
        .config(config.engine_config()?)
        .build()?;
    info!(
        store = %config.store.backend,
        blob = %config.blob.backend,
        "engine ready"
    );
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_in_memory_engine() {
        let engine = build_engine(&WorkerConfig::default()).await.unwrap();
        assert_eq!(engine.config().default_retention.days(), 7);
    }

    #[tokio::test]
    async fn unknown_backends_are_config_errors() {
        let store = StoreConfig {
            backend: "cassandra".into(),
            ..StoreConfig::default()
        };
        assert!(matches!(
            create_repository(&store).await,
            Err(WorkerError::Config(_))
        ));

        let blob = BlobConfig {
            backend: "s3".into(),
            ..BlobConfig::default()
        };
        assert!(matches!(
            create_blob_store(&blob).await,
            Err(WorkerError::Config(_))
        ));
    }

    #[cfg(feature = "postgres")]
    #[tokio::test]
    async fn postgres_requires_url() {
        let store = StoreConfig {
            backend: "postgres".into(),
            ..StoreConfig::default()
        };
        assert!(matches!(
            create_repository(&store).await,
            Err(WorkerError::Config(ref m)) if m.contains("url")
        ));
    }

    #[tokio::test]
    async fn fs_backend_creates_its_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("media");
        let blob = BlobConfig {
            backend: "fs".into(),
            root: root.clone(),
            base_url: "/media".into(),
        };
        create_blob_store(&blob).await.unwrap();
        assert!(root.is_dir());
    }
}
