//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use mediakeep_blob::{BlobError, BlobStore, MemoryBlobStore, PutHint};
use mediakeep_core::{
    Asset, AssetId, BlobLocator, Client, ClientId, ManualClock, MediaKind, Project, ProjectId,
    RetentionRecord, ShareLink, ShareLinkId, ShareToken, UserId, Version, WorkflowStatus,
};
use mediakeep_engine::{AssetUpload, EngineBuilder, EngineConfig, MediaEngine};
use mediakeep_store::{AssetFilter, MediaRepository, StoreError};
use mediakeep_store_memory::{MemoryAssetLock, MemoryRepository};

/// Memory blob store whose deletes fail for selected locators.
#[derive(Default)]
pub struct FailingBlobStore {
    inner: MemoryBlobStore,
    fail_deletes: Mutex<HashSet<BlobLocator>>,
}

impl FailingBlobStore {
    pub fn fail_delete_of(&self, locator: &BlobLocator) {
        self.fail_deletes.lock().insert(locator.clone());
    }
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, data: Bytes, hint: &PutHint) -> Result<BlobLocator, BlobError> {
        self.inner.put(data, hint).await
    }

    async fn get(&self, locator: &BlobLocator) -> Result<Option<Bytes>, BlobError> {
        self.inner.get(locator).await
    }

    async fn exists(&self, locator: &BlobLocator) -> Result<bool, BlobError> {
        self.inner.exists(locator).await
    }

    async fn delete(&self, locator: &BlobLocator) -> Result<bool, BlobError> {
        if self.fail_deletes.lock().contains(locator) {
            return Err(BlobError::Storage(format!("permission denied: {locator}")));
        }
        self.inner.delete(locator).await
    }

    fn url(&self, locator: &BlobLocator) -> Result<String, BlobError> {
        self.inner.url(locator)
    }
}

/// Memory repository whose `delete_asset` fails for selected assets.
#[derive(Default)]
pub struct FlakyRepository {
    inner: MemoryRepository,
    fail_deletes: Mutex<HashSet<AssetId>>,
}

impl FlakyRepository {
    pub fn fail_delete_of(&self, asset: &AssetId) {
        self.fail_deletes.lock().insert(asset.clone());
    }
}

#[async_trait]
impl MediaRepository for FlakyRepository {
    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        self.inner.insert_client(client).await
    }

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StoreError> {
        self.inner.get_client(id).await
    }

    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.inner.insert_project(project).await
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        self.inner.get_project(id).await
    }

    async fn insert_asset(&self, asset: &Asset) -> Result<(), StoreError> {
        self.inner.insert_asset(asset).await
    }

    async fn get_asset(&self, id: &AssetId) -> Result<Option<Asset>, StoreError> {
        self.inner.get_asset(id).await
    }

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, StoreError> {
        self.inner.list_assets(filter).await
    }

    async fn update_status(
        &self,
        id: &AssetId,
        status: WorkflowStatus,
    ) -> Result<bool, StoreError> {
        self.inner.update_status(id, status).await
    }

    async fn delete_asset(&self, id: &AssetId) -> Result<bool, StoreError> {
        if self.fail_deletes.lock().contains(id) {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.inner.delete_asset(id).await
    }

    async fn soft_delete(&self, record: &RetentionRecord) -> Result<bool, StoreError> {
        self.inner.soft_delete(record).await
    }

    async fn restore(&self, id: &AssetId) -> Result<bool, StoreError> {
        self.inner.restore(id).await
    }

    async fn get_retention(&self, id: &AssetId) -> Result<Option<RetentionRecord>, StoreError> {
        self.inner.get_retention(id).await
    }

    async fn list_retention(&self) -> Result<Vec<RetentionRecord>, StoreError> {
        self.inner.list_retention().await
    }

    async fn list_expired_retention(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RetentionRecord>, StoreError> {
        self.inner.list_expired_retention(now).await
    }

    async fn insert_version(&self, version: &Version) -> Result<bool, StoreError> {
        self.inner.insert_version(version).await
    }

    async fn list_versions(&self, asset: &AssetId) -> Result<Vec<Version>, StoreError> {
        self.inner.list_versions(asset).await
    }

    async fn latest_version_number(&self, asset: &AssetId) -> Result<Option<u32>, StoreError> {
        self.inner.latest_version_number(asset).await
    }

    async fn insert_share_link(&self, link: &ShareLink) -> Result<bool, StoreError> {
        self.inner.insert_share_link(link).await
    }

    async fn get_share_link(&self, id: &ShareLinkId) -> Result<Option<ShareLink>, StoreError> {
        self.inner.get_share_link(id).await
    }

    async fn find_share_link(&self, token: &ShareToken) -> Result<Option<ShareLink>, StoreError> {
        self.inner.find_share_link(token).await
    }

    async fn list_share_links(&self, asset: &AssetId) -> Result<Vec<ShareLink>, StoreError> {
        self.inner.list_share_links(asset).await
    }

    async fn delete_share_link(&self, id: &ShareLinkId) -> Result<bool, StoreError> {
        self.inner.delete_share_link(id).await
    }

    async fn record_share_access(&self, id: &ShareLinkId) -> Result<Option<u64>, StoreError> {
        self.inner.record_share_access(id).await
    }
}

/// An engine over test doubles with one client and project already created.
pub struct Harness {
    pub engine: MediaEngine,
    pub repo: Arc<FlakyRepository>,
    pub blobs: Arc<FailingBlobStore>,
    pub clock: Arc<ManualClock>,
    pub project: Project,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let repo = Arc::new(FlakyRepository::default());
        let blobs = Arc::new(FailingBlobStore::default());
        let clock = Arc::new(ManualClock::default());
        let engine = EngineBuilder::new()
            .repository(repo.clone())
            .blob_store(blobs.clone())
            .lock(Arc::new(MemoryAssetLock::new()))
            .clock(clock.clone())
            .config(config)
            .build()
            .expect("engine should build");

        let client = engine
            .catalog()
            .create_client(&UserId::new("owner"), "Northwind")
            .await
            .expect("client");
        let project = engine
            .catalog()
            .create_project(&client.id, "Spring campaign")
            .await
            .expect("project");

        Self {
            engine,
            repo,
            blobs,
            clock,
            project,
        }
    }

    /// Register an image with the given content.
    pub async fn upload(&self, content: &[u8]) -> Asset {
        self.engine
            .catalog()
            .register_asset(
                AssetUpload::new(
                    self.project.id.clone(),
                    Bytes::copy_from_slice(content),
                    MediaKind::Image,
                )
                .with_uploader(UserId::new("uploader")),
            )
            .await
            .expect("asset registration")
    }
}
