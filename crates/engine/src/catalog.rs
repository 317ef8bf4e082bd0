//! Client, project and asset registration.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, instrument, warn};

use mediakeep_blob::{BlobStore, PutHint};
use mediakeep_core::{
    Asset, AssetId, Client, ClientId, Clock, MediaKind, Project, ProjectId, RetentionRecord,
    UserId, WorkflowStatus, fingerprint_reader,
};
use mediakeep_store::{AssetFilter, MediaRepository};

use crate::error::EngineError;
use crate::metrics::EngineMetrics;

/// Bytes and metadata for a new asset.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub project: ProjectId,
    pub uploaded_by: Option<UserId>,
    pub data: Bytes,
    pub kind: MediaKind,
    pub status: WorkflowStatus,
    /// Original file name. Only its extension is kept, on the blob locator.
    pub filename: Option<String>,
}

impl AssetUpload {
    pub fn new(project: ProjectId, data: impl Into<Bytes>, kind: MediaKind) -> Self {
        Self {
            project,
            uploaded_by: None,
            data: data.into(),
            kind,
            status: WorkflowStatus::default(),
            filename: None,
        }
    }

    #[must_use]
    pub fn with_uploader(mut self, user: UserId) -> Self {
        self.uploaded_by = Some(user);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// A recycle bin entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecycledAsset {
    pub asset: Asset,
    pub retention: RetentionRecord,
}

/// Registers and looks up assets. Listings hide soft-deleted assets.
pub struct AssetCatalog {
    repo: Arc<dyn MediaRepository>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
    chunk_size: usize,
}

impl AssetCatalog {
    pub(crate) fn new(
        repo: Arc<dyn MediaRepository>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
        chunk_size: usize,
    ) -> Self {
        Self {
            repo,
            blobs,
            clock,
            metrics,
            chunk_size,
        }
    }

    pub async fn create_client(&self, owner: &UserId, name: &str) -> Result<Client, EngineError> {
        let name = non_empty("client name", name)?;
        let client = Client {
            id: ClientId::generate(),
            owner: owner.clone(),
            name,
            created_at: self.clock.now(),
        };
        self.repo.insert_client(&client).await?;
        info!(client = %client.id, "client created");
        Ok(client)
    }

    pub async fn create_project(
        &self,
        client: &ClientId,
        name: &str,
    ) -> Result<Project, EngineError> {
        let name = non_empty("project name", name)?;
        if self.repo.get_client(client).await?.is_none() {
            return Err(EngineError::NotFound(format!("client {client}")));
        }
        let project = Project {
            id: ProjectId::generate(),
            client: client.clone(),
            name,
            created_at: self.clock.now(),
        };
        self.repo.insert_project(&project).await?;
        info!(project = %project.id, client = %client, "project created");
        Ok(project)
    }

    /// Store the bytes, fingerprint them and record the asset.
    ///
    /// If the asset row cannot be written the freshly stored blob is removed
    /// again, best effort.
    #[instrument(skip(self, upload), fields(project = %upload.project, size = upload.data.len()))]
    pub async fn register_asset(&self, upload: AssetUpload) -> Result<Asset, EngineError> {
        if upload.data.is_empty() {
            return Err(EngineError::Validation("asset content is empty".into()));
        }
        if self.repo.get_project(&upload.project).await?.is_none() {
            return Err(EngineError::NotFound(format!("project {}", upload.project)));
        }

        let fingerprint = fingerprint_reader(upload.data.as_ref(), self.chunk_size)?;
        let now = self.clock.now();
        let mut hint = PutHint::upload(now);
        if let Some(filename) = upload.filename {
            hint = hint.with_filename(filename);
        }
        let locator = self.blobs.put(upload.data, &hint).await?;

        let mut asset = Asset::new(upload.project, locator, upload.kind, now)
            .with_status(upload.status)
            .with_fingerprint(fingerprint);
        asset.uploaded_by = upload.uploaded_by;

        if let Err(e) = self.repo.insert_asset(&asset).await {
            if let Err(cleanup) = self.blobs.delete(&asset.locator).await {
                warn!(
                    locator = %asset.locator,
                    error = %cleanup,
                    "failed to remove blob of unregistered asset"
                );
            }
            return Err(e.into());
        }

        self.metrics.increment_assets_registered();
        info!(asset = %asset.id, kind = %asset.kind, "asset registered");
        Ok(asset)
    }

    /// An active asset. Soft-deleted assets are reported as not found.
    pub async fn get_asset(&self, asset_id: &AssetId) -> Result<Asset, EngineError> {
        self.repo
            .get_asset(asset_id)
            .await?
            .filter(Asset::is_active)
            .ok_or_else(|| EngineError::NotFound(format!("asset {asset_id}")))
    }

    /// Active assets of a project, newest first.
    pub async fn list_assets(&self, project: &ProjectId) -> Result<Vec<Asset>, EngineError> {
        let filter = AssetFilter::active().in_project(project.clone());
        Ok(self.repo.list_assets(&filter).await?)
    }

    /// Change the workflow status of an active asset.
    #[instrument(skip(self), fields(asset = %asset_id))]
    pub async fn set_status(
        &self,
        asset_id: &AssetId,
        status: WorkflowStatus,
    ) -> Result<Asset, EngineError> {
        let mut asset = self.get_asset(asset_id).await?;
        if !self.repo.update_status(asset_id, status).await? {
            return Err(EngineError::NotFound(format!("asset {asset_id}")));
        }
        asset.status = status;
        info!(status = %status, "asset status changed");
        Ok(asset)
    }

    /// Soft-deleted assets with their retention records, soonest expiry first.
    pub async fn recycle_bin(
        &self,
        project: Option<&ProjectId>,
    ) -> Result<Vec<RecycledAsset>, EngineError> {
        let mut entries = Vec::new();
        for retention in self.repo.list_retention().await? {
            let Some(asset) = self.repo.get_asset(&retention.asset_id).await? else {
                continue;
            };
            if project.is_some_and(|p| &asset.project != p) {
                continue;
            }
            entries.push(RecycledAsset { asset, retention });
        }
        Ok(entries)
    }
}

fn non_empty(what: &str, value: &str) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_owned())
}
