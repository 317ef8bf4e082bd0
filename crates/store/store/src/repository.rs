use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mediakeep_core::{
    Asset, AssetId, Client, ClientId, Fingerprint, Project, ProjectId, RetentionRecord, ShareLink,
    ShareLinkId, ShareToken, Version, WorkflowStatus,
};

use crate::error::StoreError;

/// Filter for [`MediaRepository::list_assets`].
///
/// The default filter matches every active asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFilter {
    /// Only assets in this project.
    pub project: Option<ProjectId>,
    /// Only assets with exactly this fingerprint.
    pub fingerprint: Option<Fingerprint>,
    /// Only assets that have a fingerprint at all.
    #[serde(default)]
    pub fingerprinted_only: bool,
    /// Include soft-deleted assets.
    #[serde(default)]
    pub include_deleted: bool,
}

impl AssetFilter {
    #[must_use]
    pub fn active() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_project(mut self, project: ProjectId) -> Self {
        self.project = Some(project);
        self
    }

    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    #[must_use]
    pub fn fingerprinted(mut self) -> Self {
        self.fingerprinted_only = true;
        self
    }

    #[must_use]
    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Evaluate the filter against an asset. Used by in-process backends.
    #[must_use]
    pub fn matches(&self, asset: &Asset) -> bool {
        if asset.is_deleted && !self.include_deleted {
            return false;
        }
        if self.fingerprinted_only && asset.fingerprint.is_none() {
            return false;
        }
        if let Some(ref project) = self.project {
            if &asset.project != project {
                return false;
            }
        }
        if let Some(ref fp) = self.fingerprint {
            if asset.fingerprint.as_ref() != Some(fp) {
                return false;
            }
        }
        true
    }
}

/// Persistence for clients, projects, assets and everything assets own.
///
/// Implementations must be `Send + Sync` and safe for concurrent use from
/// several processes. The methods documented as atomic are the points where
/// the engine relies on the backend rather than on in-process locking:
/// retention record creation, version numbering and share token uniqueness.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Insert a client. Fails with [`StoreError::Conflict`] if the id is taken.
    async fn insert_client(&self, client: &Client) -> Result<(), StoreError>;

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StoreError>;

    /// Insert a project. Fails with [`StoreError::NotFound`] if its client
    /// does not exist.
    async fn insert_project(&self, project: &Project) -> Result<(), StoreError>;

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError>;

    /// Insert an asset. Fails with [`StoreError::NotFound`] if its project
    /// does not exist, or [`StoreError::Conflict`] if the id is taken.
    async fn insert_asset(&self, asset: &Asset) -> Result<(), StoreError>;

    async fn get_asset(&self, id: &AssetId) -> Result<Option<Asset>, StoreError>;

    /// List assets matching `filter`, newest first.
    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, StoreError>;

    /// Change an asset's workflow status. Returns `false` if the asset is gone.
    async fn update_status(
        &self,
        id: &AssetId,
        status: WorkflowStatus,
    ) -> Result<bool, StoreError>;

    /// Delete an asset together with its retention record, versions and share
    /// links. Returns `false` if the asset did not exist.
    async fn delete_asset(&self, id: &AssetId) -> Result<bool, StoreError>;

    /// Atomically flag the asset deleted and insert its retention record, but
    /// only if no record exists for the asset yet.
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// asset was already soft-deleted (nothing is changed in that case).
    /// Fails with [`StoreError::NotFound`] if the asset does not exist.
    async fn soft_delete(&self, record: &RetentionRecord) -> Result<bool, StoreError>;

    /// Atomically clear the deletion flag and remove the retention record.
    ///
    /// Returns `false` if the asset had no retention record.
    async fn restore(&self, id: &AssetId) -> Result<bool, StoreError>;

    async fn get_retention(&self, id: &AssetId) -> Result<Option<RetentionRecord>, StoreError>;

    /// All retention records, soonest expiry first.
    async fn list_retention(&self) -> Result<Vec<RetentionRecord>, StoreError>;

    /// Retention records with `expiry <= now`, soonest expiry first.
    async fn list_expired_retention(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RetentionRecord>, StoreError>;

    /// Insert a version unless `(asset_id, version_number)` is already taken.
    ///
    /// Returns `false` on a number collision so the caller can retry with the
    /// next number. Fails with [`StoreError::NotFound`] if the asset is gone.
    async fn insert_version(&self, version: &Version) -> Result<bool, StoreError>;

    /// Versions of an asset, highest number first.
    async fn list_versions(&self, asset: &AssetId) -> Result<Vec<Version>, StoreError>;

    /// Highest version number recorded for the asset, if any.
    async fn latest_version_number(&self, asset: &AssetId) -> Result<Option<u32>, StoreError>;

    /// Insert a share link unless its token is already in use.
    ///
    /// Returns `false` on a token collision; an existing link is never
    /// overwritten. Fails with [`StoreError::NotFound`] if the asset is gone.
    async fn insert_share_link(&self, link: &ShareLink) -> Result<bool, StoreError>;

    async fn get_share_link(&self, id: &ShareLinkId) -> Result<Option<ShareLink>, StoreError>;

    /// Look a link up by exact token match.
    async fn find_share_link(&self, token: &ShareToken) -> Result<Option<ShareLink>, StoreError>;

    /// Links for an asset, newest first.
    async fn list_share_links(&self, asset: &AssetId) -> Result<Vec<ShareLink>, StoreError>;

    /// Delete (revoke) a link. Returns `false` if it did not exist.
    async fn delete_share_link(&self, id: &ShareLinkId) -> Result<bool, StoreError>;

    /// Atomically add one to a link's access count and return the new value.
    ///
    /// Returns `None` if the link no longer exists.
    async fn record_share_access(&self, id: &ShareLinkId) -> Result<Option<u64>, StoreError>;
}
