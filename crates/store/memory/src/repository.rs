use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use mediakeep_core::{
    Asset, AssetId, Client, ClientId, Project, ProjectId, RetentionRecord, ShareLink, ShareLinkId,
    ShareToken, Version, WorkflowStatus,
};
use mediakeep_store::error::StoreError;
use mediakeep_store::repository::{AssetFilter, MediaRepository};

/// In-memory [`MediaRepository`] backed by one [`DashMap`] per table.
///
/// Every write that touches an asset's dependents first takes the asset's
/// map entry, so the asset row acts as the per-asset write barrier: a
/// concurrent `delete_asset` can never leave orphaned versions, links or
/// retention records behind.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    clients: DashMap<ClientId, Client>,
    projects: DashMap<ProjectId, Project>,
    assets: DashMap<AssetId, Asset>,
    retention: DashMap<AssetId, RetentionRecord>,
    versions: DashMap<AssetId, BTreeMap<u32, Version>>,
    links: DashMap<ShareLinkId, ShareLink>,
    tokens: DashMap<ShareToken, ShareLinkId>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing_asset(id: &AssetId) -> StoreError {
        StoreError::NotFound(format!("asset {id}"))
    }
}

#[async_trait]
impl MediaRepository for MemoryRepository {
    async fn insert_client(&self, client: &Client) -> Result<(), StoreError> {
        match self.clients.entry(client.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!("client {}", client.id))),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(())
            }
        }
    }

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.get(id).map(|c| c.clone()))
    }

    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        if !self.clients.contains_key(&project.client) {
            return Err(StoreError::NotFound(format!("client {}", project.client)));
        }
        match self.projects.entry(project.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!("project {}", project.id))),
            Entry::Vacant(slot) => {
                slot.insert(project.clone());
                Ok(())
            }
        }
    }

    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.get(id).map(|p| p.clone()))
    }

    async fn insert_asset(&self, asset: &Asset) -> Result<(), StoreError> {
        if !self.projects.contains_key(&asset.project) {
            return Err(StoreError::NotFound(format!("project {}", asset.project)));
        }
        match self.assets.entry(asset.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!("asset {}", asset.id))),
            Entry::Vacant(slot) => {
                slot.insert(asset.clone());
                Ok(())
            }
        }
    }

    async fn get_asset(&self, id: &AssetId) -> Result<Option<Asset>, StoreError> {
        Ok(self.assets.get(id).map(|a| a.clone()))
    }

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, StoreError> {
        let mut out: Vec<Asset> = self
            .assets
            .iter()
            .filter(|a| filter.matches(a.value()))
            .map(|a| a.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn update_status(
        &self,
        id: &AssetId,
        status: WorkflowStatus,
    ) -> Result<bool, StoreError> {
        Ok(self
            .assets
            .get_mut(id)
            .map(|mut a| a.status = status)
            .is_some())
    }

    async fn delete_asset(&self, id: &AssetId) -> Result<bool, StoreError> {
        // Removing the asset first blocks any writer still holding its entry.
        if self.assets.remove(id).is_none() {
            return Ok(false);
        }
        self.retention.remove(id);
        self.versions.remove(id);

        let mut revoked = Vec::new();
        self.links.retain(|_, link| {
            if &link.asset_id == id {
                revoked.push((link.token.clone(), link.id.clone()));
                false
            } else {
                true
            }
        });
        for (token, link_id) in revoked {
            self.tokens.remove_if(&token, |_, owner| owner == &link_id);
        }
        Ok(true)
    }

    async fn soft_delete(&self, record: &RetentionRecord) -> Result<bool, StoreError> {
        let mut asset = self
            .assets
            .get_mut(&record.asset_id)
            .ok_or_else(|| Self::missing_asset(&record.asset_id))?;

        match self.retention.entry(record.asset_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                asset.is_deleted = true;
                asset.deleted_at = Some(record.deleted_at);
                Ok(true)
            }
        }
    }

    async fn restore(&self, id: &AssetId) -> Result<bool, StoreError> {
        let Some(mut asset) = self.assets.get_mut(id) else {
            return Ok(false);
        };
        if self.retention.remove(id).is_none() {
            return Ok(false);
        }
        asset.is_deleted = false;
        asset.deleted_at = None;
        Ok(true)
    }

    async fn get_retention(&self, id: &AssetId) -> Result<Option<RetentionRecord>, StoreError> {
        Ok(self.retention.get(id).map(|r| r.clone()))
    }

    async fn list_retention(&self) -> Result<Vec<RetentionRecord>, StoreError> {
        let mut out: Vec<RetentionRecord> =
            self.retention.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| a.expiry.cmp(&b.expiry));
        Ok(out)
    }

    async fn list_expired_retention(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RetentionRecord>, StoreError> {
        let mut out: Vec<RetentionRecord> = self
            .retention
            .iter()
            .filter(|r| r.is_expired(now))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| a.expiry.cmp(&b.expiry));
        Ok(out)
    }

    async fn insert_version(&self, version: &Version) -> Result<bool, StoreError> {
        let _asset = self
            .assets
            .get(&version.asset_id)
            .ok_or_else(|| Self::missing_asset(&version.asset_id))?;

        let mut chain = self.versions.entry(version.asset_id.clone()).or_default();
        if chain.contains_key(&version.version_number) {
            return Ok(false);
        }
        chain.insert(version.version_number, version.clone());
        Ok(true)
    }

    async fn list_versions(&self, asset: &AssetId) -> Result<Vec<Version>, StoreError> {
        Ok(self
            .versions
            .get(asset)
            .map(|chain| chain.values().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn latest_version_number(&self, asset: &AssetId) -> Result<Option<u32>, StoreError> {
        Ok(self
            .versions
            .get(asset)
            .and_then(|chain| chain.keys().next_back().copied()))
    }

    async fn insert_share_link(&self, link: &ShareLink) -> Result<bool, StoreError> {
        let _asset = self
            .assets
            .get(&link.asset_id)
            .ok_or_else(|| Self::missing_asset(&link.asset_id))?;

        match self.tokens.entry(link.token.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(link.id.clone());
                self.links.insert(link.id.clone(), link.clone());
                Ok(true)
            }
        }
    }

    async fn get_share_link(&self, id: &ShareLinkId) -> Result<Option<ShareLink>, StoreError> {
        Ok(self.links.get(id).map(|l| l.clone()))
    }

    async fn find_share_link(&self, token: &ShareToken) -> Result<Option<ShareLink>, StoreError> {
        let Some(id) = self.tokens.get(token).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.links.get(&id).map(|l| l.clone()))
    }

    async fn list_share_links(&self, asset: &AssetId) -> Result<Vec<ShareLink>, StoreError> {
        let mut out: Vec<ShareLink> = self
            .links
            .iter()
            .filter(|l| &l.asset_id == asset)
            .map(|l| l.value().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete_share_link(&self, id: &ShareLinkId) -> Result<bool, StoreError> {
        let Some((_, link)) = self.links.remove(id) else {
            return Ok(false);
        };
        self.tokens.remove_if(&link.token, |_, owner| owner == id);
        Ok(true)
    }

    async fn record_share_access(&self, id: &ShareLinkId) -> Result<Option<u64>, StoreError> {
        Ok(self.links.get_mut(id).map(|mut link| {
            link.access_count = link.access_count.saturating_add(1);
            link.access_count
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mediakeep_core::{BlobLocator, MediaKind, RetentionDays, UserId, VersionId};
    use mediakeep_store::testing::run_repository_conformance_tests;

    use super::*;

    #[tokio::test]
    async fn conformance() {
        let repo = MemoryRepository::new();
        run_repository_conformance_tests(&repo)
            .await
            .expect("repository conformance tests should pass");
    }

    async fn seeded() -> (Arc<MemoryRepository>, Asset) {
        let repo = Arc::new(MemoryRepository::new());
        let now = Utc::now();
        repo.insert_client(&Client {
            id: ClientId::new("c1"),
            owner: UserId::new("owner"),
            name: "Acme".into(),
            created_at: now,
        })
        .await
        .unwrap();
        repo.insert_project(&Project {
            id: ProjectId::new("p1"),
            client: ClientId::new("c1"),
            name: "Launch".into(),
            created_at: now,
        })
        .await
        .unwrap();
        let asset = Asset::new(
            ProjectId::new("p1"),
            BlobLocator::new("uploads/a"),
            MediaKind::Image,
            now,
        );
        repo.insert_asset(&asset).await.unwrap();
        (repo, asset)
    }

    #[tokio::test]
    async fn concurrent_soft_deletes_insert_one_record() {
        let (repo, asset) = seeded().await;
        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = Arc::clone(&repo);
            let id = asset.id.clone();
            handles.push(tokio::spawn(async move {
                let record = RetentionRecord::open(
                    id,
                    Utc::now() + chrono::Duration::seconds(i),
                    RetentionDays::new(7),
                );
                repo.soft_delete(&record).await.unwrap()
            }));
        }
        let mut applied = 0;
        for h in handles {
            if h.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(repo.list_retention().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_version_inserts_never_share_a_number() {
        let (repo, asset) = seeded().await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = Arc::clone(&repo);
            let asset_id = asset.id.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = repo
                        .latest_version_number(&asset_id)
                        .await
                        .unwrap()
                        .map_or(1, |n| n + 1);
                    let version = Version {
                        id: VersionId::generate(),
                        asset_id: asset_id.clone(),
                        version_number: next,
                        locator: BlobLocator::new(format!("v/{next}")),
                        fingerprint: None,
                        created_by: UserId::new("u"),
                        note: None,
                        created_at: Utc::now(),
                    };
                    if repo.insert_version(&version).await.unwrap() {
                        return next;
                    }
                }
            }));
        }
        let mut numbers = Vec::new();
        for h in handles {
            numbers.push(h.await.unwrap());
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=8).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn delete_asset_frees_tokens() {
        let (repo, asset) = seeded().await;
        let link = ShareLink::issue(
            asset.id.clone(),
            UserId::new("u"),
            mediakeep_core::Permission::View,
            1,
            Utc::now(),
        )
        .unwrap();
        repo.insert_share_link(&link).await.unwrap();
        repo.delete_asset(&asset.id).await.unwrap();
        assert!(repo.tokens.is_empty());
        assert!(repo.links.is_empty());
    }
}
