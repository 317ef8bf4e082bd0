//! Content-addressed duplicate lookups.
//!
//! Matching is exact: two assets are duplicates when their fingerprints are
//! byte-for-byte equal. Soft-deleted assets never participate.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use mediakeep_core::{Asset, AssetId, Fingerprint};
use mediakeep_store::{AssetFilter, MediaRepository};

use crate::error::EngineError;

/// Active assets sharing one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub fingerprint: Fingerprint,
    /// Oldest first, so the first entry is the original upload.
    pub assets: Vec<Asset>,
}

impl DuplicateGroup {
    /// Copies beyond the first.
    #[must_use]
    pub fn redundant(&self) -> usize {
        self.assets.len().saturating_sub(1)
    }
}

/// Result of a whole-library duplicate scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateReport {
    /// Groups of two or more, ordered by fingerprint.
    pub groups: Vec<DuplicateGroup>,
    /// Sum over groups of `size - 1`.
    pub redundant_count: usize,
}

impl DuplicateReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Read-only index over asset fingerprints.
pub struct DuplicateIndex {
    repo: Arc<dyn MediaRepository>,
}

impl DuplicateIndex {
    pub fn new(repo: Arc<dyn MediaRepository>) -> Self {
        Self { repo }
    }

    /// Active assets with the given fingerprint, minus `exclude`.
    ///
    /// An absent fingerprint has no duplicates.
    pub async fn find_duplicates(
        &self,
        fingerprint: Option<&Fingerprint>,
        exclude: Option<&AssetId>,
    ) -> Result<Vec<Asset>, EngineError> {
        let Some(fingerprint) = fingerprint else {
            return Ok(Vec::new());
        };
        let filter = AssetFilter::active().with_fingerprint(fingerprint.clone());
        let mut assets = self.repo.list_assets(&filter).await?;
        if let Some(exclude) = exclude {
            assets.retain(|a| &a.id != exclude);
        }
        Ok(assets)
    }

    /// Duplicates of an active asset.
    ///
    /// Unknown and soft-deleted assets are reported as [`EngineError::NotFound`].
    #[instrument(skip(self), fields(asset = %asset_id))]
    pub async fn duplicates_of(&self, asset_id: &AssetId) -> Result<Vec<Asset>, EngineError> {
        let asset = self
            .repo
            .get_asset(asset_id)
            .await?
            .filter(Asset::is_active)
            .ok_or_else(|| EngineError::NotFound(format!("asset {asset_id}")))?;
        self.find_duplicates(asset.fingerprint.as_ref(), Some(&asset.id))
            .await
    }

    /// Group every active fingerprinted asset by fingerprint.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<DuplicateReport, EngineError> {
        let assets = self
            .repo
            .list_assets(&AssetFilter::active().fingerprinted())
            .await?;

        let mut by_fingerprint: BTreeMap<Fingerprint, Vec<Asset>> = BTreeMap::new();
        for asset in assets {
            if let Some(fp) = asset.fingerprint.clone() {
                by_fingerprint.entry(fp).or_default().push(asset);
            }
        }

        let groups: Vec<DuplicateGroup> = by_fingerprint
            .into_iter()
            .filter(|(_, assets)| assets.len() >= 2)
            .map(|(fingerprint, mut assets)| {
                assets.sort_by(|a, b| {
                    a.created_at
                        .cmp(&b.created_at)
                        .then_with(|| a.id.cmp(&b.id))
                });
                DuplicateGroup {
                    fingerprint,
                    assets,
                }
            })
            .collect();
        let redundant_count = groups.iter().map(DuplicateGroup::redundant).sum();

        debug!(groups = groups.len(), redundant_count, "duplicate scan complete");
        Ok(DuplicateReport {
            groups,
            redundant_count,
        })
    }
}
