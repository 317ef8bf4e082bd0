//! Capability links for sharing an asset outside the owning workspace.
//!
//! A link is a bearer token: whoever presents it gets the asset's URL until
//! the link expires or is revoked. Tokens come from the OS CSPRNG and are
//! never overwritten; a collision on insert is retried with a fresh token.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use mediakeep_blob::BlobStore;
use mediakeep_core::{
    Asset, AssetId, Clock, MediaKind, Permission, ShareLink, ShareLinkId, ShareToken,
    ShareValidity, UserId, share,
};
use mediakeep_store::{AssetLock, MediaRepository};

use crate::error::EngineError;
use crate::locking::{self, LockSettings};
use crate::metrics::EngineMetrics;

/// Produces share tokens. The default draws from the OS CSPRNG.
pub type TokenGenerator = Arc<dyn Fn() -> ShareToken + Send + Sync>;

/// What the holder of a valid token is granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareAccess {
    pub link_id: ShareLinkId,
    pub asset_id: AssetId,
    /// Where the asset's bytes can be fetched.
    pub url: String,
    pub kind: MediaKind,
    pub permission: Permission,
    pub created_by: UserId,
    /// Access count including this access.
    pub access_count: u64,
}

/// Issues, validates, and revokes share links.
pub struct ShareLinkAuthority {
    repo: Arc<dyn MediaRepository>,
    blobs: Arc<dyn BlobStore>,
    lock: Arc<dyn AssetLock>,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
    lock_settings: LockSettings,
    default_days: i64,
    token_retries: u32,
    tokens: TokenGenerator,
}

impl ShareLinkAuthority {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        repo: Arc<dyn MediaRepository>,
        blobs: Arc<dyn BlobStore>,
        lock: Arc<dyn AssetLock>,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
        lock_settings: LockSettings,
        default_days: i64,
        token_retries: u32,
    ) -> Self {
        Self {
            repo,
            blobs,
            lock,
            clock,
            metrics,
            lock_settings,
            default_days,
            token_retries,
            tokens: Arc::new(ShareToken::generate),
        }
    }

    /// Replace the token source.
    #[must_use]
    pub fn with_token_generator(mut self, tokens: TokenGenerator) -> Self {
        self.tokens = tokens;
        self
    }

    /// Issue a link for an active asset.
    ///
    /// `expires_in_days` falls back to the configured default when `None`.
    /// Zero or a negative count issues a link that never expires; a count
    /// too large to represent fails with [`EngineError::Validation`].
    #[instrument(skip(self), fields(asset = %asset_id, issuer = %issuer))]
    pub async fn issue(
        &self,
        asset_id: &AssetId,
        issuer: &UserId,
        permission: Permission,
        expires_in_days: Option<i64>,
    ) -> Result<ShareLink, EngineError> {
        let days = expires_in_days.unwrap_or(self.default_days);
        share::expiry_for(days, self.clock.now())?;
        let guard = locking::acquire(self.lock.as_ref(), asset_id, self.lock_settings).await?;
        let result = self.issue_locked(asset_id, issuer, permission, days).await;
        locking::release(guard, asset_id).await;
        result
    }

    async fn issue_locked(
        &self,
        asset_id: &AssetId,
        issuer: &UserId,
        permission: Permission,
        days: i64,
    ) -> Result<ShareLink, EngineError> {
        self.active_asset(asset_id).await?;

        let now = self.clock.now();
        for attempt in 0..=self.token_retries {
            let link = ShareLink::issue(asset_id.clone(), issuer.clone(), permission, days, now)?
                .with_token((self.tokens)());
            if self.repo.insert_share_link(&link).await? {
                self.metrics.increment_shares_issued();
                info!(
                    link = %link.id,
                    token = link.token.prefix(),
                    expires_at = ?link.expires_at,
                    "share link issued"
                );
                return Ok(link);
            }
            debug!(attempt, "share token collision, regenerating");
        }

        warn!(retries = self.token_retries, "share token collisions exhausted");
        Err(EngineError::Conflict(format!(
            "could not allocate a unique share token after {} retries",
            self.token_retries
        )))
    }

    /// Look up a token and check it has not expired.
    pub async fn validate(&self, token: &ShareToken) -> Result<ShareLink, EngineError> {
        let Some(link) = self.repo.find_share_link(token).await? else {
            self.metrics.increment_share_rejections();
            debug!(token = token.prefix(), "unknown share token");
            return Err(EngineError::NotFound(format!(
                "share link {}",
                token.prefix()
            )));
        };

        match link.validity(self.clock.now()) {
            ShareValidity::Valid => Ok(link),
            ShareValidity::Expired => {
                self.metrics.increment_share_rejections();
                debug!(link = %link.id, "share link expired");
                Err(EngineError::Expired(format!("share link {}", link.id)))
            }
        }
    }

    /// Count one access. Returns the new total.
    pub async fn consume(&self, link_id: &ShareLinkId) -> Result<u64, EngineError> {
        self.repo
            .record_share_access(link_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("share link {link_id}")))
    }

    /// Resolve a token to its asset, counting the access.
    ///
    /// A link whose asset is in the recycle bin is reported as not found and
    /// is not counted.
    #[instrument(skip(self, token), fields(token = token.prefix()))]
    pub async fn access(&self, token: &ShareToken) -> Result<ShareAccess, EngineError> {
        let link = self.validate(token).await?;
        let asset = match self.active_asset(&link.asset_id).await {
            Ok(asset) => asset,
            Err(e) => {
                self.metrics.increment_share_rejections();
                return Err(e);
            }
        };
        let access_count = self.consume(&link.id).await?;
        let url = self.blobs.url(&asset.locator)?;

        self.metrics.increment_share_accesses();
        debug!(link = %link.id, access_count, "share link accessed");
        Ok(ShareAccess {
            link_id: link.id,
            asset_id: asset.id,
            url,
            kind: asset.kind,
            permission: link.permission,
            created_by: link.created_by,
            access_count,
        })
    }

    /// Delete a link. Returns whether it existed.
    #[instrument(skip(self), fields(link = %link_id))]
    pub async fn revoke(&self, link_id: &ShareLinkId) -> Result<bool, EngineError> {
        let removed = self.repo.delete_share_link(link_id).await?;
        if removed {
            info!("share link revoked");
        }
        Ok(removed)
    }

    /// Links issued for an asset, newest first.
    pub async fn list(&self, asset_id: &AssetId) -> Result<Vec<ShareLink>, EngineError> {
        Ok(self.repo.list_share_links(asset_id).await?)
    }

    async fn active_asset(&self, asset_id: &AssetId) -> Result<Asset, EngineError> {
        self.repo
            .get_asset(asset_id)
            .await?
            .filter(Asset::is_active)
            .ok_or_else(|| EngineError::NotFound(format!("asset {asset_id}")))
    }
}
