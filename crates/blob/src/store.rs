use async_trait::async_trait;
use bytes::Bytes;

use mediakeep_core::BlobLocator;

use crate::error::BlobError;
use crate::types::PutHint;

/// Pluggable storage for asset and version bytes.
///
/// Locators are opaque to callers. A store must be able to map every locator
/// it returned from [`put`](Self::put) back onto the same bytes, and
/// [`delete`](Self::delete) must be idempotent.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` and return a fresh locator for it.
    async fn put(&self, data: Bytes, hint: &PutHint) -> Result<BlobLocator, BlobError>;

    /// Read a blob back. Returns `None` if it does not exist.
    async fn get(&self, locator: &BlobLocator) -> Result<Option<Bytes>, BlobError>;

    async fn exists(&self, locator: &BlobLocator) -> Result<bool, BlobError>;

    /// Delete a blob. Returns `true` if it existed; deleting an absent blob
    /// is not an error.
    async fn delete(&self, locator: &BlobLocator) -> Result<bool, BlobError>;

    /// Public URL under which the blob is served.
    fn url(&self, locator: &BlobLocator) -> Result<String, BlobError>;
}

/// Join a base URL and a locator with exactly one slash.
pub(crate) fn join_url(base: &str, locator: &BlobLocator) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        locator.trim_start_matches('/')
    )
}
