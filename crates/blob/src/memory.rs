use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use mediakeep_core::BlobLocator;

use crate::error::BlobError;
use crate::store::{BlobStore, join_url};
use crate::types::PutHint;

/// In-memory [`BlobStore`] for tests and single-process deployments.
#[derive(Debug)]
pub struct MemoryBlobStore {
    blobs: DashMap<BlobLocator, Bytes>,
    base_url: String,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("/media")
    }
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            blobs: DashMap::new(),
            base_url: base_url.into(),
        }
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: Bytes, hint: &PutHint) -> Result<BlobLocator, BlobError> {
        let locator = hint.locator();
        self.blobs.insert(locator.clone(), data);
        Ok(locator)
    }

    async fn get(&self, locator: &BlobLocator) -> Result<Option<Bytes>, BlobError> {
        Ok(self.blobs.get(locator).map(|b| b.clone()))
    }

    async fn exists(&self, locator: &BlobLocator) -> Result<bool, BlobError> {
        Ok(self.blobs.contains_key(locator))
    }

    async fn delete(&self, locator: &BlobLocator) -> Result<bool, BlobError> {
        Ok(self.blobs.remove(locator).is_some())
    }

    fn url(&self, locator: &BlobLocator) -> Result<String, BlobError> {
        Ok(join_url(&self.base_url, locator))
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::run_blob_conformance_tests;

    use super::*;

    #[tokio::test]
    async fn conformance() {
        let store = MemoryBlobStore::default();
        run_blob_conformance_tests(&store)
            .await
            .expect("blob conformance tests should pass");
    }

    #[tokio::test]
    async fn url_uses_base() {
        let store = MemoryBlobStore::new("https://cdn.test/");
        let url = store.url(&BlobLocator::new("uploads/x")).unwrap();
        assert_eq!(url, "https://cdn.test/uploads/x");
    }
}
