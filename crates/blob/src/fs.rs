use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use mediakeep_core::BlobLocator;

use crate::error::BlobError;
use crate::store::{BlobStore, join_url};
use crate::types::PutHint;

/// [`BlobStore`] writing files under a local root directory.
///
/// Locators are relative paths below `root`. Writes go to a temporary
/// sibling first and are renamed into place, so readers never observe a
/// partially written blob.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a locator onto a path below the root, rejecting anything that
    /// could escape it.
    fn resolve(&self, locator: &BlobLocator) -> Result<PathBuf, BlobError> {
        let relative = Path::new(locator.as_str());
        if locator.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(BlobError::InvalidLocator(locator.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, data: Bytes, hint: &PutHint) -> Result<BlobLocator, BlobError> {
        let locator = hint.locator();
        let path = self.resolve(&locator)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, &data).await?;
        tokio::fs::rename(&staging, &path).await?;

        debug!(locator = %locator, bytes = data.len(), "blob written");
        Ok(locator)
    }

    async fn get(&self, locator: &BlobLocator) -> Result<Option<Bytes>, BlobError> {
        let path = self.resolve(locator)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, locator: &BlobLocator) -> Result<bool, BlobError> {
        let path = self.resolve(locator)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, locator: &BlobLocator) -> Result<bool, BlobError> {
        let path = self.resolve(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(locator = %locator, "blob deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, locator: &BlobLocator) -> Result<String, BlobError> {
        self.resolve(locator)?;
        Ok(join_url(&self.base_url, locator))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::testing::run_blob_conformance_tests;

    use super::*;

    #[tokio::test]
    async fn conformance() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "/media");
        run_blob_conformance_tests(&store)
            .await
            .expect("blob conformance tests should pass");
    }

    #[tokio::test]
    async fn writes_under_dated_upload_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "/media");
        let loc = store
            .put(
                Bytes::from_static(b"jpeg"),
                &PutHint::upload(Utc::now()).with_filename("photo.jpg"),
            )
            .await
            .unwrap();

        let on_disk = dir.path().join(loc.as_str());
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"jpeg");
        assert!(loc.ends_with(".jpg"));

        let leftovers: Vec<_> = std::fs::read_dir(on_disk.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty(), "staging file should be renamed away");
    }

    #[tokio::test]
    async fn rejects_escaping_locators() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "/media");
        for bad in ["../secret", "/etc/passwd", "uploads/../../x", ""] {
            let loc = BlobLocator::new(bad);
            assert!(
                matches!(store.get(&loc).await, Err(BlobError::InvalidLocator(_))),
                "{bad:?} should be rejected"
            );
            assert!(store.url(&loc).is_err());
        }
    }
}
