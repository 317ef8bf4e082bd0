use bytes::Bytes;
use chrono::Utc;

use mediakeep_core::BlobLocator;

use crate::error::BlobError;
use crate::store::BlobStore;
use crate::types::PutHint;

/// Run the blob store conformance test suite.
///
/// # Errors
///
/// Returns an error if any storage call fails unexpectedly.
pub async fn run_blob_conformance_tests(store: &dyn BlobStore) -> Result<(), BlobError> {
    test_put_get(store).await?;
    test_missing(store).await?;
    test_delete_idempotent(store).await?;
    test_distinct_locators(store).await?;
    test_url(store).await?;
    Ok(())
}

async fn test_put_get(store: &dyn BlobStore) -> Result<(), BlobError> {
    let data = Bytes::from_static(b"frame data");
    let loc = store.put(data.clone(), &PutHint::upload(Utc::now())).await?;
    assert!(store.exists(&loc).await?, "stored blob should exist");
    assert_eq!(store.get(&loc).await?, Some(data));
    Ok(())
}

async fn test_missing(store: &dyn BlobStore) -> Result<(), BlobError> {
    let loc = BlobLocator::new("uploads/2000/01/01/never-written");
    assert!(!store.exists(&loc).await?);
    assert!(store.get(&loc).await?.is_none());
    Ok(())
}

async fn test_delete_idempotent(store: &dyn BlobStore) -> Result<(), BlobError> {
    let loc = store
        .put(Bytes::from_static(b"bye"), &PutHint::upload(Utc::now()))
        .await?;
    assert!(store.delete(&loc).await?, "first delete removes the blob");
    assert!(!store.exists(&loc).await?);
    assert!(
        !store.delete(&loc).await?,
        "deleting an absent blob succeeds and reports false"
    );
    Ok(())
}

async fn test_distinct_locators(store: &dyn BlobStore) -> Result<(), BlobError> {
    let data = Bytes::from_static(b"same bytes");
    let a = store.put(data.clone(), &PutHint::upload(Utc::now())).await?;
    let b = store.put(data, &PutHint::version(Utc::now())).await?;
    assert_ne!(a, b, "every put gets its own locator");
    assert!(a.starts_with("uploads/"));
    assert!(b.starts_with("versions/"));
    Ok(())
}

async fn test_url(store: &dyn BlobStore) -> Result<(), BlobError> {
    let loc = store
        .put(Bytes::from_static(b"u"), &PutHint::upload(Utc::now()))
        .await?;
    let url = store.url(&loc)?;
    assert!(url.ends_with(loc.as_str()), "url {url} should end with locator");
    Ok(())
}
