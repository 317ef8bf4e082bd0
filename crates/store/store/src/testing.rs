use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};

use mediakeep_core::{
    Asset, AssetId, BlobLocator, Client, ClientId, Fingerprint, MediaKind, Permission, Project,
    ProjectId, RetentionDays, RetentionRecord, ShareLink, UserId, Version, VersionId,
    WorkflowStatus,
};

use crate::error::StoreError;
use crate::lock::AssetLock;
use crate::repository::{AssetFilter, MediaRepository};

// Backends may store timestamps at microsecond precision.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

async fn seed_project(repo: &dyn MediaRepository) -> Result<Project, StoreError> {
    let client = Client {
        id: ClientId::generate(),
        owner: UserId::new("owner"),
        name: "Acme".into(),
        created_at: now(),
    };
    repo.insert_client(&client).await?;
    let project = Project {
        id: ProjectId::generate(),
        client: client.id.clone(),
        name: "Spring campaign".into(),
        created_at: now(),
    };
    repo.insert_project(&project).await?;
    Ok(project)
}

async fn seed_asset(
    repo: &dyn MediaRepository,
    project: &Project,
    fingerprint: Option<&str>,
) -> Result<Asset, StoreError> {
    let mut asset = Asset::new(
        project.id.clone(),
        BlobLocator::new(format!("uploads/{}", AssetId::generate())),
        MediaKind::Image,
        now(),
    )
    .with_uploader("u1");
    asset.fingerprint = fingerprint.map(Fingerprint::new);
    repo.insert_asset(&asset).await?;
    Ok(asset)
}

fn version(asset: &AssetId, number: u32) -> Version {
    Version {
        id: VersionId::generate(),
        asset_id: asset.clone(),
        version_number: number,
        locator: BlobLocator::new(format!("versions/{asset}/{number}")),
        fingerprint: Some(Fingerprint::new(format!("v{number}"))),
        created_by: UserId::new("u1"),
        note: None,
        created_at: now(),
    }
}

/// Run the full repository conformance test suite.
///
/// Call this from your backend's test module with a fresh repository. Every
/// test seeds its own client and project, so the suite can share a database
/// with other data.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_repository_conformance_tests(
    repo: &dyn MediaRepository,
) -> Result<(), StoreError> {
    test_client_and_project(repo).await?;
    test_project_requires_client(repo).await?;
    test_asset_insert_and_get(repo).await?;
    test_asset_requires_project(repo).await?;
    test_duplicate_asset_id_conflicts(repo).await?;
    test_list_assets_filters(repo).await?;
    test_update_status(repo).await?;
    test_soft_delete_inserts_once(repo).await?;
    test_soft_delete_missing_asset(repo).await?;
    test_restore(repo).await?;
    test_list_expired_retention(repo).await?;
    test_delete_asset_cascades(repo).await?;
    test_version_numbers_unique(repo).await?;
    test_share_link_token_unique(repo).await?;
    test_share_access_counter(repo).await?;
    test_concurrent_share_access(repo).await?;
    test_delete_share_link(repo).await?;
    Ok(())
}

async fn test_client_and_project(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let fetched = repo.get_project(&project.id).await?;
    assert_eq!(fetched.as_ref(), Some(&project));
    let client = repo.get_client(&project.client).await?;
    assert!(client.is_some(), "owning client should exist");
    assert!(repo.get_client(&ClientId::generate()).await?.is_none());
    Ok(())
}

async fn test_project_requires_client(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let orphan = Project {
        id: ProjectId::generate(),
        client: ClientId::generate(),
        name: "orphan".into(),
        created_at: now(),
    };
    let result = repo.insert_project(&orphan).await;
    assert!(
        matches!(result, Err(StoreError::NotFound(_))),
        "project with unknown client should be rejected"
    );
    Ok(())
}

async fn test_asset_insert_and_get(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, Some("abc")).await?;
    let fetched = repo.get_asset(&asset.id).await?;
    assert_eq!(fetched.as_ref(), Some(&asset));
    assert!(repo.get_asset(&AssetId::generate()).await?.is_none());
    Ok(())
}

async fn test_asset_requires_project(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let asset = Asset::new(
        ProjectId::generate(),
        BlobLocator::new("uploads/orphan"),
        MediaKind::Video,
        now(),
    );
    let result = repo.insert_asset(&asset).await;
    assert!(
        matches!(result, Err(StoreError::NotFound(_))),
        "asset with unknown project should be rejected"
    );
    Ok(())
}

async fn test_duplicate_asset_id_conflicts(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    let result = repo.insert_asset(&asset).await;
    assert!(
        matches!(result, Err(StoreError::Conflict(_))),
        "reusing an asset id should conflict"
    );
    Ok(())
}

async fn test_list_assets_filters(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let hash = format!("dup-{}", AssetId::generate());
    let a = seed_asset(repo, &project, Some(&hash)).await?;
    let b = seed_asset(repo, &project, Some(&hash)).await?;
    let c = seed_asset(repo, &project, None).await?;

    let in_project = repo
        .list_assets(&AssetFilter::active().in_project(project.id.clone()))
        .await?;
    assert_eq!(in_project.len(), 3);

    let same_hash = repo
        .list_assets(&AssetFilter::active().with_fingerprint(Fingerprint::new(hash.clone())))
        .await?;
    let mut ids: Vec<AssetId> = same_hash.into_iter().map(|a| a.id).collect();
    ids.sort();
    let mut expected = vec![a.id.clone(), b.id.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    let record = RetentionRecord::open(b.id.clone(), now(), RetentionDays::default());
    assert!(repo.soft_delete(&record).await?);

    let active = repo
        .list_assets(&AssetFilter::active().in_project(project.id.clone()))
        .await?;
    assert_eq!(active.len(), 2, "soft-deleted assets are hidden by default");
    assert!(active.iter().all(|x| x.id != b.id));

    let all = repo
        .list_assets(
            &AssetFilter::active()
                .in_project(project.id.clone())
                .including_deleted(),
        )
        .await?;
    assert_eq!(all.len(), 3);

    let fingerprinted = repo
        .list_assets(
            &AssetFilter::active()
                .in_project(project.id.clone())
                .fingerprinted(),
        )
        .await?;
    assert_eq!(fingerprinted.len(), 1);
    assert!(fingerprinted.iter().all(|x| x.id != c.id));
    Ok(())
}

async fn test_update_status(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    assert!(repo.update_status(&asset.id, WorkflowStatus::Final).await?);
    let fetched = repo.get_asset(&asset.id).await?.expect("asset exists");
    assert_eq!(fetched.status, WorkflowStatus::Final);
    assert!(
        !repo
            .update_status(&AssetId::generate(), WorkflowStatus::Edited)
            .await?
    );
    Ok(())
}

async fn test_soft_delete_inserts_once(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    let at = now();

    let first = RetentionRecord::open(asset.id.clone(), at, RetentionDays::new(7));
    assert!(repo.soft_delete(&first).await?, "first soft delete applies");

    let second = RetentionRecord::open(
        asset.id.clone(),
        at + ChronoDuration::days(1),
        RetentionDays::new(30),
    );
    assert!(
        !repo.soft_delete(&second).await?,
        "second soft delete must not replace the record"
    );

    let stored = repo.get_retention(&asset.id).await?;
    assert_eq!(stored.as_ref(), Some(&first));
    let fetched = repo.get_asset(&asset.id).await?.expect("asset exists");
    assert!(fetched.is_deleted);
    assert_eq!(fetched.deleted_at, Some(at));
    Ok(())
}

async fn test_soft_delete_missing_asset(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let record = RetentionRecord::open(AssetId::generate(), now(), RetentionDays::default());
    let result = repo.soft_delete(&record).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
    Ok(())
}

async fn test_restore(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    assert!(!repo.restore(&asset.id).await?, "active asset has nothing to restore");

    let record = RetentionRecord::open(asset.id.clone(), now(), RetentionDays::default());
    repo.soft_delete(&record).await?;
    assert!(repo.restore(&asset.id).await?);

    let fetched = repo.get_asset(&asset.id).await?.expect("asset exists");
    assert!(!fetched.is_deleted);
    assert!(fetched.deleted_at.is_none());
    assert!(repo.get_retention(&asset.id).await?.is_none());
    Ok(())
}

async fn test_list_expired_retention(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let expired = seed_asset(repo, &project, None).await?;
    let pending = seed_asset(repo, &project, None).await?;
    let base = now() - ChronoDuration::days(10);

    repo.soft_delete(&RetentionRecord::open(
        expired.id.clone(),
        base,
        RetentionDays::new(7),
    ))
    .await?;
    repo.soft_delete(&RetentionRecord::open(
        pending.id.clone(),
        base,
        RetentionDays::new(30),
    ))
    .await?;

    let cutoff = base + ChronoDuration::days(7);
    let due = repo.list_expired_retention(cutoff).await?;
    assert!(
        due.iter().any(|r| r.asset_id == expired.id),
        "record expiring exactly at the cutoff is due"
    );
    assert!(due.iter().all(|r| r.asset_id != pending.id));
    assert!(
        due.windows(2).all(|w| w[0].expiry <= w[1].expiry),
        "expired records come back soonest first"
    );

    let all = repo.list_retention().await?;
    assert!(all.iter().any(|r| r.asset_id == pending.id));
    Ok(())
}

async fn test_delete_asset_cascades(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    repo.insert_version(&version(&asset.id, 1)).await?;
    let link = ShareLink::issue(
        asset.id.clone(),
        UserId::new("u1"),
        Permission::View,
        7,
        now(),
    )
    .expect("representable share expiry");
    repo.insert_share_link(&link).await?;
    repo.soft_delete(&RetentionRecord::open(
        asset.id.clone(),
        now(),
        RetentionDays::default(),
    ))
    .await?;

    assert!(repo.delete_asset(&asset.id).await?);
    assert!(repo.get_asset(&asset.id).await?.is_none());
    assert!(repo.get_retention(&asset.id).await?.is_none());
    assert!(repo.list_versions(&asset.id).await?.is_empty());
    assert!(repo.get_share_link(&link.id).await?.is_none());
    assert!(repo.find_share_link(&link.token).await?.is_none());

    assert!(
        !repo.delete_asset(&asset.id).await?,
        "second delete reports nothing removed"
    );
    Ok(())
}

async fn test_version_numbers_unique(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    assert_eq!(repo.latest_version_number(&asset.id).await?, None);

    assert!(repo.insert_version(&version(&asset.id, 1)).await?);
    assert!(repo.insert_version(&version(&asset.id, 2)).await?);
    assert!(
        !repo.insert_version(&version(&asset.id, 2)).await?,
        "version number collision must be rejected"
    );
    assert_eq!(repo.latest_version_number(&asset.id).await?, Some(2));

    let numbers: Vec<u32> = repo
        .list_versions(&asset.id)
        .await?
        .iter()
        .map(|v| v.version_number)
        .collect();
    assert_eq!(numbers, vec![2, 1]);

    let missing = version(&AssetId::generate(), 1);
    assert!(matches!(
        repo.insert_version(&missing).await,
        Err(StoreError::NotFound(_))
    ));
    Ok(())
}

async fn test_share_link_token_unique(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    let first = ShareLink::issue(
        asset.id.clone(),
        UserId::new("u1"),
        Permission::Download,
        0,
        now(),
    )
    .expect("representable share expiry");
    assert!(repo.insert_share_link(&first).await?);

    let mut clash = ShareLink::issue(
        asset.id.clone(),
        UserId::new("u2"),
        Permission::View,
        7,
        now(),
    )
    .expect("representable share expiry");
    clash.token = first.token.clone();
    assert!(
        !repo.insert_share_link(&clash).await?,
        "token collision must be rejected"
    );

    let found = repo.find_share_link(&first.token).await?;
    assert_eq!(found.as_ref(), Some(&first), "original link is untouched");
    assert!(repo.get_share_link(&clash.id).await?.is_none());

    let listed = repo.list_share_links(&asset.id).await?;
    assert_eq!(listed.len(), 1);
    Ok(())
}

async fn test_share_access_counter(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    let link = ShareLink::issue(
        asset.id.clone(),
        UserId::new("u1"),
        Permission::View,
        7,
        now(),
    )
    .expect("representable share expiry");
    repo.insert_share_link(&link).await?;

    assert_eq!(repo.record_share_access(&link.id).await?, Some(1));
    assert_eq!(repo.record_share_access(&link.id).await?, Some(2));
    let stored = repo.get_share_link(&link.id).await?.expect("link exists");
    assert_eq!(stored.access_count, 2);

    assert_eq!(
        repo.record_share_access(&mediakeep_core::ShareLinkId::generate())
            .await?,
        None
    );
    Ok(())
}

async fn test_concurrent_share_access(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    const ACCESSES: u64 = 25;

    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    let link = ShareLink::issue(
        asset.id.clone(),
        UserId::new("u1"),
        Permission::View,
        7,
        now(),
    )
    .expect("representable share expiry");
    repo.insert_share_link(&link).await?;

    let results =
        futures::future::join_all((0..ACCESSES).map(|_| repo.record_share_access(&link.id))).await;
    let mut counts = Vec::new();
    for result in results {
        counts.push(result?.expect("link exists"));
    }
    counts.sort_unstable();
    assert_eq!(
        counts,
        (1..=ACCESSES).collect::<Vec<u64>>(),
        "every concurrent access gets its own count"
    );

    let stored = repo.get_share_link(&link.id).await?.expect("link exists");
    assert_eq!(stored.access_count, ACCESSES, "no increment is lost");
    Ok(())
}

async fn test_delete_share_link(repo: &dyn MediaRepository) -> Result<(), StoreError> {
    let project = seed_project(repo).await?;
    let asset = seed_asset(repo, &project, None).await?;
    let link = ShareLink::issue(
        asset.id.clone(),
        UserId::new("u1"),
        Permission::View,
        7,
        now(),
    )
    .expect("representable share expiry");
    repo.insert_share_link(&link).await?;
    assert!(repo.delete_share_link(&link.id).await?);
    assert!(!repo.delete_share_link(&link.id).await?);
    assert!(repo.find_share_link(&link.token).await?.is_none());
    Ok(())
}

/// Run the asset lock conformance test suite.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_lock_conformance_tests(lock: &dyn AssetLock) -> Result<(), StoreError> {
    test_try_lock_and_release(lock).await?;
    test_try_lock_contention(lock).await?;
    test_locks_are_per_asset(lock).await?;
    test_lock_times_out(lock).await?;
    Ok(())
}

async fn test_try_lock_and_release(lock: &dyn AssetLock) -> Result<(), StoreError> {
    let asset = AssetId::generate();
    let guard = lock
        .try_lock(&asset, Duration::from_secs(10))
        .await?
        .expect("uncontested lock should be acquired");
    assert!(guard.is_held().await?, "lock should be held");
    guard.release().await?;

    let again = lock.try_lock(&asset, Duration::from_secs(10)).await?;
    assert!(again.is_some(), "released lock can be taken again");
    if let Some(g) = again {
        g.release().await?;
    }
    Ok(())
}

async fn test_try_lock_contention(lock: &dyn AssetLock) -> Result<(), StoreError> {
    let asset = AssetId::generate();
    let held = lock
        .try_lock(&asset, Duration::from_secs(10))
        .await?
        .expect("should acquire lock");

    let second = lock.try_lock(&asset, Duration::from_secs(10)).await?;
    assert!(
        second.is_none(),
        "second acquire should fail while lock is held"
    );

    held.release().await?;
    Ok(())
}

async fn test_locks_are_per_asset(lock: &dyn AssetLock) -> Result<(), StoreError> {
    let a = lock
        .try_lock(&AssetId::generate(), Duration::from_secs(10))
        .await?
        .expect("should acquire first asset");
    let b = lock
        .try_lock(&AssetId::generate(), Duration::from_secs(10))
        .await?;
    assert!(b.is_some(), "different assets do not contend");
    a.release().await?;
    if let Some(g) = b {
        g.release().await?;
    }
    Ok(())
}

async fn test_lock_times_out(lock: &dyn AssetLock) -> Result<(), StoreError> {
    let asset = AssetId::generate();
    let held = lock
        .try_lock(&asset, Duration::from_secs(10))
        .await?
        .expect("should acquire lock");

    let result = lock
        .lock(&asset, Duration::from_secs(10), Duration::from_millis(100))
        .await;
    assert!(
        matches!(result, Err(StoreError::Timeout(_))),
        "waiting on a held lock should time out"
    );

    held.release().await?;
    Ok(())
}
