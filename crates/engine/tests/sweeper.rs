//! Retention sweeps against the full engine.

mod common;

use chrono::Duration;
use futures::future::join_all;

use common::Harness;
use mediakeep_blob::BlobStore;
use mediakeep_core::{Clock, RetentionDays};
use mediakeep_engine::FailureKind;
use mediakeep_store::MediaRepository;

#[tokio::test]
async fn only_expired_records_are_purged() {
    let h = Harness::new().await;
    let short = h.upload(b"short").await;
    let long = h.upload(b"long").await;
    let retention = h.engine.retention();
    retention
        .soft_delete(&short.id, Some(RetentionDays::new(1)))
        .await
        .unwrap();
    retention
        .soft_delete(&long.id, Some(RetentionDays::new(10)))
        .await
        .unwrap();

    h.clock.advance(Duration::days(1));
    let now = h.clock.now();
    let pending = h.engine.sweeper().pending(now).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].asset_id, short.id);

    let report = h.engine.sweeper().sweep(now).await.unwrap();
    assert_eq!(report.purged_count, 1);
    assert!(report.is_clean());
    assert!(h.repo.get_asset(&short.id).await.unwrap().is_none());
    assert!(h.repo.get_asset(&long.id).await.unwrap().unwrap().is_deleted);

    let again = h.engine.sweeper().sweep(now).await.unwrap();
    assert_eq!(again.purged_count, 0);
}

#[tokio::test]
async fn blob_failure_is_reported_and_row_still_purged() {
    let h = Harness::new().await;
    let asset = h.upload(b"stuck").await;
    h.blobs.fail_delete_of(&asset.locator);
    h.engine
        .retention()
        .soft_delete(&asset.id, Some(RetentionDays::new(0)))
        .await
        .unwrap();

    let report = h.engine.sweeper().sweep(h.clock.now()).await.unwrap();
    assert_eq!(report.purged_count, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::Storage);
    assert_eq!(report.failures[0].asset_id, asset.id);
    assert!(h.repo.get_asset(&asset.id).await.unwrap().is_none());
    assert!(h.blobs.exists(&asset.locator).await.unwrap());
}

#[tokio::test]
async fn repository_failure_does_not_stop_the_pass() {
    let h = Harness::new().await;
    let broken = h.upload(b"broken").await;
    let fine = h.upload(b"fine").await;
    h.repo.fail_delete_of(&broken.id);
    for id in [&broken.id, &fine.id] {
        h.engine
            .retention()
            .soft_delete(id, Some(RetentionDays::new(0)))
            .await
            .unwrap();
    }

    let report = h.engine.sweeper().sweep(h.clock.now()).await.unwrap();
    assert_eq!(report.purged_count, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::Repository);
    assert_eq!(report.failures[0].asset_id, broken.id);

    assert!(h.repo.get_asset(&fine.id).await.unwrap().is_none());
    let kept = h.repo.get_asset(&broken.id).await.unwrap().unwrap();
    assert!(kept.is_deleted, "failed purge leaves the asset in the recycle bin");
    assert!(h.blobs.exists(&broken.locator).await.unwrap());
}

#[tokio::test]
async fn concurrent_sweeps_purge_each_asset_once() {
    let h = Harness::new().await;
    let mut ids = Vec::new();
    for i in 0..6u8 {
        let asset = h.upload(&[i]).await;
        h.engine
            .retention()
            .soft_delete(&asset.id, Some(RetentionDays::new(0)))
            .await
            .unwrap();
        ids.push(asset.id);
    }

    let now = h.clock.now();
    let sweeper = h.engine.sweeper();
    let reports = join_all((0..3).map(|_| sweeper.sweep(now))).await;

    let mut purged = 0;
    for report in reports {
        let report = report.unwrap();
        assert!(report.is_clean(), "lost races are not failures: {report:?}");
        purged += report.purged_count;
    }
    assert_eq!(purged, ids.len());
    assert_eq!(h.engine.metrics().snapshot().purged, ids.len() as u64);
    for id in &ids {
        assert!(h.repo.get_asset(id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn restored_asset_is_skipped() {
    let h = Harness::new().await;
    let asset = h.upload(b"saved").await;
    h.engine
        .retention()
        .soft_delete(&asset.id, Some(RetentionDays::new(0)))
        .await
        .unwrap();
    let now = h.clock.now();
    assert_eq!(h.engine.sweeper().pending(now).await.unwrap().len(), 1);

    h.engine.retention().restore(&asset.id).await.unwrap();
    let report = h.engine.sweeper().sweep(now).await.unwrap();
    assert_eq!(report.purged_count, 0);
    assert!(report.is_clean());
    assert!(h.repo.get_asset(&asset.id).await.unwrap().unwrap().is_active());
}
