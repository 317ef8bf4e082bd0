//! Asset lifecycle state machine.
//!
//! ```text
//!            soft_delete(days)               purge (now >= expiry)
//!   Active ───────────────────▶ SoftDeleted ─────────────────────▶ Purged
//!      ▲                             │
//!      └──────────── restore ────────┘
//! ```
//!
//! Transitions are pure: each function inspects the current asset (and its
//! retention record) and returns the next state together with the
//! [`Effect`]s a caller must apply to storage. Nothing here touches a
//! repository or blob store, so every rule can be tested in isolation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::error::LifecycleError;
use crate::retention::{RetentionDays, RetentionRecord};
use crate::types::{AssetId, BlobLocator};

/// Position of an asset in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    SoftDeleted {
        deleted_at: DateTime<Utc>,
        expiry: DateTime<Utc>,
    },
    /// Terminal. The asset row no longer exists.
    Purged,
}

impl LifecycleState {
    /// Derive the state of a stored asset from its row and retention record.
    #[must_use]
    pub fn of(asset: &Asset, record: Option<&RetentionRecord>) -> Self {
        match (asset.is_deleted, record) {
            (true, Some(r)) => Self::SoftDeleted {
                deleted_at: r.deleted_at,
                expiry: r.expiry,
            },
            // A flagged asset without a record has no known expiry; report the
            // deletion time as both bounds so callers still see it as deleted.
            (true, None) => {
                let at = asset.deleted_at.unwrap_or(asset.created_at);
                Self::SoftDeleted {
                    deleted_at: at,
                    expiry: at,
                }
            }
            (false, _) => Self::Active,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::SoftDeleted { .. } => "soft_deleted",
            Self::Purged => "purged",
        }
    }
}

/// A storage side effect produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Flag the asset deleted and insert its retention record, atomically and
    /// only if no record exists yet.
    MarkDeleted(RetentionRecord),
    /// Clear the deletion flag and remove the retention record.
    ClearDeleted(AssetId),
    /// Remove the asset row and everything it owns.
    DeleteAsset(AssetId),
    /// Remove the asset's bytes from blob storage. Best effort.
    DeleteBlob {
        asset_id: AssetId,
        locator: BlobLocator,
    },
}

/// Result of planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    /// The asset as it should look afterwards; `None` once purged.
    pub asset: Option<Asset>,
    /// Effects to apply, in order.
    pub effects: Vec<Effect>,
}

impl Transition {
    fn noop(asset: &Asset, state: LifecycleState) -> Self {
        Self {
            from: state.clone(),
            to: state,
            asset: Some(asset.clone()),
            effects: Vec::new(),
        }
    }

    /// A transition with no effects leaves storage untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Plan `Active -> SoftDeleted`.
///
/// Already soft-deleted assets are left alone: the original expiry stands and
/// no second retention record is requested.
#[must_use]
pub fn soft_delete(
    asset: &Asset,
    record: Option<&RetentionRecord>,
    window: RetentionDays,
    now: DateTime<Utc>,
) -> Transition {
    let from = LifecycleState::of(asset, record);
    if asset.is_deleted {
        return Transition::noop(asset, from);
    }

    let record = RetentionRecord::open(asset.id.clone(), now, window);
    let mut next = asset.clone();
    next.is_deleted = true;
    next.deleted_at = Some(now);

    Transition {
        from,
        to: LifecycleState::SoftDeleted {
            deleted_at: record.deleted_at,
            expiry: record.expiry,
        },
        asset: Some(next),
        effects: vec![Effect::MarkDeleted(record)],
    }
}

/// Plan `SoftDeleted -> Active`. Restoring an active asset is a no-op.
#[must_use]
pub fn restore(asset: &Asset, record: Option<&RetentionRecord>) -> Transition {
    let from = LifecycleState::of(asset, record);
    if !asset.is_deleted {
        return Transition::noop(asset, from);
    }

    let mut next = asset.clone();
    next.is_deleted = false;
    next.deleted_at = None;

    Transition {
        from,
        to: LifecycleState::Active,
        asset: Some(next),
        effects: vec![Effect::ClearDeleted(asset.id.clone())],
    }
}

/// Plan `SoftDeleted -> Purged`.
///
/// The row is removed before the bytes: once the row is gone the asset can
/// no longer be restored, so a failed blob deletion only leaves an orphaned
/// blob behind, never a row pointing at missing bytes.
///
/// Fails with [`LifecycleError::InvalidState`] when the asset is active, has
/// no retention record, or its retention window is still open at `now`.
pub fn purge(
    asset: &Asset,
    record: Option<&RetentionRecord>,
    now: DateTime<Utc>,
) -> Result<Transition, LifecycleError> {
    let from = LifecycleState::of(asset, record);

    if !asset.is_deleted {
        return Err(LifecycleError::InvalidState {
            asset: asset.id.clone(),
            reason: "cannot purge an active asset".into(),
        });
    }

    let Some(record) = record else {
        return Err(LifecycleError::InvalidState {
            asset: asset.id.clone(),
            reason: "asset has no retention record".into(),
        });
    };

    if !record.is_expired(now) {
        return Err(LifecycleError::InvalidState {
            asset: asset.id.clone(),
            reason: format!("retention window open until {}", record.expiry.to_rfc3339()),
        });
    }

    Ok(Transition {
        from,
        to: LifecycleState::Purged,
        asset: None,
        // Row before bytes, the reverse of deleting the blob first: a failed
        // blob delete then leaves an orphaned blob instead of a restorable
        // asset with missing content.
        effects: vec![
            Effect::DeleteAsset(asset.id.clone()),
            Effect::DeleteBlob {
                asset_id: asset.id.clone(),
                locator: asset.locator.clone(),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::asset::MediaKind;
    use crate::types::ProjectId;

    fn asset() -> Asset {
        Asset::new(
            ProjectId::new("p1"),
            BlobLocator::new("uploads/2026/01/01/a.jpg"),
            MediaKind::Image,
            Utc::now(),
        )
    }

    fn deleted(asset: &Asset, window: u32, now: DateTime<Utc>) -> (Asset, RetentionRecord) {
        let t = soft_delete(asset, None, RetentionDays::new(window), now);
        let Effect::MarkDeleted(record) = t.effects[0].clone() else {
            panic!("expected MarkDeleted");
        };
        (t.asset.unwrap(), record)
    }

    #[test]
    fn soft_delete_sets_flags_and_opens_window() {
        let now = Utc::now();
        let a = asset();
        let t = soft_delete(&a, None, RetentionDays::default(), now);

        assert_eq!(t.from, LifecycleState::Active);
        assert_eq!(t.to.name(), "soft_deleted");
        let next = t.asset.as_ref().unwrap();
        assert!(next.is_deleted);
        assert_eq!(next.deleted_at, Some(now));
        assert_eq!(
            t.effects,
            vec![Effect::MarkDeleted(RetentionRecord {
                asset_id: a.id.clone(),
                deleted_at: now,
                expiry: now + Duration::days(7),
            })]
        );
    }

    #[test]
    fn soft_delete_twice_keeps_first_expiry() {
        let first = Utc::now();
        let (a, record) = deleted(&asset(), 7, first);

        let later = first + Duration::days(3);
        let t = soft_delete(&a, Some(&record), RetentionDays::new(30), later);
        assert!(t.is_noop());
        assert_eq!(
            t.to,
            LifecycleState::SoftDeleted {
                deleted_at: first,
                expiry: first + Duration::days(7),
            }
        );
        assert_eq!(t.asset.unwrap().deleted_at, Some(first));
    }

    #[test]
    fn restore_clears_deletion() {
        let now = Utc::now();
        let (a, record) = deleted(&asset(), 7, now);
        let t = restore(&a, Some(&record));

        assert_eq!(t.to, LifecycleState::Active);
        let next = t.asset.unwrap();
        assert!(!next.is_deleted);
        assert!(next.deleted_at.is_none());
        assert_eq!(t.effects, vec![Effect::ClearDeleted(a.id.clone())]);
    }

    #[test]
    fn restore_active_is_noop() {
        let a = asset();
        let t = restore(&a, None);
        assert!(t.is_noop());
        assert_eq!(t.asset.unwrap(), a);
    }

    #[test]
    fn purge_active_is_invalid_state() {
        let err = purge(&asset(), None, Utc::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidState { .. }));
    }

    #[test]
    fn purge_before_expiry_is_invalid_state() {
        let now = Utc::now();
        let (a, record) = deleted(&asset(), 7, now);
        let err = purge(&a, Some(&record), now + Duration::days(6)).unwrap_err();
        assert!(err.to_string().contains("retention window open"));
    }

    #[test]
    fn purge_without_record_is_invalid_state() {
        let now = Utc::now();
        let (a, _) = deleted(&asset(), 0, now);
        assert!(purge(&a, None, now).is_err());
    }

    #[test]
    fn purge_expired_deletes_row_then_blob() {
        let now = Utc::now();
        let (a, record) = deleted(&asset(), 0, now);
        let t = purge(&a, Some(&record), now).unwrap();

        assert_eq!(t.to, LifecycleState::Purged);
        assert!(t.asset.is_none());
        assert_eq!(
            t.effects,
            vec![
                Effect::DeleteAsset(a.id.clone()),
                Effect::DeleteBlob {
                    asset_id: a.id.clone(),
                    locator: a.locator.clone(),
                },
            ]
        );
    }

    #[test]
    fn state_of_reflects_record() {
        let now = Utc::now();
        let a = asset();
        assert_eq!(LifecycleState::of(&a, None), LifecycleState::Active);
        let (d, record) = deleted(&a, 2, now);
        assert_eq!(
            LifecycleState::of(&d, Some(&record)),
            LifecycleState::SoftDeleted {
                deleted_at: now,
                expiry: now + Duration::days(2),
            }
        );
    }
}
