use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AssetId, BlobLocator, Fingerprint, UserId, VersionId};

/// An immutable snapshot of an asset's bytes.
///
/// Version numbers start at 1 and strictly increase per asset. Versions are
/// siblings of the asset's current content, never replacements for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub asset_id: AssetId,
    pub version_number: u32,
    pub locator: BlobLocator,
    pub fingerprint: Option<Fingerprint>,
    pub created_by: UserId,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Number to assign to the next version given the highest number in use.
///
/// Numbering follows the highest existing number rather than the row count,
/// so removing an old version never causes a number to be handed out twice.
#[must_use]
pub fn next_version_number(highest: Option<u32>) -> u32 {
    highest.map_or(1, |n| n.saturating_add(1))
}

/// Sort versions newest first.
pub fn sort_newest_first(versions: &mut [Version]) {
    versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
}
