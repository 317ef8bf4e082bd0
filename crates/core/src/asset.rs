use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::types::{AssetId, BlobLocator, ClientId, Fingerprint, ProjectId, UserId};

/// A client workspace. Owns projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub owner: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A project within a client workspace. Owns assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub client: ClientId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// The kind of media an asset holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Parse the wire form (`"image"` or `"video"`).
    pub fn parse(value: &str) -> Result<Self, LifecycleError> {
        match value {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(LifecycleError::Validation(format!(
                "unknown media kind: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editorial workflow position of an asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Raw,
    Edited,
    Final,
}

impl WorkflowStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Edited => "edited",
            Self::Final => "final",
        }
    }

    /// Parse the wire form (`"raw"`, `"edited"` or `"final"`).
    pub fn parse(value: &str) -> Result<Self, LifecycleError> {
        match value {
            "raw" => Ok(Self::Raw),
            "edited" => Ok(Self::Edited),
            "final" => Ok(Self::Final),
            other => Err(LifecycleError::Validation(format!(
                "unknown workflow status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical media file.
///
/// `is_deleted` and `deleted_at` always move together, and a soft-deleted
/// asset always has exactly one [`RetentionRecord`](crate::RetentionRecord)
/// in the repository. The fingerprint describes the bytes at `locator` and is
/// never rewritten in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub project: ProjectId,
    pub uploaded_by: Option<UserId>,
    pub locator: BlobLocator,
    pub kind: MediaKind,
    pub status: WorkflowStatus,
    pub fingerprint: Option<Fingerprint>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Create a new active asset with a generated id and `raw` status.
    #[must_use]
    pub fn new(
        project: ProjectId,
        locator: BlobLocator,
        kind: MediaKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssetId::generate(),
            project,
            uploaded_by: None,
            locator,
            kind,
            status: WorkflowStatus::Raw,
            fingerprint: None,
            is_deleted: false,
            deleted_at: None,
            created_at,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<AssetId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_uploader(mut self, user: impl Into<UserId>) -> Self {
        self.uploaded_by = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<Fingerprint>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Whether the asset is live (not in the recycle bin).
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_asset_is_active_raw_and_unfingerprinted() {
        let asset = Asset::new(
            ProjectId::new("p1"),
            BlobLocator::new("uploads/a.jpg"),
            MediaKind::Image,
            Utc::now(),
        );
        assert!(asset.is_active());
        assert_eq!(asset.status, WorkflowStatus::Raw);
        assert!(asset.fingerprint.is_none());
        assert!(asset.deleted_at.is_none());
    }

    #[test]
    fn media_kind_parse() {
        assert_eq!(MediaKind::parse("image").unwrap(), MediaKind::Image);
        assert_eq!(MediaKind::parse("video").unwrap(), MediaKind::Video);
        assert!(matches!(
            MediaKind::parse("audio"),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn workflow_status_parse_and_display() {
        for status in [
            WorkflowStatus::Raw,
            WorkflowStatus::Edited,
            WorkflowStatus::Final,
        ] {
            assert_eq!(WorkflowStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(WorkflowStatus::parse("published").is_err());
    }

    #[test]
    fn asset_serializes_kind_and_status_as_snake_case() {
        let asset = Asset::new(
            ProjectId::new("p1"),
            BlobLocator::new("uploads/clip.mp4"),
            MediaKind::Video,
            Utc::now(),
        )
        .with_status(WorkflowStatus::Final);
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["kind"], "video");
        assert_eq!(json["status"], "final");
        assert_eq!(json["is_deleted"], false);
    }
}
