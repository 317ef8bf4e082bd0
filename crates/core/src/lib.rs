pub mod asset;
pub mod clock;
pub mod error;
pub mod fingerprint;
pub mod lifecycle;
pub mod retention;
pub mod share;
pub mod types;
pub mod version;

pub use asset::{Asset, Client, MediaKind, Project, WorkflowStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LifecycleError;
pub use fingerprint::{
    DEFAULT_CHUNK_SIZE, fingerprint_async_reader, fingerprint_bytes, fingerprint_reader,
};
pub use lifecycle::{Effect, LifecycleState, Transition};
pub use retention::{DEFAULT_RETENTION_DAYS, MAX_RETENTION_DAYS, RetentionDays, RetentionRecord};
pub use share::{Permission, ShareLink, ShareToken, ShareValidity};
pub use types::{
    AssetId, BlobLocator, ClientId, Fingerprint, ProjectId, ShareLinkId, UserId, VersionId,
};
pub use version::{Version, next_version_number};
