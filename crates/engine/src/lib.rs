pub mod background;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod duplicates;
pub mod engine;
pub mod error;
mod locking;
pub mod metrics;
pub mod retention;
pub mod shares;
pub mod sweeper;
pub mod versions;

pub use background::{SweepConfig, SweepEvent, SweepProcessor, SweepProcessorBuilder};
pub use builder::EngineBuilder;
pub use catalog::{AssetCatalog, AssetUpload, RecycledAsset};
pub use config::{DEFAULT_SHARE_DAYS, EngineConfig};
pub use duplicates::{DuplicateGroup, DuplicateIndex, DuplicateReport};
pub use engine::MediaEngine;
pub use error::EngineError;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use retention::{PurgeOutcome, RetentionEngine, StorageWarning};
pub use shares::{ShareAccess, ShareLinkAuthority, TokenGenerator};
pub use sweeper::{FailureKind, RetentionSweeper, SweepFailure, SweepReport};
pub use versions::VersionChain;
