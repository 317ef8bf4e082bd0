use thiserror::Error;

use mediakeep_core::LifecycleError;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller input was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// The asset, link or parent record does not exist (or is not visible).
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not allowed in the asset's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A share link exists but is past its expiry.
    #[error("share link expired: {0}")]
    Expired(String),

    /// A uniqueness constraint could not be satisfied after retrying.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Failed to acquire or release a per-asset lock.
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),

    /// An error from the repository.
    #[error("store error: {0}")]
    Store(#[from] mediakeep_store::StoreError),

    /// An error from the blob store.
    #[error("blob error: {0}")]
    Blob(#[from] mediakeep_blob::BlobError),

    /// Reading caller-supplied bytes failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine was misconfigured (e.g. missing required components).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<LifecycleError> for EngineError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(msg) => Self::Validation(msg),
            LifecycleError::InvalidState { asset, reason } => {
                Self::InvalidState(format!("asset {asset}: {reason}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mediakeep_core::AssetId;

    use super::*;

    #[test]
    fn lifecycle_errors_map_onto_engine_taxonomy() {
        let err: EngineError = LifecycleError::InvalidState {
            asset: AssetId::new("a1"),
            reason: "cannot purge an active asset".into(),
        }
        .into();
        assert!(matches!(err, EngineError::InvalidState(ref m) if m.contains("a1")));

        let err: EngineError = LifecycleError::Validation("bad".into()).into();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn store_errors_convert() {
        let err: EngineError = mediakeep_store::StoreError::Backend("down".into()).into();
        assert!(err.to_string().contains("down"));
    }
}
