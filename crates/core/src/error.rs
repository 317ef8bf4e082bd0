use thiserror::Error;

use crate::types::AssetId;

/// Errors produced by pure lifecycle transitions and input validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Malformed input (missing bytes, bad retention day count, unknown enum value).
    #[error("validation error: {0}")]
    Validation(String),

    /// The transition is forbidden from the asset's current state.
    #[error("invalid state for asset {asset}: {reason}")]
    InvalidState {
        /// The asset the transition was attempted on.
        asset: AssetId,
        /// Why the transition was rejected.
        reason: String,
    },
}
