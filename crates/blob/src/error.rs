use thiserror::Error;

/// Errors that can occur during blob storage operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The requested blob was not found.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Filesystem I/O failed.
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A storage backend error occurred.
    #[error("blob storage error: {0}")]
    Storage(String),

    /// The locator cannot be mapped onto this store.
    #[error("invalid blob locator: {0}")]
    InvalidLocator(String),
}
