use thiserror::Error;

/// Errors that can occur when running the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Invalid or unsupported configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading the config file or preparing the blob root failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML.
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// An engine operation failed.
    #[error("engine error: {0}")]
    Engine(#[from] mediakeep_engine::EngineError),

    /// A report could not be rendered.
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),
}
