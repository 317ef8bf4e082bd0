pub mod commands;
pub mod config;
pub mod error;
pub mod factory;

pub use config::WorkerConfig;
pub use error::WorkerError;
