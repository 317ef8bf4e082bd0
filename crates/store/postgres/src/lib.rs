mod config;
mod lock;
mod migrations;
mod store;

pub use config::PostgresConfig;
pub use lock::{PostgresAssetLock, PostgresLockGuard};
pub use migrations::run_migrations;
pub use store::PostgresRepository;
