pub mod error;
pub mod lock;
pub mod repository;
pub mod testing;

pub use error::StoreError;
pub use lock::{AssetLock, AssetLockGuard, lock_name};
pub use repository::{AssetFilter, MediaRepository};
