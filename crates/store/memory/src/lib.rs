mod lock;
mod repository;

pub use lock::{MemoryAssetLock, MemoryLockGuard};
pub use repository::MemoryRepository;
