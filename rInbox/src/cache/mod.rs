//! Durable storage and the thread summary cache.

mod memory;
mod threads;
mod traits;

pub use memory::MemoryStorage;
pub use threads::{ScopeKey, ThreadCache, DEFAULT_MAX_THREADS};
pub use traits::{SessionStorage, SessionStorageExt};
