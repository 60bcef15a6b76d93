// Stash - namespaced cache pools for Rust
//
// This library combines a backend-agnostic cache pool with pluggable storage
// drivers and an injectable logger.

// Re-export the pool core
pub use stash_pool::*;

// Re-export logging
pub use stash_log;

// Re-export optional backends
#[cfg(feature = "redis")]
pub use stash_redis;

// Prelude for common imports
pub mod prelude {
    pub use stash_log::{ConsoleLogger, Logger, MemoryLogger, NullLogger};
    pub use stash_pool::prelude::*;
    pub use stash_pool::{get, remember, set};

    #[cfg(feature = "redis")]
    pub use stash_redis::{ConnectionOptions, RedisBackend, RedisClient};
}
