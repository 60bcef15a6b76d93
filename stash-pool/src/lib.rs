//! Backend-agnostic cache pool for Stash.
//!
//! A [`CachePool`] turns logical keys into namespaced physical ids and runs
//! bulk fetch, check, delete, save and clear operations on top of a small
//! set of [`CacheBackend`] primitives. Backend failures are logged and
//! turned into misses or `false`; only invalid keys are reported as errors.
//!
//! # Features
//!
//! - **Namespace versioning** - clear a namespace by writing a new version
//!   token instead of deleting every entry
//! - **Bounded ids** - keys too long for the backend are hashed to fit
//! - **Deferred saves** - queue items and commit them in one go
//! - **Typed helpers** - [`get`], [`set`] and [`remember`] for serde types
//!
//! # Examples
//!
//! ```no_run
//! use stash_pool::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CacheError> {
//!     let pool = CachePool::new(InMemoryBackend::new(), "app.", 300);
//!
//!     let mut item = pool.get_item("greeting").await?;
//!     if !item.is_hit() {
//!         item.set(json!("hello"));
//!         pool.save(&item).await;
//!     }
//!
//!     for (key, item) in pool.get_items(&["greeting", "other"]).await? {
//!         println!("{key}: {:?}", item.get());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod helpers;
pub mod item;
pub mod items;
pub mod key;
pub mod memory;
pub mod namespace;
pub mod pool;

pub use backend::{CacheBackend, Fetched, SaveOutcome};
pub use config::PoolConfig;
pub use error::{CacheError, CacheResult};
pub use helpers::*;
pub use item::CacheItem;
pub use items::ItemIter;
pub use key::{MAX_KEY_LENGTH, RESERVED_CHARACTERS, validate_key};
pub use memory::InMemoryBackend;
pub use namespace::NamespaceVersion;
pub use pool::CachePool;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::backend::{CacheBackend, SaveOutcome};
    pub use crate::config::PoolConfig;
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::item::CacheItem;
    pub use crate::memory::InMemoryBackend;
    pub use crate::pool::CachePool;
}
