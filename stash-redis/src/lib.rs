//! # Stash Redis
//!
//! Redis backend for Stash cache pools.
//!
//! ## Features
//!
//! - **DSN bootstrap**: `redis://secret@host:port/db`, unix sockets and
//!   multi-host cluster DSNs
//! - **Lazy connections**: clients connect on first use, with a connect
//!   timeout and a bounded retry loop
//! - **Connection Pooling**: single-node connections are pooled with bb8
//! - **Cluster Support**: Redis Cluster through `redis::cluster_async`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stash_pool::CachePool;
//! use stash_redis::{ConnectionOptions, RedisBackend, RedisClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RedisClient::create_connection(
//!         "redis://localhost:6379/0?retry_interval=0.5",
//!         ConnectionOptions::default(),
//!     )?;
//!
//!     let pool = CachePool::new(RedisBackend::new(client), "app.", 3600);
//!     pool.enable_versioning(true);
//!
//!     let mut item = pool.get_item("greeting").await?;
//!     item.set(json!("hello"));
//!     pool.save(&item).await;
//!
//!     Ok(())
//! }
//! ```

mod backend;
mod client;
mod config;
mod dsn;
mod error;

pub use backend::RedisBackend;
pub use client::{RedisClient, RedisPool};
pub use config::{ConnectionOptions, ConnectionOptionsBuilder, DEFAULT_PORT, Host};
pub use dsn::{parse_dsn, parse_dsn_with};
pub use error::{RedisError, Result};

// Re-export redis crate for convenience
pub use redis;

/// Prelude for common imports.
///
/// ```
/// use stash_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backend::RedisBackend;
    pub use crate::client::RedisClient;
    pub use crate::config::{ConnectionOptions, ConnectionOptionsBuilder, Host};
    pub use crate::error::{RedisError, Result};
}
