//! Typed shortcuts over a [`CachePool`].

use crate::backend::CacheBackend;
use crate::error::CacheResult;
use crate::pool::CachePool;
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::time::Duration;

/// Get a typed value from the pool.
///
/// Misses and backend failures both yield `None`; a cached value of the
/// wrong shape is a [`CacheError::Deserialization`](crate::CacheError::Deserialization).
pub async fn get<B: CacheBackend, T: DeserializeOwned>(
    pool: &CachePool<B>,
    key: &str,
) -> CacheResult<Option<T>> {
    pool.get_item(key).await?.get_as()
}

/// Store a typed value. `ttl` of `None` falls back to the pool's default
/// lifetime.
pub async fn set<B: CacheBackend, T: Serialize>(
    pool: &CachePool<B>,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> CacheResult<bool> {
    let mut item = pool.item(key)?;
    item.set_serialized(value)?;
    if ttl.is_some() {
        item.expires_after(ttl);
    }
    Ok(pool.save(&item).await)
}

/// Return the cached value, or compute it with `factory` and cache it.
///
/// The computed value is returned even if storing it fails.
pub async fn remember<B, T, F, Fut>(
    pool: &CachePool<B>,
    key: &str,
    ttl: Option<Duration>,
    factory: F,
) -> CacheResult<T>
where
    B: CacheBackend,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = CacheResult<T>>,
{
    if let Some(value) = get(pool, key).await? {
        return Ok(value);
    }

    let value = factory().await?;
    set(pool, key, &value, ttl).await?;
    Ok(value)
}
