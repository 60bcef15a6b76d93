//! Cache items handed out by a pool.

use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::time::Duration;

/// A key/value pair as seen by a pool at retrieval time.
///
/// Items are only created by [`CachePool`](crate::CachePool). The hit flag is
/// fixed at creation: a miss stays a miss even after [`set`](Self::set), and
/// `get()` returns `None` for it. Mutators only take effect once the item is
/// passed back to `save`.
///
/// # Examples
///
/// ```no_run
/// use stash_pool::{CachePool, InMemoryBackend};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn example() -> stash_pool::CacheResult<()> {
/// let pool = CachePool::new(InMemoryBackend::new(), "app.", 0);
///
/// let mut item = pool.get_item("greeting").await?;
/// if !item.is_hit() {
///     item.set(json!("hello")).expires_after(Some(Duration::from_secs(60)));
///     pool.save(&item).await;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    key: String,
    value: Option<Value>,
    is_hit: bool,
    expiry: Option<DateTime<Utc>>,
    default_lifetime: Option<Duration>,
}

/// How long a save should keep a value around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifetime {
    /// The expiry already passed; saving means deleting.
    Expired,
    /// No expiry at all.
    Persistent,
    /// Relative lifetime in whole seconds, rounded up.
    Seconds(u64),
}

impl Lifetime {
    /// TTL handed to the backend. `None` persists indefinitely.
    pub(crate) fn ttl(self) -> Option<Duration> {
        match self {
            Lifetime::Seconds(secs) => Some(Duration::from_secs(secs)),
            Lifetime::Expired | Lifetime::Persistent => None,
        }
    }
}

impl CacheItem {
    pub(crate) fn hit(key: String, value: Value, default_lifetime: Option<Duration>) -> Self {
        Self {
            key,
            value: Some(value),
            is_hit: true,
            expiry: None,
            default_lifetime,
        }
    }

    pub(crate) fn miss(key: String, default_lifetime: Option<Duration>) -> Self {
        Self {
            key,
            value: None,
            is_hit: false,
            expiry: None,
            default_lifetime,
        }
    }

    /// The logical key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored value, or `None` when the lookup missed.
    ///
    /// `Some(&Value::Null)` means a null was found in the cache.
    pub fn get(&self) -> Option<&Value> {
        if self.is_hit {
            self.value.as_ref()
        } else {
            None
        }
    }

    /// Deserialize the stored value into `T`.
    pub fn get_as<T: DeserializeOwned>(&self) -> CacheResult<Option<T>> {
        match self.get() {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| CacheError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Whether the lookup that produced this item found a value.
    pub fn is_hit(&self) -> bool {
        self.is_hit
    }

    /// Replace the value to be saved.
    pub fn set(&mut self, value: Value) -> &mut Self {
        self.value = Some(value);
        self
    }

    /// Serialize `value` and use it as the value to be saved.
    pub fn set_serialized<T: Serialize>(&mut self, value: &T) -> CacheResult<&mut Self> {
        let value =
            serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(self.set(value))
    }

    /// Expire at an absolute point in time. `None` falls back to the pool's
    /// default lifetime.
    pub fn expires_at(&mut self, expiration: Option<DateTime<Utc>>) -> &mut Self {
        self.expiry = expiration;
        self
    }

    /// Expire after a period from now. `None` falls back to the pool's
    /// default lifetime.
    pub fn expires_after(&mut self, time: Option<Duration>) -> &mut Self {
        self.expiry = time.and_then(|d| {
            chrono::Duration::from_std(d)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
        });
        self
    }

    /// The absolute expiry, if one was set.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// Value to persist. Unlike `get()` this ignores the hit flag, since a
    /// missed item may have been `set()` by the caller.
    pub(crate) fn pending_value(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }

    /// Lifetime relative to `now`: the explicit expiry wins over the
    /// default lifetime.
    pub(crate) fn lifetime_at(&self, now: DateTime<Utc>) -> Lifetime {
        match self.expiry {
            Some(expiry) => {
                let ms = (expiry - now).num_milliseconds();
                if ms <= 0 {
                    Lifetime::Expired
                } else {
                    Lifetime::Seconds((ms as u64).div_ceil(1000))
                }
            }
            None => match self.default_lifetime {
                Some(d) if !d.is_zero() => Lifetime::Seconds(d.as_secs().max(1)),
                _ => Lifetime::Persistent,
            },
        }
    }
}
