//! Backend driver contract.

use crate::error::CacheResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Values found by [`CacheBackend::fetch_many`], in the order the backend
/// produced them. Requested ids that are absent are misses.
pub type Fetched = Vec<(String, Value)>;

/// Result of [`CacheBackend::save_many`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// All-or-nothing result.
    Done(bool),
    /// Ids that could not be stored; empty means everything was stored.
    Failed(Vec<String>),
}

impl SaveOutcome {
    /// Whether every value was stored.
    pub fn is_success(&self) -> bool {
        match self {
            Self::Done(ok) => *ok,
            Self::Failed(ids) => ids.is_empty(),
        }
    }
}

impl From<bool> for SaveOutcome {
    fn from(ok: bool) -> Self {
        Self::Done(ok)
    }
}

/// Raw storage primitives a pool is built on.
///
/// Every method works on physical ids produced by the pool; drivers never
/// see logical keys. Errors are reported as [`CacheError::Backend`] (or
/// [`CacheError::Timeout`]) and are recovered by the pool.
///
/// [`CacheError::Backend`]: crate::CacheError::Backend
/// [`CacheError::Timeout`]: crate::CacheError::Timeout
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Longest id the backend accepts, or `None` when unbounded.
    ///
    /// Longer ids are shortened by hashing the key part.
    fn max_id_length(&self) -> Option<usize> {
        None
    }

    /// Fetch several values at once.
    async fn fetch_many(&self, ids: &[String]) -> CacheResult<Fetched>;

    /// Check whether a value exists for `id`.
    async fn has(&self, id: &str) -> CacheResult<bool>;

    /// Delete everything whose id starts with `namespace`. An empty
    /// namespace means the whole store.
    async fn clear_namespace(&self, namespace: &str) -> CacheResult<bool>;

    /// Delete several ids at once.
    async fn delete_many(&self, ids: &[String]) -> CacheResult<bool>;

    /// Store several values with a shared lifetime. `None` persists until
    /// explicitly removed.
    async fn save_many(
        &self,
        values: Vec<(String, Value)>,
        lifetime: Option<Duration>,
    ) -> CacheResult<SaveOutcome>;
}

#[async_trait]
impl<B: CacheBackend + ?Sized> CacheBackend for std::sync::Arc<B> {
    fn max_id_length(&self) -> Option<usize> {
        (**self).max_id_length()
    }

    async fn fetch_many(&self, ids: &[String]) -> CacheResult<Fetched> {
        (**self).fetch_many(ids).await
    }

    async fn has(&self, id: &str) -> CacheResult<bool> {
        (**self).has(id).await
    }

    async fn clear_namespace(&self, namespace: &str) -> CacheResult<bool> {
        (**self).clear_namespace(namespace).await
    }

    async fn delete_many(&self, ids: &[String]) -> CacheResult<bool> {
        (**self).delete_many(ids).await
    }

    async fn save_many(
        &self,
        values: Vec<(String, Value)>,
        lifetime: Option<Duration>,
    ) -> CacheResult<SaveOutcome> {
        (**self).save_many(values, lifetime).await
    }
}
