//! In-memory backend driver.

use crate::backend::{CacheBackend, Fetched, SaveOutcome};
use crate::error::CacheResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Process-local backend keeping values in a map.
///
/// Clones share the same storage, so a clone can be kept around to inspect
/// what a pool wrote.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<HashMap<String, Entry>>>,
    max_id_length: Option<usize>,
}

#[derive(Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }
}

impl InMemoryBackend {
    /// Create an empty, unbounded backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a maximum id length, as size-limited stores do.
    pub fn with_max_id_length(mut self, max: usize) -> Self {
        self.max_id_length = Some(max);
        self
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Whether no live entry is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Live ids, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let now = Instant::now();
        let mut ids: Vec<String> = self
            .data
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.data.write().await.retain(|_, e| e.is_live(now));
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    fn max_id_length(&self) -> Option<usize> {
        self.max_id_length
    }

    async fn fetch_many(&self, ids: &[String]) -> CacheResult<Fetched> {
        let data = self.data.read().await;
        let now = Instant::now();

        Ok(ids
            .iter()
            .filter_map(|id| {
                data.get(id)
                    .filter(|e| e.is_live(now))
                    .map(|e| (id.clone(), e.value.clone()))
            })
            .collect())
    }

    async fn has(&self, id: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .data
            .read()
            .await
            .get(id)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn clear_namespace(&self, namespace: &str) -> CacheResult<bool> {
        let mut data = self.data.write().await;
        if namespace.is_empty() {
            data.clear();
        } else {
            data.retain(|id, _| !id.starts_with(namespace));
        }
        Ok(true)
    }

    async fn delete_many(&self, ids: &[String]) -> CacheResult<bool> {
        let mut data = self.data.write().await;
        for id in ids {
            data.remove(id);
        }
        Ok(true)
    }

    async fn save_many(
        &self,
        values: Vec<(String, Value)>,
        lifetime: Option<Duration>,
    ) -> CacheResult<SaveOutcome> {
        let expires_at = lifetime
            .filter(|d| !d.is_zero())
            .map(|d| Instant::now() + d);

        let mut data = self.data.write().await;
        for (id, value) in values {
            data.insert(id, Entry { value, expires_at });
        }

        Ok(SaveOutcome::Done(true))
    }
}
