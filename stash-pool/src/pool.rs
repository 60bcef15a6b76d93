//! The cache pool: id derivation plus bulk orchestration over a backend.

use crate::backend::{CacheBackend, SaveOutcome};
use crate::config::PoolConfig;
use crate::error::{CacheError, CacheResult};
use crate::item::{CacheItem, Lifetime};
use crate::items::ItemIter;
use crate::key::validate_key;
use crate::namespace::{Namespace, NamespaceVersion};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use stash_log::{ConsoleLogger, Level, Logger, Record};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const TARGET: &str = "stash::pool";

/// Namespaced cache pool over a [`CacheBackend`].
///
/// Key validation failures are returned as [`CacheError::InvalidKey`].
/// Backend failures never are: they are logged through the injected
/// [`Logger`] and turned into `false` or a miss.
///
/// # Examples
///
/// ```no_run
/// use stash_pool::{CachePool, InMemoryBackend};
/// use serde_json::json;
///
/// # async fn example() -> stash_pool::CacheResult<()> {
/// let pool = CachePool::new(InMemoryBackend::new(), "app.", 0);
/// pool.enable_versioning(true);
///
/// let mut item = pool.get_item("answer").await?;
/// item.set(json!(42));
/// assert!(pool.save(&item).await);
///
/// // Invalidate the whole namespace without enumerating keys
/// pool.clear().await;
/// assert!(!pool.get_item("answer").await?.is_hit());
/// # Ok(())
/// # }
/// ```
pub struct CachePool<B: CacheBackend> {
    backend: B,
    namespace: Namespace,
    default_lifetime: Option<Duration>,
    logger: Arc<dyn Logger>,
    deferred: Mutex<Vec<CacheItem>>,
}

impl<B: CacheBackend> CachePool<B> {
    /// Create a pool. `default_lifetime_secs == 0` persists items without an
    /// explicit expiry indefinitely. Versioning starts disabled.
    pub fn new(backend: B, namespace: impl Into<String>, default_lifetime_secs: u64) -> Self {
        Self::with_config(
            backend,
            PoolConfig::new(namespace).with_default_lifetime(default_lifetime_secs),
        )
    }

    /// Create a pool from a [`PoolConfig`].
    pub fn with_config(backend: B, config: PoolConfig) -> Self {
        let default_lifetime = config.default_lifetime();
        Self {
            backend,
            namespace: Namespace::new(config.namespace, config.versioning),
            default_lifetime,
            logger: Arc::new(ConsoleLogger),
            deferred: Mutex::new(Vec::new()),
        }
    }

    /// Replace the logger (a [`ConsoleLogger`] by default).
    pub fn with_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// The namespace prefix.
    pub fn namespace(&self) -> &str {
        self.namespace.prefix()
    }

    /// The backend driver.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current versioning state.
    pub fn versioning(&self) -> NamespaceVersion {
        self.namespace.state()
    }

    /// Physical id for `key`, resolving the namespace version if needed.
    ///
    /// Unlike the data operations this reports backend failures as errors.
    pub async fn derive_id(&self, key: &str) -> CacheResult<String> {
        validate_key(key)?;
        let mut ids = self.derive_ids(&[key]).await?;
        Ok(ids.remove(0))
    }

    /// A blank item for `key`, without asking the backend.
    ///
    /// Useful to overwrite a value unconditionally; the item reports a miss.
    pub fn item(&self, key: &str) -> CacheResult<CacheItem> {
        validate_key(key)?;
        Ok(CacheItem::miss(key.to_string(), self.default_lifetime))
    }

    /// Check whether `key` is cached.
    pub async fn has_item(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;

        let result = match self.derive_ids(&[key]).await {
            Ok(ids) => self.backend.has(&ids[0]).await,
            Err(e) => Err(e),
        };

        Ok(result.unwrap_or_else(|e| {
            self.report(
                Record::warning(TARGET, format!("Failed to check if key \"{}\" is cached", key))
                    .with_field("operation", "has_item")
                    .with_field("key", key),
                &e,
            );
            false
        }))
    }

    /// Fetch one item. Backend failures yield a miss.
    pub async fn get_item(&self, key: &str) -> CacheResult<CacheItem> {
        validate_key(key)?;

        let fetched = match self.derive_ids(&[key]).await {
            Ok(ids) => self.backend.fetch_many(&ids).await.map(|found| {
                found
                    .into_iter()
                    .find(|(id, _)| *id == ids[0])
                    .map(|(_, value)| value)
            }),
            Err(e) => Err(e),
        };

        let value = fetched.unwrap_or_else(|e| {
            self.report(
                Record::warning(TARGET, format!("Failed to fetch key \"{}\"", key))
                    .with_field("operation", "get_item")
                    .with_field("key", key),
                &e,
            );
            None
        });

        Ok(match value {
            Some(value) => CacheItem::hit(key.to_string(), value, self.default_lifetime),
            None => CacheItem::miss(key.to_string(), self.default_lifetime),
        })
    }

    /// Fetch several items with one backend call.
    ///
    /// The returned iterator yields one `(key, item)` pair per distinct key:
    /// hits first, then misses. Repeated keys are served once, so `len()` is
    /// the number of distinct keys and may be smaller than `keys.len()`.
    /// Backend failures turn every key into a miss.
    pub async fn get_items<K: AsRef<str>>(&self, keys: &[K]) -> CacheResult<ItemIter> {
        let keys = validate_all(keys)?;

        let (pairs, fetched) = match self.derive_ids(&keys).await {
            Ok(ids) => {
                let fetched = self.backend.fetch_many(&ids).await;
                let pairs = pair_up(ids, &keys);
                (pairs, fetched)
            }
            // No ids without a version; the keys stand in for them since
            // nothing will be matched anyway.
            Err(e) => (pair_up(keys.iter().map(|k| k.to_string()).collect(), &keys), Err(e)),
        };

        let fetched = fetched.unwrap_or_else(|e| {
            self.report(
                Record::warning(TARGET, "Failed to fetch requested items")
                    .with_field("operation", "get_items")
                    .with_field("keys", keys.join(", ")),
                &e,
            );
            Vec::new()
        });

        Ok(ItemIter::new(pairs, fetched, self.default_lifetime))
    }

    /// Delete one item.
    pub async fn delete_item(&self, key: &str) -> CacheResult<bool> {
        self.delete_items(&[key]).await
    }

    /// Delete several items.
    ///
    /// One bulk delete is attempted first. If it fails, every id is retried
    /// on its own; each failure is logged and makes the result `false`, but
    /// the remaining ids are still attempted.
    pub async fn delete_items<K: AsRef<str>>(&self, keys: &[K]) -> CacheResult<bool> {
        let keys = validate_all(keys)?;

        let ids = match self.derive_ids(&keys).await {
            Ok(ids) => ids,
            Err(e) => {
                self.report(
                    Record::warning(TARGET, "Failed to delete requested items")
                        .with_field("operation", "delete_items")
                        .with_field("keys", keys.join(", ")),
                    &e,
                );
                return Ok(false);
            }
        };

        let bulk = self.backend.delete_many(&ids).await;
        if matches!(bulk, Ok(true)) {
            return Ok(true);
        }

        if self.logger.enabled(Level::Debug) {
            let mut record = Record::debug(TARGET, "Bulk delete failed, retrying per key")
                .with_field("operation", "delete_items")
                .with_field("keys", keys.join(", "));
            if let Err(e) = &bulk {
                record = record.with_field("exception", e);
            }
            self.logger.log(&record);
        }

        let mut ok = true;
        for (key, id) in keys.iter().zip(&ids) {
            let result = match self.backend.delete_many(std::slice::from_ref(id)).await {
                Ok(true) => continue,
                Ok(false) => CacheError::backend("backend reported failure"),
                Err(e) => e,
            };

            self.report(
                Record::warning(TARGET, format!("Failed to delete key \"{}\"", key))
                    .with_field("operation", "delete_items")
                    .with_field("key", key),
                &result,
            );
            ok = false;
        }

        Ok(ok)
    }

    /// Persist an item now.
    ///
    /// An expiry already in the past deletes the key instead.
    pub async fn save(&self, item: &CacheItem) -> bool {
        let key = item.key();
        let lifetime = item.lifetime_at(Utc::now());

        let id = match self.derive_ids(&[key]).await {
            Ok(mut ids) => ids.remove(0),
            Err(e) => {
                self.report(
                    Record::warning(TARGET, format!("Failed to save key \"{}\"", key))
                        .with_field("operation", "save")
                        .with_field("key", key),
                    &e,
                );
                return false;
            }
        };

        if lifetime == Lifetime::Expired {
            return match self.backend.delete_many(std::slice::from_ref(&id)).await {
                Ok(deleted) => deleted,
                Err(e) => {
                    self.report(
                        Record::warning(TARGET, format!("Failed to delete expired key \"{}\"", key))
                            .with_field("operation", "save")
                            .with_field("key", key),
                        &e,
                    );
                    false
                }
            };
        }

        match self
            .backend
            .save_many(vec![(id, item.pending_value())], lifetime.ttl())
            .await
        {
            Ok(outcome) if outcome.is_success() => true,
            Ok(_) => {
                self.logger.log(
                    &Record::warning(TARGET, format!("Failed to save key \"{}\"", key))
                        .with_field("operation", "save")
                        .with_field("key", key),
                );
                false
            }
            Err(e) => {
                self.report(
                    Record::warning(TARGET, format!("Failed to save key \"{}\"", key))
                        .with_field("operation", "save")
                        .with_field("key", key),
                    &e,
                );
                false
            }
        }
    }

    /// Queue an item for the next [`commit`](Self::commit). A queued item
    /// replaces an earlier one with the same key.
    pub fn save_deferred(&self, item: CacheItem) -> bool {
        let mut deferred = self.deferred.lock();
        deferred.retain(|queued| queued.key() != item.key());
        deferred.push(item);
        true
    }

    /// Persist every deferred item, with one backend save per distinct
    /// lifetime. Expired items are deleted. The queue is emptied either way.
    pub async fn commit(&self) -> bool {
        let items = std::mem::take(&mut *self.deferred.lock());
        if items.is_empty() {
            return true;
        }

        let keys: Vec<&str> = items.iter().map(|i| i.key()).collect();
        let ids = match self.derive_ids(&keys).await {
            Ok(ids) => ids,
            Err(e) => {
                self.report(
                    Record::warning(TARGET, "Failed to commit deferred items")
                        .with_field("operation", "commit")
                        .with_field("keys", keys.join(", ")),
                    &e,
                );
                return false;
            }
        };

        let now = Utc::now();
        let mut expired: Vec<(String, &str)> = Vec::new();
        let mut groups: BTreeMap<Option<Duration>, Vec<(String, &str, Value)>> = BTreeMap::new();

        for (item, id) in items.iter().zip(ids) {
            match item.lifetime_at(now) {
                Lifetime::Expired => expired.push((id, item.key())),
                lifetime => groups.entry(lifetime.ttl()).or_default().push((
                    id,
                    item.key(),
                    item.pending_value(),
                )),
            }
        }

        let mut ok = true;

        if !expired.is_empty() {
            let (ids, keys): (Vec<String>, Vec<&str>) = expired.into_iter().unzip();
            let record = Record::warning(TARGET, "Failed to delete expired deferred items")
                .with_field("operation", "commit")
                .with_field("keys", keys.join(", "));

            match self.backend.delete_many(&ids).await {
                Ok(true) => {}
                Ok(false) => {
                    self.logger.log(&record);
                    ok = false;
                }
                Err(e) => {
                    self.report(record, &e);
                    ok = false;
                }
            }
        }

        for (ttl, entries) in groups {
            let keys_by_id: Vec<(String, &str)> =
                entries.iter().map(|(id, key, _)| (id.clone(), *key)).collect();
            let values = entries.into_iter().map(|(id, _, value)| (id, value)).collect();

            match self.backend.save_many(values, ttl).await {
                Ok(SaveOutcome::Failed(failed)) if !failed.is_empty() => {
                    for (id, key) in keys_by_id.iter().filter(|(id, _)| failed.contains(id)) {
                        self.logger.log(
                            &Record::warning(TARGET, format!("Failed to save key \"{}\"", key))
                                .with_field("operation", "commit")
                                .with_field("key", key)
                                .with_field("id", id),
                        );
                    }
                    ok = false;
                }
                Ok(outcome) if !outcome.is_success() => {
                    self.logger.log(
                        &Record::warning(TARGET, "Failed to save deferred items")
                            .with_field("operation", "commit")
                            .with_field("keys", join_keys(&keys_by_id)),
                    );
                    ok = false;
                }
                Ok(_) => {}
                Err(e) => {
                    self.report(
                        Record::warning(TARGET, "Failed to save deferred items")
                            .with_field("operation", "commit")
                            .with_field("keys", join_keys(&keys_by_id)),
                        &e,
                    );
                    ok = false;
                }
            }
        }

        ok
    }

    /// Number of items waiting for `commit`.
    pub fn deferred_len(&self) -> usize {
        self.deferred.lock().len()
    }

    /// Invalidate the whole namespace.
    ///
    /// With versioning enabled a new version token is written first. The
    /// backend's namespace clear runs regardless; when it also covers the
    /// version entry, the new token is written again afterwards. Returns
    /// `true` when either the bump or the namespace clear succeeded.
    pub async fn clear(&self) -> bool {
        let mut bumped = false;

        if self.namespace.state().is_enabled() {
            bumped = match self.namespace.bump(&self.backend).await {
                Ok(stored) => stored,
                Err(e) => {
                    self.report(
                        Record::warning(TARGET, "Failed to bump the namespace version")
                            .with_field("operation", "clear")
                            .with_field("namespace", self.namespace.prefix()),
                        &e,
                    );
                    false
                }
            };
        }

        let cleared = match self.backend.clear_namespace(self.namespace.prefix()).await {
            Ok(done) => done,
            Err(e) => {
                self.report(
                    Record::warning(TARGET, "Failed to clear the cache")
                        .with_field("operation", "clear")
                        .with_field("namespace", self.namespace.prefix()),
                    &e,
                );
                false
            }
        };

        if self.namespace.clear_removes_version()
            && matches!(self.namespace.state(), NamespaceVersion::Resolved(_))
        {
            self.restore_version().await;
        }

        bumped || cleared
    }

    async fn restore_version(&self) {
        let record = Record::warning(TARGET, "Failed to restore the namespace version")
            .with_field("operation", "clear")
            .with_field("namespace", self.namespace.prefix());

        match self.namespace.restore(&self.backend).await {
            Ok(true) => {}
            Ok(false) => self.logger.log(&record),
            Err(e) => self.report(record, &e),
        }
    }

    /// Enable or disable namespace versioning, returning the previous state.
    ///
    /// Versioned clears are atomic and need no key listing, at the price of
    /// one extra round-trip to resolve the version. Either way the memoized
    /// version is dropped and fetched again on next use.
    pub fn enable_versioning(&self, enable: bool) -> bool {
        self.namespace.set_versioning(enable)
    }

    /// Commit deferred items before the pool is dropped.
    pub async fn close(&self) -> bool {
        self.commit().await
    }

    /// Ids for validated keys; at most one version fetch per call.
    async fn derive_ids(&self, keys: &[&str]) -> CacheResult<Vec<String>> {
        let version = self.namespace.resolve(&self.backend).await?;
        let max_length = self.backend.max_id_length();

        Ok(keys
            .iter()
            .map(|key| {
                self.namespace
                    .physical_id(key, version.as_deref(), max_length)
            })
            .collect())
    }

    fn report(&self, record: Record, error: &CacheError) {
        self.logger.log(&record.with_field("exception", error));
    }
}

fn validate_all<K: AsRef<str>>(keys: &[K]) -> CacheResult<Vec<&str>> {
    keys.iter()
        .map(|key| {
            let key = key.as_ref();
            validate_key(key).map(|_| key)
        })
        .collect()
}

fn pair_up(ids: Vec<String>, keys: &[&str]) -> Vec<(String, String)> {
    ids.into_iter()
        .zip(keys.iter().map(|k| k.to_string()))
        .collect()
}

fn join_keys(keys_by_id: &[(String, &str)]) -> String {
    keys_by_id
        .iter()
        .map(|(_, key)| *key)
        .collect::<Vec<_>>()
        .join(", ")
}
