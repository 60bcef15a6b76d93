//! Integration tests for stash-pool

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use stash_log::{Level, MemoryLogger};
use stash_pool::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// In-memory backend with scriptable failures, recording what it was asked.
#[derive(Default)]
struct ScriptedBackend {
    inner: InMemoryBackend,
    max_id_length: Option<usize>,
    fail_bulk_delete: bool,
    failing_deletes: HashSet<String>,
    rejected_saves: HashSet<String>,
    skip_namespace_clear: bool,
    unconfirmed_deletes: bool,
    fetches: Mutex<Vec<Vec<String>>>,
    deletes: Mutex<Vec<Vec<String>>>,
    saves: Mutex<Vec<(Vec<String>, Option<Duration>)>>,
}

impl ScriptedBackend {
    fn fetch_count(&self) -> usize {
        self.fetches.lock().len()
    }

    async fn raw(&self, id: &str) -> Option<Value> {
        self.inner
            .fetch_many(&[id.to_string()])
            .await
            .unwrap()
            .into_iter()
            .next()
            .map(|(_, value)| value)
    }
}

#[async_trait]
impl CacheBackend for ScriptedBackend {
    fn max_id_length(&self) -> Option<usize> {
        self.max_id_length
    }

    async fn fetch_many(&self, ids: &[String]) -> CacheResult<Fetched> {
        self.fetches.lock().push(ids.to_vec());
        self.inner.fetch_many(ids).await
    }

    async fn has(&self, id: &str) -> CacheResult<bool> {
        self.inner.has(id).await
    }

    async fn clear_namespace(&self, namespace: &str) -> CacheResult<bool> {
        if self.skip_namespace_clear {
            return Ok(false);
        }
        self.inner.clear_namespace(namespace).await
    }

    async fn delete_many(&self, ids: &[String]) -> CacheResult<bool> {
        self.deletes.lock().push(ids.to_vec());

        if ids.len() > 1 && self.fail_bulk_delete {
            return Err(CacheError::backend("bulk delete unsupported"));
        }
        if ids.iter().any(|id| self.failing_deletes.contains(id)) {
            return Err(CacheError::backend("delete refused"));
        }
        if self.unconfirmed_deletes {
            return Ok(false);
        }
        self.inner.delete_many(ids).await
    }

    async fn save_many(
        &self,
        values: Vec<(String, Value)>,
        lifetime: Option<Duration>,
    ) -> CacheResult<SaveOutcome> {
        self.saves
            .lock()
            .push((values.iter().map(|(id, _)| id.clone()).collect(), lifetime));

        let (rejected, accepted): (Vec<_>, Vec<_>) = values
            .into_iter()
            .partition(|(id, _)| self.rejected_saves.contains(id));

        self.inner.save_many(accepted, lifetime).await?;
        Ok(SaveOutcome::Failed(
            rejected.into_iter().map(|(id, _)| id).collect(),
        ))
    }
}

async fn store(pool: &CachePool<Arc<ScriptedBackend>>, key: &str, value: Value) {
    let mut item = pool.item(key).unwrap();
    item.set(value);
    assert!(pool.save(&item).await);
}

#[tokio::test]
async fn test_saved_item_is_a_hit() {
    let pool = CachePool::new(InMemoryBackend::new(), "app.", 0);

    for (key, value) in [("n", json!(1)), ("s", json!("text")), ("null", Value::Null)] {
        let mut item = pool.get_item(key).await.unwrap();
        item.set(value.clone());
        assert!(pool.save(&item).await);

        let fetched = pool.get_item(key).await.unwrap();
        assert!(fetched.is_hit());
        assert_eq!(fetched.get(), Some(&value));
    }
}

#[tokio::test]
async fn test_never_saved_key_is_a_miss() {
    let pool = CachePool::new(InMemoryBackend::new(), "app.", 0);

    let item = pool.get_item("missing").await.unwrap();
    assert!(!item.is_hit());
    assert_eq!(item.get(), None);
    assert!(!pool.has_item("missing").await.unwrap());
}

#[tokio::test]
async fn test_save_get_delete_scenario() {
    let pool = CachePool::new(InMemoryBackend::new(), "", 0);

    let mut item = pool.get_item("a").await.unwrap();
    item.set(json!(42)).expires_after(None);
    assert!(pool.save(&item).await);

    let item = pool.get_item("a").await.unwrap();
    assert!(item.is_hit());
    assert_eq!(item.get(), Some(&json!(42)));

    assert!(pool.delete_item("a").await.unwrap());

    let item = pool.get_item("a").await.unwrap();
    assert!(!item.is_hit());
    assert_eq!(item.get(), None);
}

#[tokio::test]
async fn test_versioned_clear_twice() {
    let backend = Arc::new(ScriptedBackend {
        skip_namespace_clear: true,
        ..Default::default()
    });
    let pool = CachePool::new(backend.clone(), "ns.", 0);
    pool.enable_versioning(true);

    store(&pool, "before", json!("old")).await;
    assert_eq!(backend.inner.ids().await, vec!["ns.1:before"]);

    assert!(pool.clear().await);
    assert_eq!(backend.raw("@ns.").await, Some(json!("2:")));

    assert!(pool.clear().await);
    assert_eq!(backend.raw("@ns.").await, Some(json!("3:")));

    store(&pool, "after", json!("new")).await;

    assert!(!pool.get_item("before").await.unwrap().is_hit());
    assert!(pool.get_item("after").await.unwrap().is_hit());
    assert_eq!(pool.derive_id("after").await.unwrap(), "ns.3:after");
}

async fn stored_version(backend: &InMemoryBackend, namespace: &str) -> Option<Value> {
    let id = format!("@{}", namespace);
    backend
        .fetch_many(&[id])
        .await
        .unwrap()
        .into_iter()
        .next()
        .map(|(_, value)| value)
}

#[tokio::test]
async fn test_versioned_clear_twice_over_memory_backend() {
    for namespace in ["", "app."] {
        let backend = InMemoryBackend::new();
        let pool = CachePool::with_config(
            backend.clone(),
            PoolConfig::new(namespace).with_versioning(true),
        );

        let mut item = pool.item("before").unwrap();
        item.set(json!("old"));
        assert!(pool.save(&item).await);

        assert!(pool.clear().await, "first clear in {:?}", namespace);
        let first = pool.versioning();
        assert_eq!(stored_version(&backend, namespace).await, Some(json!("2:")));

        assert!(pool.clear().await, "second clear in {:?}", namespace);
        let second = pool.versioning();
        assert_eq!(stored_version(&backend, namespace).await, Some(json!("3:")));
        assert_ne!(first, second);

        let mut item = pool.item("after").unwrap();
        item.set(json!("new"));
        assert!(pool.save(&item).await);

        assert!(!pool.get_item("before").await.unwrap().is_hit());
        assert!(pool.get_item("after").await.unwrap().is_hit());

        // A pool opened afterwards resolves the same version.
        let other = CachePool::with_config(
            backend.clone(),
            PoolConfig::new(namespace).with_versioning(true),
        );
        assert!(!other.get_item("before").await.unwrap().is_hit());
        assert!(other.get_item("after").await.unwrap().is_hit());
        assert_eq!(
            other.derive_id("after").await.unwrap(),
            format!("{}3:after", namespace)
        );
    }
}

#[tokio::test]
async fn test_versions_are_shared_between_pools() {
    let backend = Arc::new(ScriptedBackend {
        skip_namespace_clear: true,
        ..Default::default()
    });
    let writer = CachePool::with_config(backend.clone(), PoolConfig::new("s.").with_versioning(true));
    let reader = CachePool::with_config(backend.clone(), PoolConfig::new("s.").with_versioning(true));

    store(&writer, "k", json!(1)).await;
    assert!(reader.get_item("k").await.unwrap().is_hit());

    assert!(writer.clear().await);
    assert!(!writer.get_item("k").await.unwrap().is_hit());

    // The reader memoized "1:" and keeps it until versioning is toggled.
    assert!(reader.get_item("k").await.unwrap().is_hit());
    reader.enable_versioning(true);
    assert!(!reader.get_item("k").await.unwrap().is_hit());
}

#[tokio::test]
async fn test_corrupt_version_token_restarts_counter() {
    let backend = Arc::new(ScriptedBackend::default());
    backend
        .inner
        .save_many(vec![("@ns.".into(), json!("garbage"))], None)
        .await
        .unwrap();

    let pool = CachePool::new(backend.clone(), "ns.", 0);
    pool.enable_versioning(true);

    assert_eq!(pool.derive_id("k").await.unwrap(), "ns.garbagek");
    assert!(pool.clear().await);
    assert_eq!(backend.raw("@ns.").await, Some(json!("1:")));
    assert_eq!(pool.derive_id("k").await.unwrap(), "ns.1:k");
}

#[tokio::test]
async fn test_unversioned_clear_uses_backend() {
    let backend = Arc::new(ScriptedBackend::default());
    let pool = CachePool::new(backend.clone(), "ns.", 0);

    store(&pool, "a", json!(1)).await;
    backend
        .inner
        .save_many(vec![("other.a".into(), json!(2))], None)
        .await
        .unwrap();

    assert!(pool.clear().await);
    assert!(!pool.has_item("a").await.unwrap());
    assert_eq!(backend.inner.ids().await, vec!["other.a"]);
    assert_eq!(backend.raw("@ns.").await, None);
}

#[tokio::test]
async fn test_delete_items_falls_back_per_key() {
    let backend = Arc::new(ScriptedBackend {
        fail_bulk_delete: true,
        failing_deletes: HashSet::from(["c".to_string()]),
        ..Default::default()
    });
    let logger = MemoryLogger::new();
    let pool = CachePool::new(backend.clone(), "", 0).with_logger(logger.clone());

    for key in ["a", "b", "c"] {
        store(&pool, key, json!(key)).await;
    }

    assert!(!pool.delete_items(&["a", "b", "c"]).await.unwrap());

    assert!(!pool.has_item("a").await.unwrap());
    assert!(!pool.has_item("b").await.unwrap());
    assert!(pool.has_item("c").await.unwrap());

    let deletes = backend.deletes.lock().clone();
    assert_eq!(
        deletes,
        vec![
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec!["a".to_string()],
            vec!["b".to_string()],
            vec!["c".to_string()],
        ]
    );

    let warnings = logger.records_at(Level::Warn);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field("key"), Some("c"));
    assert_eq!(warnings[0].field("operation"), Some("delete_items"));
}

#[tokio::test]
async fn test_bulk_delete_success_skips_fallback() {
    let backend = Arc::new(ScriptedBackend::default());
    let pool = CachePool::new(backend.clone(), "", 0);

    store(&pool, "a", json!(1)).await;
    assert!(pool.delete_items(&["a", "b"]).await.unwrap());
    assert_eq!(backend.deletes.lock().len(), 1);
}

#[tokio::test]
async fn test_oversized_keys_are_hashed() {
    let backend = Arc::new(ScriptedBackend {
        max_id_length: Some(32),
        ..Default::default()
    });
    let pool = CachePool::new(backend.clone(), "ns:", 0);
    pool.enable_versioning(true);

    let long = "k".repeat(40);
    let other = "j".repeat(40);

    let id = pool.derive_id(&long).await.unwrap();
    assert!(id.len() <= 32);
    assert!(id.starts_with("ns:1:"));
    assert_ne!(id, pool.derive_id(&other).await.unwrap());

    store(&pool, &long, json!("long")).await;
    let item = pool.get_item(&long).await.unwrap();
    assert!(item.is_hit());
    assert_eq!(item.key(), long);

    assert_eq!(pool.derive_id("short").await.unwrap(), "ns:1:short");
}

#[tokio::test]
async fn test_get_items_partial_hits() {
    let backend = Arc::new(ScriptedBackend::default());
    let pool = CachePool::new(backend.clone(), "", 0);
    store(&pool, "y", json!("why")).await;

    let items = pool.get_items(&["x", "y"]).await.unwrap();
    assert_eq!(items.len(), 2);

    let items: Vec<(String, CacheItem)> = items.collect();
    let hits: Vec<&str> = items
        .iter()
        .filter(|(_, i)| i.is_hit())
        .map(|(k, _)| k.as_str())
        .collect();
    let misses: Vec<&str> = items
        .iter()
        .filter(|(_, i)| !i.is_hit())
        .map(|(k, _)| k.as_str())
        .collect();

    assert_eq!(hits, vec!["y"]);
    assert_eq!(misses, vec!["x"]);
}

#[tokio::test]
async fn test_get_items_serves_repeated_keys_once() {
    let pool = CachePool::new(InMemoryBackend::new(), "dup.", 0);
    let mut item = pool.item("a").unwrap();
    item.set(json!(1));
    assert!(pool.save(&item).await);

    let items = pool.get_items(&["a", "b", "a", "b"]).await.unwrap();
    assert_eq!(items.len(), 2);

    let keys: Vec<String> = items.map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_one_version_fetch_per_batch() {
    let backend = Arc::new(ScriptedBackend::default());
    let pool = CachePool::new(backend.clone(), "v.", 0);
    pool.enable_versioning(true);

    let _ = pool.get_items(&["a", "b", "c"]).await.unwrap().count();
    assert_eq!(backend.fetch_count(), 2);
    assert_eq!(backend.fetches.lock()[0], vec!["@v.".to_string()]);

    let _ = pool.get_items(&["a", "b", "c"]).await.unwrap().count();
    assert_eq!(backend.fetch_count(), 3);
}

#[tokio::test]
async fn test_default_lifetime_reaches_backend() {
    let backend = Arc::new(ScriptedBackend::default());

    let pool = CachePool::new(backend.clone(), "", 300);
    store(&pool, "a", json!(1)).await;

    let persistent = CachePool::new(backend.clone(), "", 0);
    store(&persistent, "b", json!(2)).await;

    let saves = backend.saves.lock().clone();
    assert_eq!(saves[0].1, Some(Duration::from_secs(300)));
    assert_eq!(saves[1].1, None);
}

#[tokio::test]
async fn test_rejected_save_is_reported() {
    let backend = Arc::new(ScriptedBackend {
        rejected_saves: HashSet::from(["bad".to_string()]),
        ..Default::default()
    });
    let logger = MemoryLogger::new();
    let pool = CachePool::new(backend.clone(), "", 0).with_logger(logger.clone());

    let mut item = pool.item("bad").unwrap();
    item.set(json!(1));
    assert!(!pool.save(&item).await);
    assert_eq!(logger.records_at(Level::Warn)[0].field("key"), Some("bad"));

    let mut good = pool.item("good").unwrap();
    good.set(json!(1));
    pool.save_deferred(item);
    pool.save_deferred(good);
    assert!(!pool.commit().await);
    assert!(pool.has_item("good").await.unwrap());
}

#[tokio::test]
async fn test_commit_reports_unconfirmed_expired_delete() {
    let backend = Arc::new(ScriptedBackend {
        unconfirmed_deletes: true,
        ..Default::default()
    });
    let logger = MemoryLogger::new();
    let pool = CachePool::new(backend.clone(), "c.", 0).with_logger(logger.clone());

    let mut stale = pool.item("stale").unwrap();
    stale.set(json!(1)).expires_at(Some(chrono::Utc::now() - chrono::Duration::seconds(5)));
    pool.save_deferred(stale);

    assert!(!pool.commit().await);
    assert_eq!(*backend.deletes.lock(), vec![vec!["c.stale".to_string()]]);

    let warnings = logger.records_at(Level::Warn);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field("operation"), Some("commit"));
    assert_eq!(warnings[0].field("keys"), Some("stale"));
}

#[tokio::test]
async fn test_commit_saves_once_per_lifetime() {
    let backend = Arc::new(ScriptedBackend::default());
    let pool = CachePool::new(backend.clone(), "c.", 0);

    for key in ["a", "b"] {
        let mut item = pool.item(key).unwrap();
        item.set(json!(key));
        pool.save_deferred(item);
    }
    let mut short = pool.item("short").unwrap();
    short.set(json!(0)).expires_after(Some(Duration::from_secs(60)));
    pool.save_deferred(short);

    assert!(pool.commit().await);

    let saves = backend.saves.lock().clone();
    assert_eq!(
        saves,
        vec![
            (vec!["c.a".to_string(), "c.b".to_string()], None),
            (vec!["c.short".to_string()], Some(Duration::from_secs(60))),
        ]
    );
}

#[tokio::test]
async fn test_typed_helpers_over_backend() {
    let backend = Arc::new(ScriptedBackend::default());
    let pool = CachePool::new(backend.clone(), "typed.", 0);

    let value: Vec<u32> = remember(&pool, "list", None, || async { Ok(vec![1, 2, 3]) })
        .await
        .unwrap();
    assert_eq!(value, vec![1, 2, 3]);
    assert_eq!(backend.raw("typed.list").await, Some(json!([1, 2, 3])));

    let cached: Option<Vec<u32>> = get(&pool, "list").await.unwrap();
    assert_eq!(cached, Some(vec![1, 2, 3]));
}
