//! Redis implementation of the pool's backend primitives.

use crate::client::RedisClient;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use stash_pool::{CacheBackend, CacheResult, Fetched, SaveOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Keys fetched per SCAN round while clearing a namespace.
const SCAN_COUNT: usize = 1000;

/// Redis backend. Values are stored as JSON strings.
///
/// # Examples
///
/// ```no_run
/// use stash_pool::CachePool;
/// use stash_redis::{ConnectionOptions, RedisBackend, RedisClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RedisClient::create_connection("redis://localhost", ConnectionOptions::default())?;
/// let pool = CachePool::new(RedisBackend::new(client), "app.", 3600);
///
/// let item = pool.get_item("user.42").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    client: Arc<RedisClient>,
}

impl RedisBackend {
    /// Wrap a client.
    pub fn new(client: RedisClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Share a client with other users.
    pub fn from_shared(client: Arc<RedisClient>) -> Self {
        Self { client }
    }

    /// Get the underlying client.
    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    async fn fetch(&self, ids: &[String]) -> Result<Fetched> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<Option<String>> = self.client.query(redis::cmd("MGET").arg(ids)).await?;

        let mut fetched = Vec::with_capacity(raw.len());
        for (id, json) in ids.iter().zip(raw) {
            if let Some(json) = json {
                fetched.push((id.clone(), serde_json::from_str(&json)?));
            }
        }
        Ok(fetched)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: u64 = self.client.query(redis::cmd("DEL").arg(ids)).await?;
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<bool> {
        if namespace.is_empty() {
            let _: () = self.client.query(&redis::cmd("FLUSHDB")).await?;
            return Ok(true);
        }

        if self.client.is_cluster() {
            // SCAN only walks a single node; rely on versioning instead.
            debug!(namespace, "Namespace clear skipped on cluster");
            return Ok(false);
        }

        let pattern = format!("{}*", escape_glob(namespace));
        let mut cursor: u64 = 0;
        loop {
            let (next, ids): (u64, Vec<String>) = self
                .client
                .query(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT),
                )
                .await?;

            self.delete(&ids).await?;

            if next == 0 {
                return Ok(true);
            }
            cursor = next;
        }
    }

    async fn save(
        &self,
        values: Vec<(String, Value)>,
        lifetime: Option<Duration>,
    ) -> Result<SaveOutcome> {
        let ttl = lifetime.map(|d| d.as_secs().max(1));

        let mut encoded = Vec::with_capacity(values.len());
        for (id, value) in values {
            let json = serde_json::to_string(&value)?;
            encoded.push((id, json));
        }

        if self.client.is_cluster() {
            // Ids may hash to different slots; one command each.
            let mut failed = Vec::new();
            for (id, json) in encoded {
                if let Err(e) = self.client.query::<()>(&set_command(&id, &json, ttl)).await {
                    warn!(id = %id, error = %e, "Failed to save cache entry");
                    failed.push(id);
                }
            }
            return Ok(SaveOutcome::Failed(failed));
        }

        let mut pipe = redis::pipe();
        for (id, json) in &encoded {
            pipe.add_command(set_command(id, json, ttl)).ignore();
        }
        let _: () = self.client.query_pipeline(&pipe).await?;

        Ok(SaveOutcome::Done(true))
    }
}

fn set_command(id: &str, json: &str, ttl: Option<u64>) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(id).arg(json);
    if let Some(secs) = ttl {
        cmd.arg("EX").arg(secs);
    }
    cmd
}

/// Escape glob metacharacters for SCAN MATCH.
fn escape_glob(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn fetch_many(&self, ids: &[String]) -> CacheResult<Fetched> {
        Ok(self.fetch(ids).await?)
    }

    async fn has(&self, id: &str) -> CacheResult<bool> {
        let count: u64 = self
            .client
            .query(redis::cmd("EXISTS").arg(id))
            .await?;
        Ok(count > 0)
    }

    async fn clear_namespace(&self, namespace: &str) -> CacheResult<bool> {
        Ok(self.clear(namespace).await?)
    }

    async fn delete_many(&self, ids: &[String]) -> CacheResult<bool> {
        self.delete(ids).await?;
        Ok(true)
    }

    async fn save_many(
        &self,
        values: Vec<(String, Value)>,
        lifetime: Option<Duration>,
    ) -> CacheResult<SaveOutcome> {
        Ok(self.save(values, lifetime).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("app."), "app.");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn test_set_command() {
        let persistent = set_command("k", "1", None);
        assert_eq!(persistent.args_iter().count(), 3);

        let expiring = set_command("k", "1", Some(60));
        assert_eq!(expiring.args_iter().count(), 5);
    }
}
