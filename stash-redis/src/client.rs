//! Redis client handle: single node through a bb8 pool, or a cluster.

use crate::config::ConnectionOptions;
use crate::dsn::parse_dsn_with;
use crate::{RedisError, Result};
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{Cmd, FromRedisValue, Pipeline};
use std::future::Future;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Type alias for the connection pool.
pub type RedisPool = Pool<RedisConnectionManager>;

enum Topology {
    Single(RedisPool),
    Cluster {
        client: ClusterClient,
        connection: OnceCell<ClusterConnection>,
    },
}

/// A configured Redis client.
///
/// Creating a client never touches the network: connections are opened on
/// first use, with the configured connect timeout, and retried
/// `max_retries` times `retry_delay()` apart.
pub struct RedisClient {
    options: ConnectionOptions,
    topology: Topology,
}

impl RedisClient {
    /// Create a client from options.
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        let urls = options.connection_urls()?;

        let topology = if options.cluster {
            let client = ClusterClient::builder(urls)
                .retries(options.max_retries)
                .build()
                .map_err(|e| RedisError::InvalidArgument(e.to_string()))?;

            Topology::Cluster {
                client,
                connection: OnceCell::new(),
            }
        } else {
            // Extra hosts are only meaningful to a cluster.
            let manager = RedisConnectionManager::new(urls[0].as_str())
                .map_err(|e| RedisError::InvalidArgument(e.to_string()))?;

            let pool = Pool::builder()
                .max_size(options.pool_size)
                .connection_timeout(options.timeout)
                .build_unchecked(manager);

            Topology::Single(pool)
        };

        info!(
            cluster = options.cluster,
            hosts = options.hosts.len(),
            "Redis client configured"
        );

        Ok(Self { options, topology })
    }

    /// Create a client from a DSN, over `options` for whatever the DSN
    /// leaves out. See [`parse_dsn`](crate::parse_dsn) for the grammar.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use stash_redis::{ConnectionOptions, RedisClient};
    ///
    /// # fn example() -> stash_redis::Result<()> {
    /// let client = RedisClient::create_connection(
    ///     "redis://secret@localhost:6379/2?timeout=3",
    ///     ConnectionOptions::default(),
    /// )?;
    /// assert!(!client.is_cluster());
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_connection(dsn: &str, options: ConnectionOptions) -> Result<Self> {
        Self::new(parse_dsn_with(dsn, options)?)
    }

    /// Get the options.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Whether this client talks to a cluster.
    pub fn is_cluster(&self) -> bool {
        matches!(self.topology, Topology::Cluster { .. })
    }

    /// Run a command.
    pub async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        match &self.topology {
            Topology::Single(pool) => {
                let mut conn = self.pooled(pool).await?;
                Ok(cmd.query_async(&mut *conn).await?)
            }
            Topology::Cluster { client, connection } => {
                let mut conn = self.cluster(client, connection).await?;
                Ok(cmd.query_async(&mut conn).await?)
            }
        }
    }

    /// Run a pipeline.
    pub async fn query_pipeline<T: FromRedisValue>(&self, pipe: &Pipeline) -> Result<T> {
        match &self.topology {
            Topology::Single(pool) => {
                let mut conn = self.pooled(pool).await?;
                Ok(pipe.query_async(&mut *conn).await?)
            }
            Topology::Cluster { client, connection } => {
                let mut conn = self.cluster(client, connection).await?;
                Ok(pipe.query_async(&mut conn).await?)
            }
        }
    }

    /// Check if the server answers.
    pub async fn health_check(&self) -> Result<()> {
        let _: String = self.query(&redis::cmd("PING")).await?;
        Ok(())
    }

    async fn pooled<'a>(
        &self,
        pool: &'a RedisPool,
    ) -> Result<PooledConnection<'a, RedisConnectionManager>> {
        self.with_retry(move || async move { Ok(pool.get().await?) })
            .await
    }

    async fn cluster(
        &self,
        client: &ClusterClient,
        connection: &OnceCell<ClusterConnection>,
    ) -> Result<ClusterConnection> {
        let conn = connection
            .get_or_try_init(|| {
                self.with_retry(move || async move {
                    Ok(client.get_async_connection().await?)
                })
            })
            .await?;
        Ok(conn.clone())
    }

    /// Run `connect` with the connect timeout, retrying retryable failures.
    async fn with_retry<T, F, Fut>(&self, mut connect: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let error = match tokio::time::timeout(self.options.timeout, connect()).await {
                Ok(Ok(conn)) => return Ok(conn),
                Ok(Err(e)) => e,
                Err(_) => RedisError::Timeout,
            };

            if attempt >= self.options.max_retries || !error.is_retryable() {
                return Err(error);
            }
            attempt += 1;

            debug!(attempt, error = %error, "Redis connection failed, retrying");
            tokio::time::sleep(self.options.retry_delay()).await;
        }
    }
}
