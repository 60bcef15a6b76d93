//! Pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Prefix scoping every physical id of the pool
    #[serde(default)]
    pub namespace: String,

    /// Lifetime applied to items saved without an explicit expiry, in
    /// seconds. Zero persists until removed.
    #[serde(default)]
    pub default_lifetime_secs: u64,

    /// Start with namespace versioning enabled
    #[serde(default)]
    pub versioning: bool,
}

impl PoolConfig {
    /// Create a configuration for `namespace`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stash_pool::PoolConfig;
    ///
    /// let config = PoolConfig::new("app.")
    ///     .with_default_lifetime(300)
    ///     .with_versioning(true);
    ///
    /// assert_eq!(config.namespace, "app.");
    /// assert!(config.versioning);
    /// ```
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `STASH_NAMESPACE`, `STASH_DEFAULT_LIFETIME` (seconds) and
    /// `STASH_VERSIONING`. Unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(namespace) = std::env::var("STASH_NAMESPACE") {
            config.namespace = namespace;
        }

        if let Ok(lifetime) = std::env::var("STASH_DEFAULT_LIFETIME")
            && let Ok(secs) = lifetime.parse()
        {
            config.default_lifetime_secs = secs;
        }

        if let Ok(versioning) = std::env::var("STASH_VERSIONING") {
            config.versioning = versioning == "1" || versioning.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Set the default lifetime in seconds.
    pub fn with_default_lifetime(mut self, secs: u64) -> Self {
        self.default_lifetime_secs = secs;
        self
    }

    /// Enable or disable versioning.
    pub fn with_versioning(mut self, enabled: bool) -> Self {
        self.versioning = enabled;
        self
    }

    /// Default lifetime as a duration; `None` when items persist.
    pub fn default_lifetime(&self) -> Option<Duration> {
        (self.default_lifetime_secs > 0).then(|| Duration::from_secs(self.default_lifetime_secs))
    }
}
