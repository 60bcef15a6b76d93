//! Namespace versioning and physical id derivation.
//!
//! A physical id is `namespace + version + key`. Clearing a versioned
//! namespace only writes a new version token under `"@" + namespace`; every
//! id derived afterwards carries the new token, so older entries become
//! unreachable without being enumerated.

use crate::backend::CacheBackend;
use crate::error::CacheResult;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Token used when the backend holds no version entry yet.
pub const DEFAULT_VERSION: &str = "1:";

/// Appended to the numeric part of every generated token.
pub const VERSION_SEPARATOR: char = ':';

/// Hashed keys never get shorter than this (128 bits of digest).
pub const MIN_DIGEST_CHARS: usize = 22;

/// Versioning state of a pool's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceVersion {
    /// No versioning; `clear` relies on the backend alone.
    Disabled,
    /// Versioning enabled, token not fetched yet.
    Unresolved,
    /// Memoized token appended to every id.
    Resolved(String),
}

impl NamespaceVersion {
    /// Whether versioning is on, resolved or not.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// A pool's namespace together with its memoized version.
#[derive(Debug)]
pub(crate) struct Namespace {
    prefix: String,
    version: Mutex<NamespaceVersion>,
}

impl Namespace {
    pub(crate) fn new(prefix: impl Into<String>, versioning: bool) -> Self {
        let version = if versioning {
            NamespaceVersion::Unresolved
        } else {
            NamespaceVersion::Disabled
        };

        Self {
            prefix: prefix.into(),
            version: Mutex::new(version),
        }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Id under which the version token is stored.
    pub(crate) fn version_id(&self) -> String {
        format!("@{}", self.prefix)
    }

    pub(crate) fn state(&self) -> NamespaceVersion {
        self.version.lock().clone()
    }

    /// Switch versioning on (back to unresolved) or off. Returns whether it
    /// was on before. The memoized token is dropped either way.
    pub(crate) fn set_versioning(&self, enable: bool) -> bool {
        let mut version = self.version.lock();
        let was_enabled = version.is_enabled();
        *version = if enable {
            NamespaceVersion::Unresolved
        } else {
            NamespaceVersion::Disabled
        };
        was_enabled
    }

    /// Memoize `token` unless versioning was switched off meanwhile.
    fn adopt(&self, token: &str) {
        let mut version = self.version.lock();
        if version.is_enabled() {
            *version = NamespaceVersion::Resolved(token.to_string());
        }
    }

    fn forget(&self) {
        let mut version = self.version.lock();
        if version.is_enabled() {
            *version = NamespaceVersion::Unresolved;
        }
    }

    /// Current token, fetching it from the backend when unresolved.
    ///
    /// A failed fetch leaves the state unresolved so the next call retries.
    pub(crate) async fn resolve<B: CacheBackend + ?Sized>(
        &self,
        backend: &B,
    ) -> CacheResult<Option<String>> {
        match self.state() {
            NamespaceVersion::Disabled => Ok(None),
            NamespaceVersion::Resolved(token) => Ok(Some(token)),
            NamespaceVersion::Unresolved => {
                let token = self
                    .fetch_token(backend)
                    .await?
                    .unwrap_or_else(|| DEFAULT_VERSION.to_string());
                self.adopt(&token);
                Ok(Some(token))
            }
        }
    }

    /// Write the next version token. Returns whether the backend stored it.
    ///
    /// The counter continues from the higher of the stored and the memoized
    /// token, so a version entry lost to a backend clear never hands out the
    /// same token twice. The new token is memoized before the write, so this
    /// pool stops seeing old entries even when the write fails.
    pub(crate) async fn bump<B: CacheBackend + ?Sized>(&self, backend: &B) -> CacheResult<bool> {
        let stored = match self.fetch_token(backend).await {
            Ok(token) => token.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            Err(e) => {
                self.forget();
                return Err(e);
            }
        };

        let current = match self.state() {
            NamespaceVersion::Resolved(memoized) if counter(&memoized) > counter(&stored) => {
                memoized
            }
            _ => stored,
        };

        let next = next_version(&current);
        self.adopt(&next);
        self.store(backend, next).await
    }

    /// Write the memoized token back. `Ok(false)` when nothing is memoized.
    pub(crate) async fn restore<B: CacheBackend + ?Sized>(&self, backend: &B) -> CacheResult<bool> {
        match self.state() {
            NamespaceVersion::Resolved(token) => self.store(backend, token).await,
            _ => Ok(false),
        }
    }

    /// Whether clearing this namespace in the backend also removes its
    /// version entry (`""` and namespaces of `@` only).
    pub(crate) fn clear_removes_version(&self) -> bool {
        self.version_id().starts_with(&self.prefix)
    }

    async fn store<B: CacheBackend + ?Sized>(&self, backend: &B, token: String) -> CacheResult<bool> {
        let outcome = backend
            .save_many(vec![(self.version_id(), Value::String(token))], None)
            .await?;
        Ok(outcome.is_success())
    }

    async fn fetch_token<B: CacheBackend + ?Sized>(
        &self,
        backend: &B,
    ) -> CacheResult<Option<String>> {
        let version_id = self.version_id();
        let fetched = backend.fetch_many(std::slice::from_ref(&version_id)).await?;

        Ok(fetched
            .into_iter()
            .find(|(id, _)| *id == version_id)
            .map(|(_, value)| token_from_value(value)))
    }

    /// Physical id for an already validated key.
    pub(crate) fn physical_id(
        &self,
        key: &str,
        version: Option<&str>,
        max_length: Option<usize>,
    ) -> String {
        let version = version.unwrap_or("");
        let id = format!("{}{}{}", self.prefix, version, key);

        match max_length {
            Some(max) if id.len() > max => {
                let budget = max.saturating_sub(self.prefix.len() + version.len());
                let digest = hash_key(key, budget.max(MIN_DIGEST_CHARS));
                format!("{}{}{}", self.prefix, version, digest)
            }
            _ => id,
        }
    }
}

/// SHA-256 of `key`, URL-safe base64 without padding, cut to `chars`.
pub(crate) fn hash_key(key: &str, chars: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let mut encoded = URL_SAFE_NO_PAD.encode(hasher.finalize());
    encoded.truncate(chars);
    encoded
}

/// Token following `current`. The leading decimal digits are the counter;
/// a token without them counts as zero.
pub(crate) fn next_version(current: &str) -> String {
    format!("{}{}", counter(current).saturating_add(1), VERSION_SEPARATOR)
}

fn counter(token: &str) -> u64 {
    let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn token_from_value(value: Value) -> String {
    match value {
        Value::String(token) => token,
        other => other.to_string(),
    }
}
