//! Error types for cache pool operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
///
/// Only `InvalidKey` and `InvalidArgument` ever reach a pool caller. The
/// remaining variants are produced by backend drivers and absorbed by the
/// pool into `false`/miss results.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Malformed logical key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Malformed configuration or connection settings
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by a backend driver primitive
    #[error("Backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Backend operation timeout
    #[error("Operation timeout")]
    Timeout,
}

impl CacheError {
    /// Whether this error came from the storage side and must be recovered
    /// locally rather than propagated.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Timeout)
    }

    /// Shorthand for building a backend error from any displayable cause.
    pub fn backend(cause: impl std::fmt::Display) -> Self {
        Self::Backend(cause.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_classification() {
        assert!(CacheError::backend("connection reset").is_backend());
        assert!(CacheError::Timeout.is_backend());
        assert!(!CacheError::InvalidKey("a:b".into()).is_backend());
        assert!(!CacheError::InvalidArgument("dsn".into()).is_backend());
    }

    #[test]
    fn test_error_display() {
        let err = CacheError::backend("Failed to connect");
        assert_eq!(err.to_string(), "Backend error: Failed to connect");
    }
}
