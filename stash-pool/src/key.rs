//! Logical key validation.

use crate::error::{CacheError, CacheResult};

/// Characters a logical key may not contain.
pub const RESERVED_CHARACTERS: &str = "{}()/\\@:";

/// Upper bound on a logical key, in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// Check a logical key against the reserved-character and length rules.
///
/// # Examples
///
/// ```
/// use stash_pool::key::validate_key;
///
/// assert!(validate_key("user.42").is_ok());
/// assert!(validate_key("user:42").is_err());
/// assert!(validate_key("").is_err());
/// ```
pub fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey(
            "Cache key length must be greater than zero".to_string(),
        ));
    }

    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "Cache key is {} bytes long, the maximum is {}",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }

    match key.chars().find(|c| RESERVED_CHARACTERS.contains(*c)) {
        Some(c) => Err(CacheError::InvalidKey(format!(
            "Cache key \"{}\" contains reserved character \"{}\" (reserved: {})",
            key, c, RESERVED_CHARACTERS
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_keys() {
        for key in ["a", "user.123", "session_abc-DEF", "ключ", "a b"] {
            assert!(validate_key(key).is_ok(), "{key} should be valid");
        }
    }

    #[test]
    fn test_rejects_every_reserved_character() {
        for c in RESERVED_CHARACTERS.chars() {
            let key = format!("user{}1", c);
            let err = validate_key(&key).unwrap_err();
            assert!(matches!(err, CacheError::InvalidKey(_)));
        }
    }

    #[test]
    fn test_rejects_empty_key() {
        assert!(matches!(validate_key(""), Err(CacheError::InvalidKey(_))));
    }

    #[test]
    fn test_length_bound() {
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH)).is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }
}
