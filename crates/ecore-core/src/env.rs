//! Environment variable utilities
//!
//! Typed lookups with defaults, used by the runtime configuration layer.
//!
//! # Usage
//!
//! ```ignore
//! use ecore_core::env::{env_get, env_get_bool, env_get_size};
//!
//! let capacity: usize = env_get("ECORE_QUEUE_CAPACITY", 0);
//! let scope = env_get_bool("ECORE_THREAD_SIGNAL_SCOPE", false);
//! let stack = env_get_size("ECORE_THREAD_STACK_SIZE", 0); // accepts "512k", "8M"
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Unset and unparsable values both yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true. Any other
/// set value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_bool(&val),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
///
/// `Some(T)` if the variable is set and parses successfully.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get a byte size, accepting an optional k/m/g suffix (powers of 1024)
pub fn env_get_size(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_size(&v))
        .unwrap_or(default)
}

/// Check if environment variable is set (regardless of value)
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

pub(crate) fn parse_bool(val: &str) -> bool {
    matches!(
        val.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse "4096", "64k", "8M", "1g"
pub fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    let (digits, shift) = match val.chars().last()? {
        'k' | 'K' => (&val[..val.len() - 1], 10),
        'm' | 'M' => (&val[..val.len() - 1], 20),
        'g' | 'G' => (&val[..val.len() - 1], 30),
        _ => (val, 0),
    };
    let n: usize = digits.trim().parse().ok()?;
    n.checked_mul(1usize << shift)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__ECORE_TEST_UNSET_VAR__", 42);
        assert_eq!(val, 42);
        assert!(!env_get_bool("__ECORE_TEST_UNSET_VAR__", false));
        assert!(env_get_bool("__ECORE_TEST_UNSET_VAR__", true));
        assert!(env_get_opt::<usize>("__ECORE_TEST_UNSET_VAR__").is_none());
        assert!(!env_is_set("__ECORE_TEST_UNSET_VAR__"));
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__ECORE_TEST_NUM__", " 123 ");
        let val: usize = env_get("__ECORE_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__ECORE_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__ECORE_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__ECORE_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__ECORE_TEST_INVALID__");
    }

    #[test]
    fn test_parse_bool() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            assert!(parse_bool(v), "{}", v);
        }
        for v in ["0", "false", "garbage", ""] {
            assert!(!parse_bool(v), "{}", v);
        }
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("64k"), Some(64 * 1024));
        assert_eq!(parse_size("8M"), Some(8 * 1024 * 1024));
        assert_eq!(parse_size("1g"), Some(1 << 30));
        assert_eq!(parse_size("k"), None);
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("12x"), None);
    }

    #[test]
    fn test_env_get_size() {
        std::env::set_var("__ECORE_TEST_SIZE__", "256k");
        assert_eq!(env_get_size("__ECORE_TEST_SIZE__", 0), 256 * 1024);
        std::env::remove_var("__ECORE_TEST_SIZE__");
        assert_eq!(env_get_size("__ECORE_TEST_SIZE__", 7), 7);
    }
}
