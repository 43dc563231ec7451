//! Environment variable helpers.

use std::env as std_env;

/// Get an environment variable by name.
pub fn get(key: &str) -> Option<String> {
    std_env::var(key).ok()
}

/// True when the variable is set to "1" or "true" (case-insensitive).
pub fn flag(key: &str) -> bool {
    match std_env::var(key) {
        Ok(v) => v == "1" || v.eq_ignore_ascii_case("true"),
        Err(_) => false,
    }
}

/// Parse a numeric environment variable, falling back on absence or garbage.
pub fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std_env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
