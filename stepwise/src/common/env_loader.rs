//! Environment variable loading utilities
//!
//! Typed lookups with fallback defaults, scoped under a common prefix.

use std::env;
use std::str::FromStr;

/// Load an environment variable with type conversion and default
pub fn load_env_parsed<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load a comma separated list, trimming entries and dropping empty ones
pub fn load_env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => {
            let items: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect();
            if items.is_empty() {
                default.iter().map(|s| s.to_string()).collect()
            } else {
                items
            }
        }
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Builder for loading multiple environment variables with consistent prefix
#[derive(Debug)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a new environment loader with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    /// Load a string value with default
    pub fn load_string(&self, suffix: &str, default: &str) -> String {
        env::var(self.key(suffix)).unwrap_or_else(|_| default.to_string())
    }

    /// Load a parsed value with default
    pub fn load_parsed<T>(&self, suffix: &str, default: T) -> T
    where
        T: FromStr,
    {
        load_env_parsed(&self.key(suffix), default)
    }

    /// Load a parsed value, falling back to the default when the validator rejects it
    pub fn load_validated<T, F>(&self, suffix: &str, default: T, validator: F) -> T
    where
        T: FromStr + Clone,
        F: Fn(&T) -> bool,
    {
        let value = self.load_parsed(suffix, default.clone());
        if validator(&value) {
            value
        } else {
            default
        }
    }

    /// Load a comma separated list with default
    pub fn load_list(&self, suffix: &str, default: &[&str]) -> Vec<String> {
        load_env_list(&self.key(suffix), default)
    }
}
