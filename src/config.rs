//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Initial capacity of the backing map
    pub initial_capacity: usize,
    /// Largest buffer accepted across the boundary, in bytes
    pub max_buffer_len: usize,
    /// Maximum number of simultaneously live pins
    pub max_pins: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CCACHE_LOG` - Log filter (default: "ccache=info")
    /// - `CCACHE_INITIAL_CAPACITY` - Initial map capacity (default: 1024)
    /// - `CCACHE_MAX_BUFFER_LEN` - Largest importable buffer (default: 64 MiB)
    /// - `CCACHE_MAX_PINS` - Live pin limit (default: 4096)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_filter: env::var("CCACHE_LOG").unwrap_or(defaults.log_filter),
            initial_capacity: parse_var("CCACHE_INITIAL_CAPACITY")
                .unwrap_or(defaults.initial_capacity),
            max_buffer_len: parse_var("CCACHE_MAX_BUFFER_LEN").unwrap_or(defaults.max_buffer_len),
            max_pins: parse_var("CCACHE_MAX_PINS").unwrap_or(defaults.max_pins),
        }
    }
}

fn parse_var(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "ccache=info".to_string(),
            initial_capacity: 1024,
            max_buffer_len: 64 * 1024 * 1024,
            max_pins: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log_filter, "ccache=info");
        assert_eq!(config.initial_capacity, 1024);
        assert_eq!(config.max_buffer_len, 64 * 1024 * 1024);
        assert_eq!(config.max_pins, 4096);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CCACHE_LOG");
        env::remove_var("CCACHE_INITIAL_CAPACITY");
        env::remove_var("CCACHE_MAX_BUFFER_LEN");
        env::remove_var("CCACHE_MAX_PINS");

        let config = Config::from_env();
        assert_eq!(config, Config::default());
    }
}
