//! Configuration Module
//!
//! Handles loading and validating engine configuration from environment
//! variables.
//!
//! Validation is fatal at construction: a misconfigured engine never
//! starts, so no operation ever has to handle a bad capacity or window.

use std::env;
use std::time::Duration;

use serde::Serialize;

use crate::error::{CacheError, Result};

/// Engine configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults.
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfig {
    /// Maximum number of entries across all shards
    pub capacity: usize,
    /// Number of independent shards keys hash into
    pub shards: usize,
    /// Per-entry size budget in bytes
    pub max_entry_size: usize,
    /// Interval between background sweeper passes
    pub sweep_interval: Duration,
    /// Maximum expired entries reclaimed per shard per pass, capping how
    /// long the sweeper holds a shard lock
    pub sweep_batch: usize,
    /// How long a single-flight leader may stay Pending, and how long a
    /// waiter will wait, before the flight is failed
    pub pending_timeout: Duration,
    /// Recomputes admitted per key within the sliding window
    pub recompute_limit: u32,
    /// Trailing window for recompute admission
    pub recompute_window: Duration,
    /// Whether concurrent misses block on an in-flight load (true) or
    /// immediately observe a miss (false)
    pub wait_for_pending: bool,
    /// Use the O(1)-memory two-bucket limiter instead of the exact log
    pub approximate_limiter: bool,
    /// Broadcast buffer size for expiry/eviction events
    pub event_capacity: usize,
}

impl EngineConfig {
    /// Creates a config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum entries (default: 1024)
    /// - `CACHE_SHARDS` - Shard count (default: 8)
    /// - `CACHE_MAX_ENTRY_SIZE` - Per-entry byte budget (default: 1 MiB)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweeper period (default: 1000)
    /// - `CACHE_SWEEP_BATCH` - Reclaim batch per shard (default: 256)
    /// - `CACHE_PENDING_TIMEOUT_MS` - Single-flight deadline (default: 5000)
    /// - `CACHE_RECOMPUTE_LIMIT` - Admissions per window (default: 32)
    /// - `CACHE_RECOMPUTE_WINDOW_MS` - Admission window (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            capacity: env_parse("CACHE_CAPACITY", defaults.capacity),
            shards: env_parse("CACHE_SHARDS", defaults.shards),
            max_entry_size: env_parse("CACHE_MAX_ENTRY_SIZE", defaults.max_entry_size),
            sweep_interval: Duration::from_millis(env_parse(
                "CACHE_SWEEP_INTERVAL_MS",
                defaults.sweep_interval.as_millis() as u64,
            )),
            sweep_batch: env_parse("CACHE_SWEEP_BATCH", defaults.sweep_batch),
            pending_timeout: Duration::from_millis(env_parse(
                "CACHE_PENDING_TIMEOUT_MS",
                defaults.pending_timeout.as_millis() as u64,
            )),
            recompute_limit: env_parse("CACHE_RECOMPUTE_LIMIT", defaults.recompute_limit),
            recompute_window: Duration::from_millis(env_parse(
                "CACHE_RECOMPUTE_WINDOW_MS",
                defaults.recompute_window.as_millis() as u64,
            )),
            ..defaults
        }
    }

    /// Rejects unusable configurations before the engine is built.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(misconfigured("capacity must be positive"));
        }
        if self.shards == 0 {
            return Err(misconfigured("shard count must be positive"));
        }
        if self.capacity < self.shards {
            return Err(misconfigured(
                "capacity must be at least the shard count",
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(misconfigured("sweep interval must be positive"));
        }
        if self.sweep_batch == 0 {
            return Err(misconfigured("sweep batch must be positive"));
        }
        if self.pending_timeout.is_zero() {
            return Err(misconfigured("pending timeout must be positive"));
        }
        if self.recompute_window.is_zero() {
            return Err(misconfigured("recompute window must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(misconfigured("event capacity must be positive"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            shards: 8,
            max_entry_size: 1024 * 1024,
            sweep_interval: Duration::from_millis(1000),
            sweep_batch: 256,
            pending_timeout: Duration::from_millis(5000),
            recompute_limit: 32,
            recompute_window: Duration::from_millis(1000),
            wait_for_pending: true,
            approximate_limiter: false,
            event_capacity: 1024,
        }
    }
}

fn misconfigured(msg: &str) -> CacheError {
    CacheError::CapacityMisconfigured(msg.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.capacity, 1024);
        assert_eq!(config.shards, 8);
        assert_eq!(config.sweep_batch, 256);
        assert!(config.wait_for_pending);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = EngineConfig {
            capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::CapacityMisconfigured(_))
        ));
    }

    #[test]
    fn test_validate_rejects_capacity_below_shards() {
        let config = EngineConfig {
            capacity: 4,
            shards: 8,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let config = EngineConfig {
            recompute_window: Duration::ZERO,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_defaults() {
        env::remove_var("CACHE_CAPACITY");
        env::remove_var("CACHE_SHARDS");
        env::remove_var("CACHE_SWEEP_INTERVAL_MS");

        let config = EngineConfig::from_env();
        assert_eq!(config.capacity, 1024);
        assert_eq!(config.shards, 8);
        assert_eq!(config.sweep_interval, Duration::from_millis(1000));
    }
}
