//! Configuration Module
//!
//! Handles loading and validating cache configuration. The composing component
//! builds a [`Config`] (usually via [`Config::from_env`]) and hands it to
//! [`TieredCache::open`](crate::cache::TieredCache::open); the cache types never
//! read the environment themselves.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Longest accepted pool acquire timeout, in seconds.
pub const MAX_POOL_TIMEOUT_SECS: f64 = 3600.0;

// == Expiry Policy ==
/// How the disk tier measures an entry's age against its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Age is measured from the last successful read or write
    #[default]
    Sliding,
    /// Age is measured from the last write
    Absolute,
}

impl FromStr for ExpiryPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sliding" => Ok(Self::Sliding),
            "absolute" => Ok(Self::Absolute),
            other => Err(format!("unknown expiry policy '{}'", other)),
        }
    }
}

impl fmt::Display for ExpiryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sliding => f.write_str("sliding"),
            Self::Absolute => f.write_str("absolute"),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries held in the memory tier
    pub memory_capacity: usize,
    /// Path of the SQLite file backing the disk tier
    pub disk_path: PathBuf,
    /// Expiry window for disk entries, in seconds
    pub disk_ttl_seconds: u64,
    /// Whether the TTL slides on reads or is anchored at write time
    pub expiry_policy: ExpiryPolicy,
    /// Maximum number of pooled SQLite connections
    pub pool_max_connections: u32,
    /// How long `acquire` waits for a free connection, in seconds
    pub pool_timeout_seconds: f64,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Fail startup instead of degrading to memory-only when the disk is unusable
    pub require_disk: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MEMORY_CAPACITY` - Memory tier entries (default: 1000)
    /// - `CACHE_DISK_PATH` - SQLite file (default: .cache/llm_cache.db)
    /// - `CACHE_DISK_TTL` - Disk TTL in seconds (default: 86400)
    /// - `CACHE_EXPIRY_POLICY` - `sliding` or `absolute` (default: sliding)
    /// - `CACHE_POOL_MAX_CONNECTIONS` - Pool size (default: 4)
    /// - `CACHE_POOL_TIMEOUT` - Acquire timeout in seconds (default: 5.0)
    /// - `CACHE_CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 300)
    /// - `CACHE_REQUIRE_DISK` - `true` to refuse memory-only mode (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            memory_capacity: env_or("CACHE_MEMORY_CAPACITY", defaults.memory_capacity),
            disk_path: env::var("CACHE_DISK_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.disk_path),
            disk_ttl_seconds: env_or("CACHE_DISK_TTL", defaults.disk_ttl_seconds),
            expiry_policy: env_or("CACHE_EXPIRY_POLICY", defaults.expiry_policy),
            pool_max_connections: env_or(
                "CACHE_POOL_MAX_CONNECTIONS",
                defaults.pool_max_connections,
            ),
            pool_timeout_seconds: env_or("CACHE_POOL_TIMEOUT", defaults.pool_timeout_seconds),
            cleanup_interval: env_or("CACHE_CLEANUP_INTERVAL", defaults.cleanup_interval),
            require_disk: env_or("CACHE_REQUIRE_DISK", defaults.require_disk),
        }
    }

    // == Validate ==
    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.memory_capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "memory_capacity must be at least 1".to_string(),
            ));
        }
        if self.disk_ttl_seconds == 0 {
            return Err(CacheError::InvalidConfig(
                "disk_ttl_seconds must be at least 1".to_string(),
            ));
        }
        if self.pool_max_connections == 0 {
            return Err(CacheError::InvalidConfig(
                "pool_max_connections must be at least 1".to_string(),
            ));
        }
        let timeout = self.pool_timeout_seconds;
        if !(timeout > 0.0 && timeout <= MAX_POOL_TIMEOUT_SECS)
            || Duration::try_from_secs_f64(timeout).is_err()
        {
            return Err(CacheError::InvalidConfig(format!(
                "pool_timeout_seconds must be in (0, {}], got {}",
                MAX_POOL_TIMEOUT_SECS, timeout
            )));
        }
        Ok(())
    }

    /// Disk TTL as a `Duration`.
    pub fn disk_ttl(&self) -> Duration {
        Duration::from_secs(self.disk_ttl_seconds)
    }

    /// Pool acquire timeout as a `Duration`.
    ///
    /// Out-of-range values are clamped; [`Config::validate`] rejects them.
    pub fn pool_timeout(&self) -> Duration {
        let seconds = self.pool_timeout_seconds.clamp(0.0, MAX_POOL_TIMEOUT_SECS);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_capacity: 1000,
            disk_path: PathBuf::from(".cache/llm_cache.db"),
            disk_ttl_seconds: 86_400,
            expiry_policy: ExpiryPolicy::Sliding,
            pool_max_connections: 4,
            pool_timeout_seconds: 5.0,
            cleanup_interval: 300,
            require_disk: false,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
