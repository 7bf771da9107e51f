//! Error types for the tiered cache
//!
//! Provides unified error handling using thiserror.
//!
//! Only [`CacheError`] ever leaves the facade, and only at startup. Pool and
//! disk errors are absorbed by [`TieredCache`](crate::cache::TieredCache) and
//! turned into misses or memory-only writes.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// == Pool Error Enum ==
/// Failures of the SQLite connection pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The store could not be opened or configured at startup
    #[error("Failed to open cache store at {}: {reason}", .path.display())]
    Init { path: PathBuf, reason: String },

    /// No connection became free within the pool timeout
    #[error("Timed out after {0:?} waiting for a pooled connection")]
    Timeout(Duration),

    /// The pool was closed
    #[error("Connection pool is closed")]
    Closed,
}

// == Disk Error Enum ==
/// Any operational failure of the disk tier.
#[derive(Error, Debug)]
pub enum DiskError {
    /// No usable connection (timeout, closed pool)
    #[error("Disk tier unavailable: {0}")]
    Unavailable(#[from] PoolError),

    /// SQLite reported an error
    #[error("Disk tier storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A value could not be encoded for storage
    #[error("Disk tier serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking worker running the operation failed
    #[error("Disk tier task failed: {0}")]
    Task(String),
}

// == Cache Error Enum ==
/// Errors the cache facade may surface to its owner.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Disk persistence was required but the store could not be opened
    #[error("Disk persistence required but unavailable: {0}")]
    DiskRequired(#[source] PoolError),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
