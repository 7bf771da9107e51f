//! Tiered Cache - memory + SQLite cache for expensive calls
//!
//! Provides an LRU memory tier backed by a persistent disk tier with sliding
//! TTL expiry, hit-rate statistics and memoization of async computations such
//! as LLM completions.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod tasks;

pub use cache::{memoize, LlmCallKey, Memoized, StatsSnapshot, TieredCache};
pub use config::{Config, ExpiryPolicy};
pub use error::{CacheError, DiskError, PoolError};
pub use tasks::spawn_cleanup_task;
