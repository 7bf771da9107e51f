//! Cache Module
//!
//! Provides a bounded LRU memory tier in front of the SQLite disk tier, the
//! [`TieredCache`] facade that composes them, and memoization helpers.

mod entry;
mod key;
mod memoize;
mod memory;
mod stats;
mod tiered;


// Re-export public types
pub use entry::{current_timestamp_ms, current_timestamp_secs, CacheEntry};
pub use key::{derive_key, LlmCallKey, LLM_NAMESPACE};
pub use memoize::{memoize, Memoized};
pub use memory::MemoryTier;
pub use stats::{CacheStats, CounterValues, StatsSnapshot};
pub use tiered::TieredCache;
