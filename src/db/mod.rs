//! SQLite persistence for the disk tier
//!
//! - [`pool`]: bounded connection pool (r2d2 + rusqlite, WAL)
//! - [`disk`]: the `cache_entries` table with TTL expiry

mod disk;
mod pool;

pub use disk::DiskTier;
pub use pool::{ConnectionPool, PoolConnection, PoolStatus};
