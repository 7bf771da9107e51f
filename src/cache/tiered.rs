//! Tiered Cache Module
//!
//! The facade callers use: a [`MemoryTier`] in front of an optional
//! [`DiskTier`], with promotion, statistics and graceful degradation.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::stats::hit_rate;
use crate::cache::{CacheStats, MemoryTier, StatsSnapshot};
use crate::config::Config;
use crate::db::DiskTier;
use crate::error::{CacheError, DiskError, Result};

// == Tiered Cache ==
/// Two-tier cache handle. Clones share the same tiers and counters.
///
/// Per-call operations never fail: disk problems are logged, counted in
/// `disk_errors`, and degrade to a miss (reads) or a memory-only write.
///
/// # Example
/// ```ignore
/// let cache = TieredCache::open(&Config::from_env()).await?;
/// cache.put("answer", &42).await;
/// assert_eq!(cache.get::<i32>("answer").await, Some(42));
/// ```
#[derive(Debug, Clone)]
pub struct TieredCache {
    inner: Arc<Inner>,
}

/// Tier that answered a lookup.
#[derive(Debug, Clone, Copy)]
enum Tier {
    Memory,
    Disk,
}

#[derive(Debug)]
struct Inner {
    memory: MemoryTier,
    disk: Option<DiskTier>,
    stats: CacheStats,
}

impl TieredCache {
    // == Open ==
    /// Builds both tiers from `config`.
    ///
    /// If the disk tier cannot be opened the cache runs memory-only, unless
    /// `config.require_disk` is set, in which case the error is returned.
    pub async fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let memory = MemoryTier::new(config.memory_capacity)?;

        let disk = match DiskTier::open(
            &config.disk_path,
            config.pool_max_connections,
            config.pool_timeout(),
            config.disk_ttl(),
            config.expiry_policy,
        )
        .await
        {
            Ok(disk) => Some(disk),
            Err(e) if config.require_disk => return Err(CacheError::DiskRequired(e)),
            Err(e) => {
                warn!("disk tier unavailable, running memory-only: {}", e);
                None
            }
        };

        info!(
            memory_capacity = config.memory_capacity,
            disk = disk.is_some(),
            "tiered cache ready"
        );
        Ok(Self::with_tiers(memory, disk))
    }

    /// Memory-only cache with no persistence.
    pub fn memory_only(capacity: usize) -> Result<Self> {
        Ok(Self::with_tiers(MemoryTier::new(capacity)?, None))
    }

    /// Assembles a cache from already-built tiers.
    pub fn with_tiers(memory: MemoryTier, disk: Option<DiskTier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory,
                disk,
                stats: CacheStats::new(),
            }),
        }
    }

    // == Get ==
    /// Looks `key` up in memory, then on disk, promoting disk hits.
    ///
    /// A stored value that does not decode as `T` is reported absent and
    /// counted as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some((value, tier)) = self.lookup(key).await else {
            self.inner.stats.record_miss();
            return None;
        };

        match serde_json::from_value(value) {
            Ok(decoded) => {
                self.record_hit(tier);
                Some(decoded)
            }
            Err(e) => {
                warn!(key, "cached value has unexpected shape: {}", e);
                self.inner.stats.record_miss();
                None
            }
        }
    }

    /// Like [`TieredCache::get`] but returns the raw JSON value.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        match self.lookup(key).await {
            Some((value, tier)) => {
                self.record_hit(tier);
                Some(value)
            }
            None => {
                self.inner.stats.record_miss();
                None
            }
        }
    }

    async fn lookup(&self, key: &str) -> Option<(Value, Tier)> {
        let inner = &self.inner;

        if let Some(value) = inner.memory.get(key) {
            return Some((value, Tier::Memory));
        }
        let disk = inner.disk.as_ref()?;

        // Writers touch memory after disk, so any write that lands between
        // this snapshot and the promotion moves the epoch
        let epoch = inner.memory.write_epoch();
        match disk.get(key).await {
            Ok(Some(value)) => {
                if inner.memory.promote(key, value.clone(), epoch) {
                    debug!(key, "promoted disk hit into memory");
                }
                Some((value, Tier::Disk))
            }
            Ok(None) => None,
            Err(e) => {
                self.absorb("get", key, e);
                None
            }
        }
    }

    fn record_hit(&self, tier: Tier) {
        match tier {
            Tier::Memory => self.inner.stats.record_memory_hit(),
            Tier::Disk => self.inner.stats.record_disk_hit(),
        }
    }

    // == Put ==
    /// Stores `value` in both tiers.
    ///
    /// Values that cannot be serialized are skipped with a warning.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.put_value(key, value).await,
            Err(e) => warn!(key, "value not cacheable: {}", e),
        }
    }

    /// Like [`TieredCache::put`] for an already-encoded JSON value.
    pub async fn put_value(&self, key: &str, value: Value) {
        let inner = &self.inner;
        inner.stats.record_write();

        if let Some(disk) = &inner.disk {
            if let Err(e) = disk.put(key, &value).await {
                self.absorb("put", key, e);
            }
        }
        // Memory last; `lookup` relies on this order
        inner.memory.put(key, value);
    }

    // == Invalidate ==
    /// Removes `key` from both tiers, disk first.
    pub async fn invalidate(&self, key: &str) {
        if let Some(disk) = &self.inner.disk {
            if let Err(e) = disk.delete(key).await {
                self.absorb("invalidate", key, e);
            }
        }
        self.inner.memory.invalidate(key);
    }

    // == Clear ==
    /// Empties both tiers and zeroes every counter.
    pub async fn clear(&self) {
        if let Some(disk) = &self.inner.disk {
            if let Err(e) = disk.clear().await {
                self.absorb("clear", "*", e);
            }
        }
        self.inner.memory.clear();
        self.reset_stats();
    }

    /// Zeroes the counters without touching stored entries.
    pub fn reset_stats(&self) {
        self.inner.stats.reset();
        self.inner.memory.reset_stats();
    }

    // == Stats ==
    /// Point-in-time snapshot. Does not count as a lookup.
    pub async fn stats(&self) -> StatsSnapshot {
        let inner = &self.inner;

        let disk_size = match &inner.disk {
            Some(disk) => match disk.len().await {
                Ok(len) => Some(len),
                Err(e) => {
                    debug!("disk size unavailable: {}", e);
                    None
                }
            },
            None => None,
        };

        let counters = inner.stats.counters();
        StatsSnapshot {
            memory_hits: counters.memory_hits,
            disk_hits: counters.disk_hits,
            misses: counters.misses,
            writes: counters.writes,
            evictions: inner.memory.evictions(),
            disk_errors: counters.disk_errors,
            hit_rate: hit_rate(counters.memory_hits, counters.disk_hits, counters.misses),
            memory_size: inner.memory.len(),
            memory_bytes: inner.memory.bytes(),
            disk_size: disk_size.unwrap_or(0),
            disk_available: disk_size.is_some(),
            taken_at: Utc::now(),
        }
    }

    // == Cleanup Expired ==
    /// Purges expired disk rows; returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let Some(disk) = &self.inner.disk else {
            return 0;
        };

        match disk.cleanup_expired().await {
            Ok(removed) => removed,
            Err(e) => {
                self.absorb("cleanup", "*", e);
                0
            }
        }
    }

    // == Get Or Compute ==
    /// Returns the cached value for `key`, or runs `compute`, stores its
    /// result and returns it.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return hit;
        }

        let value = compute().await;
        self.put(key, &value).await;
        value
    }

    /// Fallible variant of [`TieredCache::get_or_compute`]. Errors are
    /// returned and never cached.
    pub async fn try_get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }

        let value = compute().await?;
        self.put(key, &value).await;
        Ok(value)
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.inner.memory
    }

    pub fn disk(&self) -> Option<&DiskTier> {
        self.inner.disk.as_ref()
    }

    /// True when a disk tier exists and its pool is open.
    pub fn is_persistent(&self) -> bool {
        self.inner.disk.as_ref().is_some_and(|disk| !disk.is_closed())
    }

    fn absorb(&self, operation: &str, key: &str, error: DiskError) {
        self.inner.stats.record_disk_error();
        warn!(operation, key, "disk tier error absorbed: {}", error);
    }
}
