//! Memory Tier Module
//!
//! Bounded in-process store with least-recently-used eviction.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Memory Tier ==
/// Fixed-capacity LRU map from key to [`CacheEntry`].
///
/// Every operation, reads included, takes the internal mutex: a read moves the
/// entry to the most-recently-used position, so it is a writer as far as the
/// ordering is concerned. `get` and `put` are O(1).
///
/// Every caller-initiated mutation (`put`, `invalidate`, `clear`) advances a
/// write epoch. [`MemoryTier::promote`] inserts only when the epoch has not
/// moved since the caller's snapshot, so a value read from disk before a
/// concurrent write can never shadow that write.
#[derive(Debug)]
pub struct MemoryTier {
    state: Mutex<MemoryState>,
}

#[derive(Debug)]
struct MemoryState {
    entries: LruCache<String, CacheEntry>,
    evictions: u64,
    bytes: usize,
    epoch: u64,
}

impl MemoryState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.bytes = self.bytes.saturating_sub(entry.size_estimate);
        Some(entry)
    }

    /// Inserts a key known to be absent; returns the LRU victim, if any.
    fn insert_new(&mut self, key: &str, value: Value) -> Option<String> {
        let entry = CacheEntry::new(value);
        self.bytes += entry.size_estimate;

        let (evicted_key, evicted) = self.entries.push(key.to_string(), entry)?;
        self.bytes = self.bytes.saturating_sub(evicted.size_estimate);
        self.evictions += 1;
        trace!(evicted = %evicted_key, "memory tier evicted least recently used entry");
        Some(evicted_key)
    }
}

impl MemoryTier {
    // == Constructor ==
    /// Creates an empty tier holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            CacheError::InvalidConfig("memory capacity must be at least 1".to_string())
        })?;

        Ok(Self {
            state: Mutex::new(MemoryState {
                entries: LruCache::new(capacity),
                evictions: 0,
                bytes: 0,
                epoch: 0,
            }),
        })
    }

    // == Get ==
    /// Returns the value and marks the key most recently used.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(key)?;
        trace!(key, idle_ms = entry.idle_ms(), "memory tier hit");
        entry.touch();
        Some(entry.value.clone())
    }

    // == Put ==
    /// Inserts or overwrites `key` at the most-recently-used position.
    ///
    /// When a new key arrives at capacity, the least recently used entry is
    /// evicted first and its key returned.
    pub fn put(&self, key: &str, value: Value) -> Option<String> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.epoch += 1;

        if let Some(entry) = state.entries.get_mut(key) {
            let old_size = entry.size_estimate;
            entry.replace(value);
            let new_size = entry.size_estimate;
            state.bytes = state.bytes.saturating_sub(old_size) + new_size;
            return None;
        }

        state.insert_new(key, value)
    }

    // == Promote ==
    /// Current write epoch. Snapshot it before reading the slower tier and
    /// hand it to [`MemoryTier::promote`].
    pub fn write_epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Inserts a value fetched from the slower tier, unless `key` is already
    /// present or any write happened after `epoch` was taken.
    ///
    /// Returns whether the value was inserted.
    pub fn promote(&self, key: &str, value: Value, epoch: u64) -> bool {
        let mut state = self.state.lock();
        if state.epoch != epoch || state.entries.contains(key) {
            trace!(key, "skipped promotion after concurrent write");
            return false;
        }
        state.insert_new(key, value);
        true
    }

    // == Invalidate ==
    /// Removes `key`; returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.remove(key).is_some()
    }

    // == Clear ==
    /// Removes all entries. The eviction counter is left alone.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.entries.clear();
        state.bytes = 0;
    }

    /// Zeroes the eviction counter.
    pub fn reset_stats(&self) {
        self.state.lock().evictions = 0;
    }

    /// Checks presence without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Copy of the entry without touching recency.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().entries.peek(key).cloned()
    }

    /// Keys from most to least recently used.
    pub fn keys_mru(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }

    /// Number of LRU evictions since creation or the last reset.
    pub fn evictions(&self) -> u64 {
        self.state.lock().evictions
    }

    /// Sum of the entries' size estimates.
    pub fn bytes(&self) -> usize {
        self.state.lock().bytes
    }
}
