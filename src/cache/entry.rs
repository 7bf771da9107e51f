//! Cache Entry Module
//!
//! Defines the structure for individual memory-tier entries.

use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with value and access metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Most recent read or write (Unix milliseconds), never before `created_at`
    pub last_accessed: u64,
    /// Approximate size of the value in bytes (serialized JSON length)
    pub size_estimate: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    pub fn new(value: Value) -> Self {
        let now = current_timestamp_ms();
        let size_estimate = estimate_size(&value);

        Self {
            value,
            created_at: now,
            last_accessed: now,
            size_estimate,
        }
    }

    // == Touch ==
    /// Records a read. Clamped so that `last_accessed >= created_at` survives
    /// wall-clock steps backwards.
    pub fn touch(&mut self) {
        self.last_accessed = current_timestamp_ms().max(self.created_at);
    }

    // == Replace ==
    /// Overwrites the value in place, keeping `created_at`.
    pub fn replace(&mut self, value: Value) {
        self.size_estimate = estimate_size(&value);
        self.value = value;
        self.touch();
    }

    /// Milliseconds since the last read or write.
    pub fn idle_ms(&self) -> u64 {
        current_timestamp_ms().saturating_sub(self.last_accessed)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Returns current Unix timestamp in fractional seconds.
pub fn current_timestamp_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Serialized length of a JSON value; 0 if it cannot be measured.
pub fn estimate_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}
