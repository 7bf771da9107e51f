//! TTL Cleanup Task
//!
//! Background task that periodically removes expired disk-tier entries, so
//! reads never have to scan for them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::TieredCache;

/// Spawns a background task that periodically cleans up expired cache entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between cleanup runs. Disk failures are absorbed by the cache and show up
/// in its `disk_errors` counter.
///
/// # Arguments
/// * `cache` - Handle to the cache (clones share state)
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = TieredCache::open(&config).await?;
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), config.cleanup_interval);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: TieredCache, cleanup_interval_secs: u64) -> JoinHandle<()> {
    spawn_cleanup_task_every(cache, Duration::from_secs(cleanup_interval_secs.max(1)))
}

/// Like [`spawn_cleanup_task`] with a sub-second interval.
pub fn spawn_cleanup_task_every(cache: TieredCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let removed = cache.cleanup_expired().await;

            // Log cleanup statistics
            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTier;
    use crate::config::ExpiryPolicy;
    use crate::db::DiskTier;
    use tempfile::TempDir;

    async fn short_ttl_cache(dir: &TempDir, ttl: Duration) -> TieredCache {
        let disk = DiskTier::open(
            dir.path().join("cleanup.db"),
            2,
            Duration::from_secs(1),
            ttl,
            ExpiryPolicy::Sliding,
        )
        .await
        .unwrap();
        TieredCache::with_tiers(MemoryTier::new(16).unwrap(), Some(disk))
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let dir = TempDir::new().unwrap();
        let cache = short_ttl_cache(&dir, Duration::from_millis(200)).await;
        cache.put("expire_soon", &"value").await;

        let handle = spawn_cleanup_task_every(cache.clone(), Duration::from_millis(100));

        // Wait for entry to expire and cleanup to run
        tokio::time::sleep(Duration::from_millis(600)).await;

        let disk_rows = cache.disk().unwrap().len().await.unwrap();
        assert_eq!(disk_rows, 0, "Expired entry should have been cleaned up");

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let dir = TempDir::new().unwrap();
        let cache = short_ttl_cache(&dir, Duration::from_secs(3600)).await;
        cache.put("long_lived", &"value").await;

        let handle = spawn_cleanup_task_every(cache.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(
            cache.disk().unwrap().get("long_lived").await.unwrap(),
            Some(serde_json::json!("value"))
        );

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let cache = TieredCache::memory_only(4).unwrap();

        let handle = spawn_cleanup_task(cache, 1);

        // Abort immediately
        handle.abort();

        // Wait a bit and verify task is finished
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
