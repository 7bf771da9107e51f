//! Disk Tier
//!
//! Durable key/value table with TTL expiry on top of [`ConnectionPool`].
//! Values are stored as JSON blobs; times are Unix seconds (REAL).

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::current_timestamp_secs;
use crate::config::ExpiryPolicy;
use crate::db::ConnectionPool;
use crate::error::{DiskError, PoolError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    key           TEXT PRIMARY KEY,
    value         BLOB NOT NULL,
    created_at    REAL NOT NULL,
    last_accessed REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_last_accessed ON cache_entries(last_accessed);
CREATE INDEX IF NOT EXISTS idx_cache_entries_created_at ON cache_entries(created_at);
";

// == Disk Tier ==
/// Persistent half of the cache. Clones share the same pool.
#[derive(Debug, Clone)]
pub struct DiskTier {
    pool: ConnectionPool,
    ttl: Duration,
    policy: ExpiryPolicy,
}

impl DiskTier {
    // == Open ==
    /// Opens (creating if needed) the store at `path` and its schema.
    pub async fn open(
        path: impl AsRef<Path>,
        max_connections: u32,
        timeout: Duration,
        ttl: Duration,
        policy: ExpiryPolicy,
    ) -> Result<Self, PoolError> {
        let path = path.as_ref().to_path_buf();
        let init_path = path.clone();

        let pool = tokio::task::spawn_blocking(move || {
            ConnectionPool::initialize(&init_path, max_connections, timeout)
        })
        .await
        .map_err(|e| PoolError::Init {
            path: path.clone(),
            reason: e.to_string(),
        })??;

        Self::with_pool(pool, ttl, policy)
            .await
            .map_err(|e| PoolError::Init {
                path,
                reason: e.to_string(),
            })
    }

    /// Wraps an existing pool, creating the schema if missing.
    pub async fn with_pool(
        pool: ConnectionPool,
        ttl: Duration,
        policy: ExpiryPolicy,
    ) -> Result<Self, DiskError> {
        pool.with_connection(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        debug!(
            path = %pool.path().display(),
            ttl_secs = ttl.as_secs_f64(),
            policy = %policy,
            "disk tier ready"
        );

        Ok(Self { pool, ttl, policy })
    }

    // == Get ==
    /// Returns the value if present and fresh, refreshing `last_accessed`.
    ///
    /// Expired and undecodable rows are deleted and reported absent.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, DiskError> {
        let key = key.to_string();
        let ttl = self.ttl.as_secs_f64();
        let policy = self.policy;

        self.pool
            .with_connection(move |conn| read_entry(conn, &key, ttl, policy))
            .await
    }

    // == Put ==
    /// Upserts `key`. Overwrites start a fresh lifetime (`created_at = now`).
    pub async fn put(&self, key: &str, value: &Value) -> Result<(), DiskError> {
        let key = key.to_string();
        let blob = serde_json::to_vec(value)?;

        self.pool
            .with_connection(move |conn| {
                let now = current_timestamp_secs();
                conn.execute(
                    "INSERT OR REPLACE INTO cache_entries (key, value, created_at, last_accessed)
                     VALUES (?1, ?2, ?3, ?3)",
                    params![key, blob, now],
                )?;
                Ok(())
            })
            .await
    }

    // == Delete ==
    /// Removes `key`; returns whether a row existed.
    pub async fn delete(&self, key: &str) -> Result<bool, DiskError> {
        let key = key.to_string();

        self.pool
            .with_connection(move |conn| {
                let removed = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                Ok(removed > 0)
            })
            .await
    }

    // == Cleanup Expired ==
    /// Deletes every expired row and returns how many were removed.
    pub async fn cleanup_expired(&self) -> Result<usize, DiskError> {
        let ttl = self.ttl.as_secs_f64();
        let column = anchor_column(self.policy);

        let removed = self
            .pool
            .with_connection(move |conn| {
                let cutoff = current_timestamp_secs() - ttl;
                let sql = format!("DELETE FROM cache_entries WHERE {} < ?1", column);
                Ok(conn.execute(&sql, params![cutoff])?)
            })
            .await?;

        if removed > 0 {
            info!(removed, "disk tier removed expired entries");
        }
        Ok(removed)
    }

    // == Clear ==
    /// Removes every row.
    pub async fn clear(&self) -> Result<(), DiskError> {
        self.pool
            .with_connection(|conn| {
                conn.execute("DELETE FROM cache_entries", [])?;
                Ok(())
            })
            .await
    }

    // == Length ==
    /// Number of stored rows, expired ones included until cleaned up.
    pub async fn len(&self) -> Result<u64, DiskError> {
        self.pool
            .with_connection(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
                Ok(u64::try_from(count).unwrap_or(0))
            })
            .await
    }

    pub async fn is_empty(&self) -> Result<bool, DiskError> {
        Ok(self.len().await? == 0)
    }

    /// Closes the underlying pool; every later operation fails as unavailable.
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        self.pool.path()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }
}

fn anchor_column(policy: ExpiryPolicy) -> &'static str {
    match policy {
        ExpiryPolicy::Sliding => "last_accessed",
        ExpiryPolicy::Absolute => "created_at",
    }
}

fn read_entry(
    conn: &mut Connection,
    key: &str,
    ttl: f64,
    policy: ExpiryPolicy,
) -> Result<Option<Value>, DiskError> {
    let row: Option<(Vec<u8>, f64, f64)> = conn
        .query_row(
            "SELECT value, created_at, last_accessed FROM cache_entries WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((blob, created_at, last_accessed)) = row else {
        return Ok(None);
    };

    let now = current_timestamp_secs();
    let anchor = match policy {
        ExpiryPolicy::Sliding => last_accessed,
        ExpiryPolicy::Absolute => created_at,
    };

    if now - anchor > ttl {
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        debug!(key, "disk entry expired");
        return Ok(None);
    }

    match serde_json::from_slice::<Value>(&blob) {
        Ok(value) => {
            conn.execute(
                "UPDATE cache_entries SET last_accessed = ?2 WHERE key = ?1",
                params![key, now.max(created_at)],
            )?;
            Ok(Some(value))
        }
        Err(e) => {
            warn!(key, "dropping undecodable disk entry: {}", e);
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn temp_disk(ttl: Duration, policy: ExpiryPolicy) -> (TempDir, DiskTier) {
        let dir = TempDir::new().unwrap();
        let disk = DiskTier::open(
            dir.path().join("disk.db"),
            2,
            Duration::from_secs(2),
            ttl,
            policy,
        )
        .await
        .unwrap();
        (dir, disk)
    }

    async fn raw_times(disk: &DiskTier, key: &str) -> Option<(f64, f64)> {
        let key = key.to_string();
        disk.pool()
            .with_connection(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT created_at, last_accessed FROM cache_entries WHERE key = ?1",
                        params![key],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_disk_put_and_get() {
        let (_dir, disk) = temp_disk(Duration::from_secs(60), ExpiryPolicy::Sliding).await;
        let value = json!({"completion": "hello", "tokens": [1, 2, 3], "meta": {"cached": false}});

        disk.put("k", &value).await.unwrap();
        assert_eq!(disk.get("k").await.unwrap(), Some(value));
        assert_eq!(disk.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disk_overwrite_single_row() {
        let (_dir, disk) = temp_disk(Duration::from_secs(60), ExpiryPolicy::Sliding).await;

        disk.put("k", &json!(1)).await.unwrap();
        disk.put("k", &json!(2)).await.unwrap();

        assert_eq!(disk.len().await.unwrap(), 1);
        assert_eq!(disk.get("k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_disk_get_refreshes_last_accessed() {
        let (_dir, disk) = temp_disk(Duration::from_secs(60), ExpiryPolicy::Sliding).await;
        disk.put("k", &json!("v")).await.unwrap();
        let (created, accessed) = raw_times(&disk, "k").await.unwrap();
        assert_eq!(created, accessed);

        tokio::time::sleep(Duration::from_millis(20)).await;
        disk.get("k").await.unwrap();

        let (created_after, accessed_after) = raw_times(&disk, "k").await.unwrap();
        assert_eq!(created_after, created);
        assert!(accessed_after > accessed);
    }

    #[tokio::test]
    async fn test_disk_sliding_expiry() {
        let (_dir, disk) = temp_disk(Duration::from_millis(400), ExpiryPolicy::Sliding).await;
        disk.put("k", &json!("v")).await.unwrap();

        // Each read lands inside the window and pushes it forward
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(disk.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(disk.get("k").await.unwrap().is_some());

        // Idle past the window
        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(disk.get("k").await.unwrap(), None);
        assert_eq!(disk.len().await.unwrap(), 0, "expired row removed on read");
    }

    #[tokio::test]
    async fn test_disk_absolute_expiry_ignores_reads() {
        let (_dir, disk) = temp_disk(Duration::from_millis(400), ExpiryPolicy::Absolute).await;
        disk.put("k", &json!("v")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(disk.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(disk.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disk_delete() {
        let (_dir, disk) = temp_disk(Duration::from_secs(60), ExpiryPolicy::Sliding).await;
        disk.put("k", &json!(1)).await.unwrap();

        assert!(disk.delete("k").await.unwrap());
        assert!(!disk.delete("k").await.unwrap());
        assert_eq!(disk.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disk_cleanup_expired() {
        let (_dir, disk) = temp_disk(Duration::from_millis(300), ExpiryPolicy::Sliding).await;
        disk.put("old", &json!(1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        disk.put("fresh", &json!(2)).await.unwrap();

        assert_eq!(disk.cleanup_expired().await.unwrap(), 1);
        assert_eq!(disk.len().await.unwrap(), 1);
        assert_eq!(disk.get("fresh").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_disk_corrupt_row_self_heals() {
        let (_dir, disk) = temp_disk(Duration::from_secs(60), ExpiryPolicy::Sliding).await;
        disk.pool()
            .with_connection(|conn| {
                let now = current_timestamp_secs();
                conn.execute(
                    "INSERT INTO cache_entries (key, value, created_at, last_accessed)
                     VALUES ('bad', x'00ff00', ?1, ?1)",
                    params![now],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(disk.get("bad").await.unwrap(), None);
        assert_eq!(disk.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disk_clear() {
        let (_dir, disk) = temp_disk(Duration::from_secs(60), ExpiryPolicy::Sliding).await;
        for i in 0..5 {
            disk.put(&format!("k{}", i), &json!(i)).await.unwrap();
        }

        disk.clear().await.unwrap();
        assert!(disk.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_disk_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.db");
        let ttl = Duration::from_secs(60);
        {
            let disk = DiskTier::open(&path, 1, Duration::from_secs(1), ttl, ExpiryPolicy::Sliding)
                .await
                .unwrap();
            disk.put("survivor", &json!({"answer": 42})).await.unwrap();
            disk.close();
        }

        let disk = DiskTier::open(&path, 1, Duration::from_secs(1), ttl, ExpiryPolicy::Sliding)
            .await
            .unwrap();
        assert_eq!(
            disk.get("survivor").await.unwrap(),
            Some(json!({"answer": 42}))
        );
    }

    #[tokio::test]
    async fn test_disk_closed_is_unavailable() {
        let (_dir, disk) = temp_disk(Duration::from_secs(60), ExpiryPolicy::Sliding).await;
        disk.close();

        assert!(disk.is_closed());
        assert!(matches!(
            disk.get("k").await,
            Err(DiskError::Unavailable(PoolError::Closed))
        ));
        assert!(disk.put("k", &json!(1)).await.is_err());
        assert!(disk.cleanup_expired().await.is_err());
    }
}
