//! Connection pooling and pragma configuration
//!
//! Bounded r2d2 pool of SQLite connections for the disk tier. Connections run in
//! WAL mode so readers proceed while a writer commits.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use r2d2::{ManageConnection, Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{DiskError, PoolError};

/// Page cache per connection, in KiB (negative = size rather than page count)
const CACHE_SIZE_KIB: i64 = -8000;

// == Connection Pool ==
/// Cheaply cloneable handle to a bounded set of SQLite connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
    path: PathBuf,
    max_connections: u32,
    timeout: Duration,
}

/// Occupancy of the pool at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_connections: u32,
    pub open_connections: u32,
    pub idle_connections: u32,
    pub closed: bool,
}

impl ConnectionPool {
    // == Initialize ==
    /// Opens a pool of at most `max_connections` connections to `path`.
    ///
    /// One connection is opened eagerly to prove the file is usable; the rest
    /// are created on demand.
    pub fn initialize(
        path: impl AsRef<Path>,
        max_connections: u32,
        timeout: Duration,
    ) -> Result<Self, PoolError> {
        let path = path.as_ref().to_path_buf();
        let init_error = |reason: String| PoolError::Init {
            path: path.clone(),
            reason,
        };

        if max_connections == 0 {
            return Err(init_error("max_connections must be at least 1".to_string()));
        }
        if timeout.is_zero() {
            return Err(init_error("timeout must be positive".to_string()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| init_error(format!("cannot create {}: {}", parent.display(), e)))?;
        }

        let manager = SqliteConnectionManager::file(&path)
            .with_init(move |conn| apply_pragmas(conn, timeout));

        // Validate eagerly so a bad path fails here rather than on first use
        let probe = manager.connect().map_err(|e| init_error(e.to_string()))?;
        verify_writable(&probe).map_err(|e| init_error(e.to_string()))?;
        drop(probe);

        let pool = Pool::builder()
            .max_size(max_connections)
            .min_idle(Some(0))
            .connection_timeout(timeout)
            .build(manager)
            .map_err(|e| init_error(e.to_string()))?;

        info!(
            path = %path.display(),
            max_connections,
            timeout_ms = timeout.as_millis() as u64,
            "SQLite connection pool initialized"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                pool: RwLock::new(Some(pool)),
                path,
                max_connections,
                timeout,
            }),
        })
    }

    // == Acquire ==
    /// Checks out a connection, blocking up to the pool timeout.
    ///
    /// The connection goes back to the pool when the guard drops; an
    /// unfinished transaction is rolled back first.
    pub fn acquire(&self) -> Result<PoolConnection, PoolError> {
        let pool = self.inner.pool.read().clone().ok_or(PoolError::Closed)?;

        let conn = pool
            .get_timeout(self.inner.timeout)
            .map_err(|_| PoolError::Timeout(self.inner.timeout))?;

        Ok(PoolConnection { conn })
    }

    // == With Connection ==
    /// Runs `f` with a pooled connection on the blocking thread pool.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, DiskError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DiskError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.acquire()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| DiskError::Task(e.to_string()))?
    }

    // == Close ==
    /// Drops the pool. Idle connections close now, checked-out ones when
    /// they are released. Further `acquire` calls fail with `Closed`.
    pub fn close(&self) {
        if self.inner.pool.write().take().is_some() {
            info!(path = %self.inner.path.display(), "SQLite connection pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.read().is_none()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn status(&self) -> PoolStatus {
        match self.inner.pool.read().as_ref() {
            Some(pool) => {
                let state = pool.state();
                PoolStatus {
                    max_connections: self.inner.max_connections,
                    open_connections: state.connections,
                    idle_connections: state.idle_connections,
                    closed: false,
                }
            }
            None => PoolStatus {
                max_connections: self.inner.max_connections,
                open_connections: 0,
                idle_connections: 0,
                closed: true,
            },
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("path", &self.inner.path)
            .field("max_connections", &self.inner.max_connections)
            .field("timeout", &self.inner.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// == Pool Connection ==
/// Exclusive use of one pooled connection for the lifetime of the guard.
pub struct PoolConnection {
    conn: PooledConnection<SqliteConnectionManager>,
}

impl Deref for PoolConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for PoolConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        if !self.conn.is_autocommit() {
            warn!("rolling back transaction left open on pooled connection");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("rollback on release failed: {}", e);
            }
        }
    }
}

/// Apply per-connection pragmas
fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        debug!(journal_mode = %mode, "WAL journaling unavailable for this store");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", CACHE_SIZE_KIB)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Make sure the file is actually writable, not just openable
fn verify_writable(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("BEGIN IMMEDIATE; ROLLBACK;")
}
