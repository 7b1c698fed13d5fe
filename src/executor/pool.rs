//! Read-only connection pool
//!
//! A fixed set of SQLite connections opened with `SQLITE_OPEN_READ_ONLY`,
//! shared by every session. A semaphore bounds concurrent checkouts; the
//! guard hands its connection back on drop.

use crate::error::GatewayError;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl ConnectionPool {
    /// Open `size` read-only connections to an existing database file.
    ///
    /// A missing file is a configuration error; the pool never creates one.
    pub fn open(path: impl AsRef<Path>, size: usize) -> Result<Arc<Self>, GatewayError> {
        let path = path.as_ref();
        if size == 0 {
            return Err(GatewayError::Config(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        if !path.is_file() {
            return Err(GatewayError::Config(format!(
                "database file '{}' does not exist",
                path.display()
            )));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(path, flags).map_err(|e| {
                GatewayError::Config(format!("cannot open '{}': {e}", path.display()))
            })?;
            connections.push(conn);
        }

        tracing::info!(path = %path.display(), size, "connection_pool_opened");
        Ok(Arc::new(ConnectionPool {
            path: path.to_path_buf(),
            idle: Mutex::new(connections),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections not currently checked out
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free connection
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, GatewayError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::Execution("connection pool closed".to_string()))?;
        let conn = self
            .idle
            .lock()
            .pop()
            .ok_or_else(|| GatewayError::Execution("connection pool exhausted".to_string()))?;
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }
}

/// A checked-out connection, returned to the pool on drop
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPool>,
    // Dropped after `conn` is pushed back
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `None` inside `drop`
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().push(conn);
        }
    }
}
