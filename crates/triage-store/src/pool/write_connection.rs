//! The single write connection, serialized behind a mutex.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::warn;

use triage_core::{Error, Result};

use super::pragmas::{apply_pragmas, verify_wal_mode};
use crate::to_store_err;

pub struct WriteConnection {
    conn: Mutex<Connection>,
}

impl WriteConnection {
    /// Open (creating if needed) the database file for writing.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::store_unavailable(format!("create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| to_store_err(&format!("open {}", path.display()), e))?;
        apply_pragmas(&conn, busy_timeout)?;
        if !verify_wal_mode(&conn)? {
            warn!(path = %path.display(), "WAL mode not active, readers will block on writes");
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory(busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| to_store_err("open in-memory", e))?;
        apply_pragmas(&conn, busy_timeout)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Execute a closure with exclusive access to the write connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock();
        f(&guard)
    }
}
