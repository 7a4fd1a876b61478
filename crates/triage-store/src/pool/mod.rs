//! Connection pool managing read/write connections.

pub mod pragmas;
pub mod read_pool;
pub mod write_connection;

use std::path::Path;
use std::time::Duration;

use triage_core::Result;

pub use read_pool::ReadPool;
pub use write_connection::WriteConnection;

/// Manages the single write connection and the read connection pool.
pub struct ConnectionPool {
    pub writer: WriteConnection,
    /// Absent in in-memory mode, where reads go through the writer.
    pub readers: Option<ReadPool>,
}

impl ConnectionPool {
    /// Open a connection pool for the given database file.
    pub fn open(path: &Path, read_pool_size: usize, busy_timeout: Duration) -> Result<Self> {
        let writer = WriteConnection::open(path, busy_timeout)?;
        let readers = ReadPool::open(path, read_pool_size, busy_timeout)?;
        Ok(Self {
            writer,
            readers: Some(readers),
        })
    }

    /// Open an in-memory database with a single connection.
    pub fn open_in_memory(busy_timeout: Duration) -> Result<Self> {
        let writer = WriteConnection::open_in_memory(busy_timeout)?;
        Ok(Self {
            writer,
            readers: None,
        })
    }

    /// Run a read-only closure on the best available connection.
    pub fn with_reader<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T>,
    {
        match &self.readers {
            Some(readers) => readers.with_conn(f),
            None => self.writer.with_conn(f),
        }
    }
}
