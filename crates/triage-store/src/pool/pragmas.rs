//! PRAGMA configuration applied to every SQLite connection.
//!
//! WAL mode, NORMAL sync and a bounded busy timeout on the writer; readers
//! only need the busy timeout.

use std::time::Duration;

use rusqlite::Connection;

use triage_core::Result;

use crate::to_store_err;

/// Apply write-side pragmas to a connection.
pub fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)
        .map_err(|e| to_store_err("busy_timeout", e))?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )
    .map_err(|e| to_store_err("apply pragmas", e))?;
    Ok(())
}

/// Apply read-side pragmas to a connection.
pub fn apply_read_pragmas(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)
        .map_err(|e| to_store_err("busy_timeout", e))?;
    Ok(())
}

/// Verify that WAL mode is active on a connection.
pub fn verify_wal_mode(conn: &Connection) -> Result<bool> {
    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .map_err(|e| to_store_err("journal_mode", e))?;
    Ok(mode.eq_ignore_ascii_case("wal"))
}
