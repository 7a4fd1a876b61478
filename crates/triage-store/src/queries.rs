//! Record queries over a borrowed connection.
//!
//! Callers pick the connection (writer or reader); these functions only run
//! SQL and map errors.

use chrono::Utc;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};

use triage_core::{
    AggregateCounts, Confidence, Error, FeatureVector, Result, TriageLevel, TriageRecord,
};

use crate::guard::OperationGuard;
use crate::table::TableLayout;
use crate::to_store_err;

/// Insert one record and read it back within a single write transaction.
///
/// Either the whole row is committed and returned, or nothing is. The commit
/// goes through `guard`, so an abandoned insert rolls back instead.
pub fn insert_and_fetch(
    conn: &Connection,
    layout: &TableLayout,
    vector: &FeatureVector,
    label: TriageLevel,
    confidence: Option<Confidence>,
    guard: &OperationGuard,
) -> Result<TriageRecord> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(|e| to_store_err("begin insert", e))?;

    match insert_inner(&tx, layout, vector, label, confidence) {
        Ok(record) => {
            // Dropping an uncommitted transaction rolls it back.
            guard.commit_with(move || {
                tx.commit().map_err(|e| to_store_err("commit insert", e))
            })?;
            Ok(record)
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn insert_inner(
    conn: &Connection,
    layout: &TableLayout,
    vector: &FeatureVector,
    label: TriageLevel,
    confidence: Option<Confidence>,
) -> Result<TriageRecord> {
    let values = layout.insert_values(vector, label, confidence, Utc::now());
    conn.execute(&layout.insert_sql(), params_from_iter(values))
        .map_err(|e| to_store_err("insert record", e))?;
    let id = conn.last_insert_rowid();

    fetch(conn, layout, id)?.ok_or_else(|| {
        Error::store_unavailable(format!("record {id} not visible after insert"))
    })
}

/// Point lookup by id.
pub fn fetch(conn: &Connection, layout: &TableLayout, id: i64) -> Result<Option<TriageRecord>> {
    let sql = format!("{} WHERE id = ?1", layout.select_sql());
    conn.query_row(&sql, [id], |row| layout.read_row(row))
        .optional()
        .map_err(|e| to_store_err("fetch record", e))
}

/// Records newest first. `None` or `Some(0)` returns every row.
pub fn list_recent(
    conn: &Connection,
    layout: &TableLayout,
    limit: Option<usize>,
) -> Result<Vec<TriageRecord>> {
    let mut sql = format!("{} ORDER BY id DESC", layout.select_sql());
    let limit = limit.filter(|n| *n > 0);
    if limit.is_some() {
        sql.push_str(" LIMIT ?1");
    }

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_store_err("list records", e))?;
    let rows = match limit {
        Some(n) => {
            let n = i64::try_from(n).unwrap_or(i64::MAX);
            stmt.query_map([n], |row| layout.read_row(row))
                .map_err(|e| to_store_err("list records", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
        }
        None => stmt
            .query_map([], |row| layout.read_row(row))
            .map_err(|e| to_store_err("list records", e))?
            .collect::<rusqlite::Result<Vec<_>>>(),
    };
    rows.map_err(|e| to_store_err("list records", e))
}

/// Total and per-level record counts from one statement.
pub fn aggregate_counts(conn: &Connection, layout: &TableLayout) -> Result<AggregateCounts> {
    let sql = format!(
        "SELECT triage_level, COUNT(*) FROM {} GROUP BY triage_level",
        layout.table()
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| to_store_err("aggregate counts", e))?;
    let rows: Vec<(i64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| to_store_err("aggregate counts", e))?
        .collect::<rusqlite::Result<_>>()
        .map_err(|e| to_store_err("aggregate counts", e))?;

    let mut counts = Vec::with_capacity(rows.len());
    for (level, count) in rows {
        let level = u8::try_from(level)
            .ok()
            .and_then(|l| TriageLevel::try_from(l).ok())
            .ok_or_else(|| Error::constraint(format!("stored triage level {level} is invalid")))?;
        counts.push((level, count.max(0) as u64));
    }
    Ok(AggregateCounts::from_counts(counts))
}
