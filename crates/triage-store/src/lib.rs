//! Triage Store
//!
//! SQLite persistence for triage records.
//!
//! Provides:
//! - [`RecordStore`], the storage capability the service depends on
//! - [`SqliteStore`], backed by one serialized writer and a read pool
//! - Table layout derived from the declared feature schema

pub mod guard;
pub mod pool;
pub mod queries;
pub mod store;
pub mod table;

pub use store::{RecordStore, SqliteStore, StoreConfig};
pub use table::TableLayout;

use rusqlite::ErrorCode;
use triage_core::Error;

/// Classify a SQLite failure into the store error taxonomy
pub(crate) fn to_store_err(context: &str, err: rusqlite::Error) -> Error {
    let constraint = match &err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::ConstraintViolation | ErrorCode::TypeMismatch | ErrorCode::TooBig
        ),
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::InvalidColumnIndex(_)
        | rusqlite::Error::InvalidColumnName(_) => true,
        _ => false,
    };

    if constraint {
        Error::constraint(format!("{context}: {err}"))
    } else {
        Error::store_unavailable(format!("{context}: {err}"))
    }
}
