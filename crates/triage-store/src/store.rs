//! Record store capability and its SQLite implementation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use triage_core::{
    AggregateCounts, Confidence, Error, FeatureSchema, FeatureVector, Result, TriageLevel,
    TriageRecord,
};

use crate::guard::OperationGuard;
use crate::pool::read_pool::DEFAULT_POOL_SIZE;
use crate::pool::ConnectionPool;
use crate::queries;
use crate::table::{TableLayout, DEFAULT_TABLE};

/// Durable storage for triage records.
///
/// Implementations must be safe to share across request handlers and must
/// assign ids and creation times themselves.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the record table if needed and verify an existing one
    async fn ensure_schema(&self) -> Result<()>;

    /// Persist one classified vector and return the stored record
    async fn insert_and_fetch(
        &self,
        vector: &FeatureVector,
        label: TriageLevel,
        confidence: Option<Confidence>,
    ) -> Result<TriageRecord>;

    /// Look up one record by id
    async fn fetch(&self, id: i64) -> Result<Option<TriageRecord>>;

    /// Records newest first; `None` or `Some(0)` means all
    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<TriageRecord>>;

    /// Total and per-level counts
    async fn aggregate_counts(&self) -> Result<AggregateCounts>;
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; in-memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Record table name
    #[serde(default = "default_table")]
    pub table: String,

    /// Number of read-only connections (file-backed stores only)
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Upper bound on any single store operation in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_read_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_busy_timeout_ms() -> u64 {
    2000
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: default_table(),
            read_pool_size: default_read_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

struct StoreInner {
    pool: ConnectionPool,
    layout: TableLayout,
}

/// SQLite-backed [`RecordStore`]
///
/// Writes are serialized through one connection. Blocking SQLite calls run
/// on the tokio blocking pool, bounded by `operation_timeout_ms`.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
    timeout: Duration,
}

impl SqliteStore {
    /// Open a store for the given schema
    pub fn open(config: &StoreConfig, schema: Arc<FeatureSchema>) -> Result<Self> {
        let layout = TableLayout::new(config.table.clone(), schema)?;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);

        let pool = match &config.path {
            Some(path) => {
                info!(
                    "Opening SQLite store at {} ({} readers)",
                    path.display(),
                    config.read_pool_size
                );
                ConnectionPool::open(path, config.read_pool_size, busy_timeout)?
            }
            None => {
                info!("Opening in-memory SQLite store");
                ConnectionPool::open_in_memory(busy_timeout)?
            }
        };

        Ok(Self {
            inner: Arc::new(StoreInner { pool, layout }),
            timeout: Duration::from_millis(config.operation_timeout_ms),
        })
    }

    /// In-memory store with default settings
    pub fn open_in_memory(schema: Arc<FeatureSchema>) -> Result<Self> {
        Self::open(&StoreConfig::default(), schema)
    }

    pub fn layout(&self) -> &TableLayout {
        &self.inner.layout
    }

    /// Run `f` on the blocking pool, bounded by the operation timeout.
    ///
    /// On timeout the operation is abandoned through its guard: a queued
    /// write never starts, a running one is interrupted and cannot commit.
    /// If the write committed first, its result is returned instead.
    async fn run<F, T>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&StoreInner, &OperationGuard) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        let guard = Arc::new(OperationGuard::default());
        let task_guard = guard.clone();
        let mut task = tokio::task::spawn_blocking(move || f(&inner, &task_guard));

        let outcome = tokio::time::timeout(self.timeout, &mut task).await;
        match outcome {
            Ok(joined) => joined.map_err(|e| Error::internal(format!("{op} task failed: {e}")))?,
            Err(_) if !guard.abandon() => {
                debug!(op, "store operation committed at the timeout boundary");
                task.await
                    .map_err(|e| Error::internal(format!("{op} task failed: {e}")))?
            }
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "store operation timed out");
                Err(Error::store_unavailable(format!(
                    "{op} timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.run("ensure schema", |inner, _| {
            inner.pool.writer.with_conn(|conn| inner.layout.ensure(conn))
        })
        .await?;
        info!("Record table '{}' ready", self.inner.layout.table());
        Ok(())
    }

    async fn insert_and_fetch(
        &self,
        vector: &FeatureVector,
        label: TriageLevel,
        confidence: Option<Confidence>,
    ) -> Result<TriageRecord> {
        if !vector.schema().same_fields(self.inner.layout.schema()) {
            return Err(Error::constraint(format!(
                "vector fields [{}] do not match table {}",
                vector.schema().names().join(", "),
                self.inner.layout.table()
            )));
        }

        let vector = vector.clone();
        let record = self
            .run("insert record", move |inner, guard| {
                inner.pool.writer.with_conn(|conn| {
                    guard.attach(conn)?;
                    let result = queries::insert_and_fetch(
                        conn,
                        &inner.layout,
                        &vector,
                        label,
                        confidence,
                        guard,
                    );
                    guard.detach();
                    result
                })
            })
            .await?;
        debug!(id = record.id, level = %record.triage_level, "stored triage record");
        Ok(record)
    }

    async fn fetch(&self, id: i64) -> Result<Option<TriageRecord>> {
        self.run("fetch record", move |inner, _| {
            inner
                .pool
                .with_reader(|conn| queries::fetch(conn, &inner.layout, id))
        })
        .await
    }

    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<TriageRecord>> {
        self.run("list records", move |inner, _| {
            inner
                .pool
                .with_reader(|conn| queries::list_recent(conn, &inner.layout, limit))
        })
        .await
    }

    async fn aggregate_counts(&self) -> Result<AggregateCounts> {
        self.run("aggregate counts", |inner, _| {
            inner
                .pool
                .with_reader(|conn| queries::aggregate_counts(conn, &inner.layout))
        })
        .await
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("table", &self.inner.layout.table())
            .field("timeout", &self.timeout)
            .finish()
    }
}
