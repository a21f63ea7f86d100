//! DuckDB backend implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::config::DuckDbConfig;
use crate::dialect::{Dialect, DuckDbDialect};
use crate::executor::{BackendFailure, FailureKind, RowSet};

use super::BackendConnection;

type Outcome<T> = std::result::Result<T, BackendFailure>;

/// DuckDB connection implementing the unified backend trait.
#[derive(Clone)]
pub struct DuckDbConnection {
    database_path: PathBuf,
    dialect: Arc<DuckDbDialect>,
    limiter: Arc<Semaphore>,
    pool: Arc<Mutex<Vec<duckdb::Connection>>>,
}

impl DuckDbConnection {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!(path = %path.display(), max_concurrency = 16, "creating DuckDB connection");
        Self {
            database_path: path,
            dialect: Arc::new(DuckDbDialect),
            limiter: Arc::new(Semaphore::new(16)),
            pool: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config<P: AsRef<Path>>(path: P, config: &DuckDbConfig) -> Self {
        Self::new(path).with_max_concurrency(config.max_concurrency)
    }

    /// Configure maximum concurrent executions; callers can tune based on hardware.
    pub fn with_max_concurrency(mut self, max_in_flight: usize) -> Self {
        tracing::debug!(max_concurrency = max_in_flight, "configuring DuckDB concurrency");
        self.limiter = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    async fn acquire_slot(&self) -> Outcome<SemaphorePermit<'_>> {
        let available = self.limiter.available_permits();
        if available == 0 {
            tracing::debug!("all DuckDB slots in use, waiting for permit");
        }
        self.limiter
            .acquire()
            .await
            .map_err(|e| BackendFailure::new(FailureKind::Resource, format!("limiter closed: {e}")))
    }

    async fn checkout_connection(&self) -> Outcome<duckdb::Connection> {
        let mut guard = self.pool.lock().await;
        if let Some(conn) = guard.pop() {
            let pool_size = guard.len();
            drop(guard);
            tracing::trace!(pool_remaining = pool_size, "reusing pooled DuckDB connection");
            return Ok(conn);
        }
        drop(guard);
        tracing::debug!(path = %self.database_path.display(), "opening new DuckDB connection");
        duckdb::Connection::open(self.database_path.clone())
            .map_err(|e| BackendFailure::new(FailureKind::Resource, format!("open duckdb: {e}")))
    }
}

/// DuckDB reports errors as `<Kind> Error: message` text only.
fn classify(error: &duckdb::Error) -> BackendFailure {
    let message = error.to_string();
    let kind = if message.contains("Catalog Error") && message.contains("does not exist") {
        FailureKind::MissingRelation
    } else if message.contains("Division by zero") || message.contains("division by zero") {
        FailureKind::DivisionByZero
    } else if message.contains("Conversion Error")
        || message.contains("Out of Range Error")
        || message.contains("Constraint Error")
    {
        FailureKind::DataIntegrity
    } else if message.contains("INTERRUPT") || message.contains("Out of Memory Error") {
        FailureKind::Resource
    } else {
        FailureKind::Other
    };
    BackendFailure::new(kind, message)
}

fn run_statement(conn: &duckdb::Connection, sql: &str) -> Outcome<RowSet> {
    let start = Instant::now();
    let mut stmt = conn.prepare(sql).map_err(|e| classify(&e))?;
    let mut rows_iter = stmt.query([]).map_err(|e| classify(&e))?;
    let stmt_ref = rows_iter
        .as_ref()
        .ok_or_else(|| BackendFailure::new(FailureKind::Other, "statement missing"))?;
    let mut column_names = Vec::new();
    for idx in 0..stmt_ref.column_count() {
        let name = stmt_ref
            .column_name(idx)
            .map_err(|e| BackendFailure::new(FailureKind::Other, e.to_string()))?;
        column_names.push(name.to_string());
    }
    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next().map_err(|e| classify(&e))? {
        let mut values = Vec::with_capacity(column_names.len());
        for idx in 0..column_names.len() {
            let value = row.get_ref(idx).map_err(|e| classify(&e))?.to_owned();
            values.push(crate::executor::duck_value_to_json(value));
        }
        rows.push(values);
    }
    tracing::debug!(
        rows = rows.len(),
        columns = column_names.len(),
        ms = start.elapsed().as_millis(),
        "duckdb execute_sql"
    );
    Ok(RowSet::new(column_names, rows))
}

#[async_trait]
impl BackendConnection for DuckDbConnection {
    fn dialect(&self) -> Arc<dyn Dialect> {
        self.dialect.clone()
    }

    async fn execute_sql(&self, sql: &str) -> Outcome<RowSet> {
        let sql = sql.to_string();
        let _permit = self.acquire_slot().await?;
        let conn = self.checkout_connection().await?;
        let pool = self.pool.clone();
        let (result, conn) = tokio::task::spawn_blocking(move || {
            let result = run_statement(&conn, &sql);
            (result, conn)
        })
        .await
        .map_err(|e| BackendFailure::new(FailureKind::Resource, format!("task join error: {e}")))?;

        {
            let mut guard = pool.lock().await;
            guard.push(conn);
        }
        result
    }
}
