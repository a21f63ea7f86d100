//! PostgreSQL backend over a deadpool connection pool.
//!
//! Driver errors are classified by SQLSTATE; rows are decoded to JSON cells
//! by column type, with analytics-specific handling of timestamps and
//! NUMERIC aggregates.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;

use crate::config::PostgresConfig;
use crate::dialect::{Dialect, PostgresDialect};
use crate::error::{AnalyticsError, Result};
use crate::executor::{BackendFailure, FailureKind, RowSet};

use super::BackendConnection;

/// Timestamp layout of analytics date columns in grids.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub struct PostgresConnection {
    pool: deadpool_postgres::Pool,
    dialect: Arc<PostgresDialect>,
}

impl PostgresConnection {
    /// Pool over a `postgresql://` URL or a `host=.. dbname=..` string.
    pub fn new(connection_string: &str, settings: &PostgresConfig) -> Result<Self> {
        let pool = pool_config(connection_string, settings)
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| AnalyticsError::Config(format!("create postgres pool: {e}")))?;
        tracing::info!(
            max_size = pool.status().max_size,
            statement_timeout_ms = settings.statement_timeout_ms,
            "analytics postgres pool ready"
        );
        Ok(Self {
            pool,
            dialect: Arc::new(PostgresDialect),
        })
    }
}

fn pool_config(connection_string: &str, settings: &PostgresConfig) -> deadpool_postgres::Config {
    let mut config = deadpool_postgres::Config::new();
    if connection_string.starts_with("postgres") {
        config.url = Some(connection_string.to_string());
    } else {
        for (key, value) in connection_string
            .split_whitespace()
            .filter_map(|part| part.split_once('='))
        {
            match key {
                "host" => config.host = Some(value.to_string()),
                "port" => config.port = value.parse().ok(),
                "user" => config.user = Some(value.to_string()),
                "password" => config.password = Some(value.to_string()),
                "dbname" => config.dbname = Some(value.to_string()),
                other => tracing::debug!(key = other, "ignoring connection parameter"),
            }
        }
    }
    // Long analytics scans are cut off server side so a slot frees up.
    if settings.statement_timeout_ms > 0 {
        config.options = Some(format!(
            "-c statement_timeout={}",
            settings.statement_timeout_ms
        ));
    }
    config.pool = Some(deadpool_postgres::PoolConfig::new(settings.pool_size.max(1)));
    config
}

/// SQLSTATE based classification; errors without a code are lost connections.
fn classify(error: &tokio_postgres::Error) -> BackendFailure {
    let kind = match error.code() {
        Some(code) => failure_kind(code),
        None => FailureKind::Resource,
    };
    BackendFailure::new(kind, error.to_string())
}

fn failure_kind(code: &SqlState) -> FailureKind {
    let class = &code.code()[..2.min(code.code().len())];
    if *code == SqlState::UNDEFINED_TABLE {
        FailureKind::MissingRelation
    } else if *code == SqlState::DIVISION_BY_ZERO {
        FailureKind::DivisionByZero
    } else if *code == SqlState::QUERY_CANCELED {
        FailureKind::Resource
    } else {
        match class {
            "22" | "23" => FailureKind::DataIntegrity,
            "08" | "53" | "57" => FailureKind::Resource,
            _ => FailureKind::Other,
        }
    }
}

#[async_trait]
impl BackendConnection for PostgresConnection {
    fn dialect(&self) -> Arc<dyn Dialect> {
        self.dialect.clone()
    }

    async fn execute_sql(&self, sql: &str) -> std::result::Result<RowSet, BackendFailure> {
        let start = Instant::now();
        let client = self.pool.get().await.map_err(|e| {
            let status = self.pool.status();
            tracing::warn!(error = %e, available = status.available, "no postgres connection");
            BackendFailure::new(FailureKind::Resource, format!("get postgres connection: {e}"))
        })?;

        let rows = client.query(sql, &[]).await.map_err(|e| classify(&e))?;

        // Empty results still need their column names for the grid headers.
        let columns: Vec<String> = match rows.first() {
            Some(first) => first.columns().iter().map(|c| c.name().to_string()).collect(),
            None => client
                .prepare(sql)
                .await
                .map(|stmt| stmt.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default(),
        };
        let values: Vec<Vec<Value>> = rows.iter().map(decode_row).collect();

        tracing::debug!(
            rows = values.len(),
            ms = start.elapsed().as_millis() as u64,
            "postgres statement returned"
        );
        Ok(RowSet::new(columns, values))
    }
}

fn decode_row(row: &Row) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| decode_cell(row, idx, column.type_()))
        .collect()
}

fn cell<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn decode_cell(row: &Row, idx: usize, ty: &Type) -> Value {
    let value = match *ty {
        Type::BOOL => cell::<bool>(row, idx).map(Value::Bool),
        Type::INT2 => cell::<i16>(row, idx).map(Value::from),
        Type::INT4 => cell::<i32>(row, idx).map(Value::from),
        Type::INT8 => cell::<i64>(row, idx).map(Value::from),
        Type::FLOAT4 => cell::<f32>(row, idx).map(|v| float(v as f64)),
        Type::FLOAT8 => cell::<f64>(row, idx).map(float),
        Type::DATE => cell::<NaiveDate>(row, idx).map(|d| Value::String(d.to_string())),
        Type::TIMESTAMP => cell::<NaiveDateTime>(row, idx)
            .map(|d| Value::String(d.format(TIMESTAMP_FORMAT).to_string())),
        Type::TIMESTAMPTZ => cell::<DateTime<Utc>>(row, idx)
            .map(|d| Value::String(d.naive_utc().format(TIMESTAMP_FORMAT).to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            cell::<String>(row, idx).map(Value::String)
        }
        // NUMERIC aggregates and extension types such as geometry text
        _ => cell::<String>(row, idx)
            .map(Value::String)
            .or_else(|| cell::<f64>(row, idx).map(float))
            .or_else(|| cell::<i64>(row, idx).map(Value::from)),
    };
    value.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classes_map_to_failure_kinds() {
        assert_eq!(failure_kind(&SqlState::UNDEFINED_TABLE), FailureKind::MissingRelation);
        assert_eq!(failure_kind(&SqlState::DIVISION_BY_ZERO), FailureKind::DivisionByZero);
        assert_eq!(failure_kind(&SqlState::QUERY_CANCELED), FailureKind::Resource);
        assert_eq!(failure_kind(&SqlState::INVALID_TEXT_REPRESENTATION), FailureKind::DataIntegrity);
        assert_eq!(failure_kind(&SqlState::UNIQUE_VIOLATION), FailureKind::DataIntegrity);
        assert_eq!(failure_kind(&SqlState::TOO_MANY_CONNECTIONS), FailureKind::Resource);
        assert_eq!(failure_kind(&SqlState::SYNTAX_ERROR), FailureKind::Other);
    }

    #[test]
    fn key_value_connection_string() {
        let settings = PostgresConfig {
            pool_size: 0,
            statement_timeout_ms: 5000,
        };
        let config = pool_config("host=db port=5433 dbname=analytics sslmode=off", &settings);
        assert_eq!(config.host.as_deref(), Some("db"));
        assert_eq!(config.port, Some(5433));
        assert_eq!(config.dbname.as_deref(), Some("analytics"));
        assert_eq!(config.options.as_deref(), Some("-c statement_timeout=5000"));
        assert_eq!(config.pool.map(|p| p.max_size), Some(1));
    }
}
