//! Database backend implementations.
//!
//! Each backend is implemented in its own file and gated behind a feature flag.
//! Backends never raise: driver errors are classified into [`FailureKind`] so
//! the managers can tell a missing analytics table from a real failure.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::executor::{BackendFailure, RowSet};

/// Unified interface for all analytics stores.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    fn dialect(&self) -> Arc<dyn Dialect>;

    async fn execute_sql(&self, sql: &str) -> std::result::Result<RowSet, BackendFailure>;
}

// Feature-gated backend implementations
#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use duckdb::DuckDbConnection;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresConnection;
