//! Query planning, SQL generation and execution for partitioned event and
//! enrollment analytics tables.
//!
//! A [`QueryDescriptor`] is validated and split by the [`QueryPlanner`],
//! compiled by an [`AnalyticsManager`] into dialect SQL and executed through a
//! [`BackendConnection`]. [`AnalyticsService`] ties these together and returns
//! a [`Grid`].

pub mod backends;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod grid;
pub mod labels;
pub mod manager;
pub mod materializer;
pub mod model;
pub mod planner;
pub mod query_builder;
pub mod resolvers;
pub mod service;
pub mod sql_ast;
pub mod telemetry;
pub mod time_field;
pub mod validation;

pub use backends::BackendConnection;
#[cfg(feature = "duckdb")]
pub use backends::DuckDbConnection;
#[cfg(feature = "postgres")]
pub use backends::PostgresConnection;
pub use config::AnalyticsConfig;
pub use dialect::{Dialect, DuckDbDialect, PostgresDialect};
pub use error::{AnalyticsError, Result};
pub use executor::{BackendFailure, FailureKind, QueryOutcome, RowSet};
pub use grid::{Grid, GridHeader, Pager};
pub use manager::{AnalyticsManager, CompiledQuery, EnrollmentManager, EventManager};
pub use model::QueryDescriptor;
pub use planner::QueryPlanner;
pub use query_builder::SqlContext;
pub use resolvers::{
    AllPartitions, IndicatorSqlCompiler, MetadataResolver, PartitionCatalog, StaticCatalog,
    VerbatimIndicatorCompiler,
};
pub use service::AnalyticsService;
pub use validation::Validator;
