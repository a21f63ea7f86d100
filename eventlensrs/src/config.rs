//! Configuration system for eventlens.
//!
//! TOML-based configuration with built-in defaults for every section.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::model::AnalyticsType;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub query: QueryConfig,
    pub rounding: RoundingConfig,
    pub tables: TableConfig,
    pub postgres: PostgresConfig,
    pub duckdb: DuckDbConfig,
}

/// Query execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum rows a single request may return (0 = unlimited).
    pub max_limit: u64,
    /// Query timeout in milliseconds (default: 30000).
    pub timeout_ms: u64,
    /// Planned descriptors executed concurrently (1 = sequential).
    pub max_parallel_queries: usize,
    /// Page size used when paging is requested without an explicit size.
    pub default_page_size: u64,
}

/// Numeric output rounding.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoundingConfig {
    pub decimals: u32,
}

/// Physical analytics table naming.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TableConfig {
    pub event_prefix: String,
    pub enrollment_prefix: String,
    pub date_period_table: String,
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Connection pool size.
    pub pool_size: usize,
    /// Statement timeout in milliseconds (0 = server default).
    pub statement_timeout_ms: u64,
}

/// DuckDB-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DuckDbConfig {
    /// Maximum concurrent queries (default: 16).
    pub max_concurrency: usize,
}

// Default implementations

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_limit: 50_000,
            timeout_ms: 30_000,
            max_parallel_queries: 4,
            default_page_size: 50,
        }
    }
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self { decimals: 2 }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            event_prefix: "analytics_event".to_string(),
            enrollment_prefix: "analytics_enrollment".to_string(),
            date_period_table: "analytics_rs_dateperiodstructure".to_string(),
        }
    }
}

impl TableConfig {
    /// Physical analytics table for a program, e.g. `analytics_event_prga`.
    pub fn table_name(&self, analytics_type: AnalyticsType, program_uid: &str) -> String {
        let prefix = match analytics_type {
            AnalyticsType::Event => &self.event_prefix,
            AnalyticsType::Enrollment => &self.enrollment_prefix,
        };
        format!("{prefix}_{}", program_uid.to_lowercase())
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            statement_timeout_ms: 30_000,
        }
    }
}

impl Default for DuckDbConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AnalyticsError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(toml_str)
            .map_err(|e| AnalyticsError::Config(format!("failed to parse config: {e}")))?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `EVENTLENS_CONFIG` environment variable
    /// 2. `./eventlens.toml` (current directory)
    /// 3. `~/.config/eventlens/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("EVENTLENS_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "loaded config from EVENTLENS_CONFIG");
                    return cfg;
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "ignoring EVENTLENS_CONFIG"),
            }
        }

        if let Ok(cfg) = Self::from_file("eventlens.toml") {
            tracing::info!("loaded config from ./eventlens.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("eventlens").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }

    fn check(&self) -> Result<()> {
        if self.query.max_parallel_queries == 0 {
            return Err(AnalyticsError::Config(
                "query.max_parallel_queries must be at least 1".to_string(),
            ));
        }
        if self.query.default_page_size == 0 {
            return Err(AnalyticsError::Config(
                "query.default_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
