//! Narrow interfaces to the collaborators the engine consumes but does not
//! implement: metadata lookup, indicator expression compilation and the
//! catalog of physical partitions.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use glob::glob;
use serde::Deserialize;

use crate::error::{AnalyticsError, Result};
use crate::model::ProgramIndicator;

/// Display metadata for uids appearing in a grid.
pub trait MetadataResolver: Send + Sync {
    fn display_name(&self, uid: &str) -> Option<String>;
}

/// Whether an indicator expression is used as a value or as a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind {
    Numeric,
    Boolean,
}

/// Compiles a program indicator expression into SQL over analytics columns.
pub trait IndicatorSqlCompiler: Send + Sync {
    fn analytics_sql(
        &self,
        expression: &str,
        kind: ExpressionKind,
        indicator: &ProgramIndicator,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<String>;
}

/// Existing yearly partitions per analytics table.
pub trait PartitionCatalog: Send + Sync {
    fn has_partition(&self, table: &str, year: i32) -> bool;
}

/// Passes expressions through unchanged; for fixtures whose expressions are
/// already SQL.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerbatimIndicatorCompiler;

impl IndicatorSqlCompiler for VerbatimIndicatorCompiler {
    fn analytics_sql(
        &self,
        expression: &str,
        _kind: ExpressionKind,
        _indicator: &ProgramIndicator,
        _start: Option<NaiveDate>,
        _end: Option<NaiveDate>,
    ) -> Result<String> {
        Ok(expression.to_string())
    }
}

/// Catalog that reports every partition as present.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllPartitions;

impl PartitionCatalog for AllPartitions {
    fn has_partition(&self, _table: &str, _year: i32) -> bool {
        true
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    names: HashMap<String, String>,
    #[serde(default)]
    partitions: HashMap<String, Vec<i32>>,
}

/// In-memory metadata and partition catalog, loadable from YAML.
///
/// ```yaml
/// names:
///   deA: Weight
/// partitions:
///   analytics_event_prga: [2022, 2023]
/// ```
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    names: HashMap<String, String>,
    partitions: HashMap<String, BTreeSet<i32>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, uid: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(uid.into(), name.into());
        self
    }

    pub fn with_partitions(
        mut self,
        table: impl Into<String>,
        years: impl IntoIterator<Item = i32>,
    ) -> Self {
        self.partitions.entry(table.into()).or_default().extend(years);
        self
    }

    /// Merge every `*.yml` / `*.yaml` file in `dir`.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir: PathBuf = dir.as_ref().to_path_buf();
        if !dir.exists() {
            return Err(AnalyticsError::Config(format!(
                "catalog directory not found: {}",
                dir.display()
            )));
        }
        let mut catalog = StaticCatalog::new();
        for pattern in ["yml", "yaml"] {
            for entry in glob(&format!("{}/*.{pattern}", dir.display()))
                .map_err(|e| AnalyticsError::Other(e.into()))?
                .flatten()
            {
                catalog.load_file(&entry)?;
            }
        }
        tracing::debug!(
            names = catalog.names.len(),
            tables = catalog.partitions.len(),
            "loaded static catalog"
        );
        Ok(catalog)
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let file: CatalogFile = serde_yaml::from_str(&contents)?;
        self.names.extend(file.names);
        for (table, years) in file.partitions {
            self.partitions.entry(table).or_default().extend(years);
        }
        Ok(())
    }
}

impl MetadataResolver for StaticCatalog {
    fn display_name(&self, uid: &str) -> Option<String> {
        self.names.get(uid).cloned()
    }
}

impl PartitionCatalog for StaticCatalog {
    fn has_partition(&self, table: &str, year: i32) -> bool {
        self.partitions
            .get(table)
            .map(|years| years.contains(&year))
            .unwrap_or(false)
    }
}
