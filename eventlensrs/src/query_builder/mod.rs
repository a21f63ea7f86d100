//! Compilation of descriptors into SQL fragments.
//!
//! `columns` resolves query items to select expressions, `filters` turns
//! item filters and dimensions into predicates, `aggregate` picks the
//! aggregate function and count target. The managers compose these into
//! complete statements.

use std::fmt;
use std::sync::Arc;

use crate::config::{AnalyticsConfig, TableConfig};
use crate::dialect::Dialect;
use crate::grid::GridHeader;
use crate::materializer::ValueDecoder;
use crate::model::AnalyticsType;
use crate::resolvers::IndicatorSqlCompiler;

pub mod aggregate;
pub mod columns;
pub mod filters;

/// Alias of the analytics table in every generated statement.
pub const ANALYTICS_TBL_ALIAS: &str = "ax";

/// Alias of the joined date/period structure table.
pub const DATE_PERIOD_STRUCT_ALIAS: &str = "dps";

/// Everything the compilers need besides the descriptor itself.
#[derive(Clone)]
pub struct SqlContext {
    pub dialect: Arc<dyn Dialect>,
    pub indicators: Arc<dyn IndicatorSqlCompiler>,
    pub tables: TableConfig,
    pub max_limit: u64,
    pub default_page_size: u64,
}

impl fmt::Debug for SqlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlContext")
            .field("dialect", &self.dialect.name())
            .field("tables", &self.tables)
            .field("max_limit", &self.max_limit)
            .finish()
    }
}

impl SqlContext {
    pub fn new(
        dialect: Arc<dyn Dialect>,
        indicators: Arc<dyn IndicatorSqlCompiler>,
        config: &AnalyticsConfig,
    ) -> Self {
        Self {
            dialect,
            indicators,
            tables: config.tables.clone(),
            max_limit: config.query.max_limit,
            default_page_size: config.query.default_page_size,
        }
    }

    /// `ax."column"`.
    pub fn col(&self, column: &str) -> String {
        self.dialect.qualified(ANALYTICS_TBL_ALIAS, column)
    }

    pub fn quote(&self, ident: &str) -> String {
        self.dialect.quote_ident(ident)
    }

    pub fn literal(&self, value: &str) -> String {
        self.dialect.quote_literal(value)
    }

    /// `'a','b'` for an `in (...)` list.
    pub fn literal_list<'a>(&self, values: impl IntoIterator<Item = &'a str>) -> String {
        values
            .into_iter()
            .map(|v| self.literal(v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Physical analytics table for a program, e.g. `analytics_event_prga`.
    pub fn table_name(&self, analytics_type: AnalyticsType, program_uid: &str) -> String {
        self.tables.table_name(analytics_type, program_uid)
    }

    /// Row cap applied when no explicit limit or paging is requested.
    pub fn max_limit_plus_one(&self) -> Option<u64> {
        (self.max_limit > 0).then(|| self.max_limit + 1)
    }
}

/// One compiled select expression and the alias it is read back by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAndAlias {
    pub column: String,
    pub alias: String,
}

impl ColumnAndAlias {
    pub fn new(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            alias: alias.into(),
        }
    }

    /// Empty strings normalised to null, so they sort with `nulls last`.
    pub fn nullif_empty(dialect: &dyn Dialect, column: &str, alias: impl Into<String>) -> Self {
        Self::new(dialect.nullif_empty(column), alias)
    }

    /// `expr as "alias"`.
    pub fn render(&self, dialect: &dyn Dialect) -> String {
        format!("{} as {}", self.column, dialect.quote_ident(&self.alias))
    }
}

/// A select column plus how its values are presented and decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub select: ColumnAndAlias,
    pub header: GridHeader,
    pub decoder: ValueDecoder,
}

impl OutputColumn {
    pub fn new(select: ColumnAndAlias, header: GridHeader, decoder: ValueDecoder) -> Self {
        Self {
            select,
            header,
            decoder,
        }
    }

    pub fn alias(&self) -> &str {
        &self.select.alias
    }
}
