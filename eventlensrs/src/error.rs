use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("query runtime error [{code}]: {message}")]
    QueryRuntime { code: RuntimeCode, message: String },
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalyticsError {
    pub fn validation(code: ValidationCode, value: impl fmt::Display) -> Self {
        AnalyticsError::Validation(ValidationError::new(code, value))
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        AnalyticsError::Invariant(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AnalyticsError::Validation(_))
    }

    pub fn is_query_runtime(&self) -> bool {
        matches!(self, AnalyticsError::QueryRuntime { .. })
    }
}

/// A rejected request. Raised before any SQL is built and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {} (value: {value})", code.message())]
pub struct ValidationError {
    pub code: ValidationCode,
    pub value: String,
}

impl ValidationError {
    pub fn new(code: ValidationCode, value: impl fmt::Display) -> Self {
        Self {
            code,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
    NoOrgUnit,
    StartAfterEnd,
    DuplicateDimension,
    DuplicateItem,
    ValueDimensionAlsoItem,
    AggregationWithoutValue,
    NotAggregatable,
    LegendAndOptionSet,
    LimitAboveMax,
    NegativePaging,
    CoordinateFieldRequired,
    InvalidBbox,
    TimeFieldNotAllowed,
    NoPeriodOrDateRange,
    InvalidPeriod,
    InvalidFilter,
    NoProgram,
    PagingOutOfRange,
    MaxLimitExceeded,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::NoOrgUnit => "E7200",
            ValidationCode::StartAfterEnd => "E7201",
            ValidationCode::DuplicateDimension => "E7202",
            ValidationCode::DuplicateItem => "E7203",
            ValidationCode::ValueDimensionAlsoItem => "E7204",
            ValidationCode::AggregationWithoutValue => "E7205",
            ValidationCode::NotAggregatable => "E7206",
            ValidationCode::LegendAndOptionSet => "E7207",
            ValidationCode::LimitAboveMax => "E7208",
            ValidationCode::NegativePaging => "E7209",
            ValidationCode::CoordinateFieldRequired => "E7210",
            ValidationCode::InvalidBbox => "E7211",
            ValidationCode::TimeFieldNotAllowed => "E7212",
            ValidationCode::NoPeriodOrDateRange => "E7213",
            ValidationCode::InvalidPeriod => "E7214",
            ValidationCode::InvalidFilter => "E7215",
            ValidationCode::NoProgram => "E7216",
            ValidationCode::PagingOutOfRange => "E7217",
            ValidationCode::MaxLimitExceeded => "E7128",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ValidationCode::NoOrgUnit => "at least one organisation unit must be specified",
            ValidationCode::StartAfterEnd => "start date is after end date",
            ValidationCode::DuplicateDimension => "dimensions cannot be specified more than once",
            ValidationCode::DuplicateItem => "query items cannot be specified more than once",
            ValidationCode::ValueDimensionAlsoItem => {
                "value dimension cannot also be specified as an item or item filter"
            }
            ValidationCode::AggregationWithoutValue => {
                "value dimension or aggregate data must be specified when aggregation type is specified"
            }
            ValidationCode::NotAggregatable => "query item must be aggregatable when used in aggregate query",
            ValidationCode::LegendAndOptionSet => {
                "query item cannot specify both legend set and option set"
            }
            ValidationCode::LimitAboveMax => "limit is larger than the configured max limit",
            ValidationCode::NegativePaging => "page and page size must be zero or positive",
            ValidationCode::CoordinateFieldRequired => {
                "cluster and bbox queries require a coordinate field"
            }
            ValidationCode::InvalidBbox => "bbox must contain four comma separated numbers",
            ValidationCode::TimeFieldNotAllowed => "time field is not allowed for this query type",
            ValidationCode::NoPeriodOrDateRange => {
                "start and end date or at least one period must be specified"
            }
            ValidationCode::InvalidPeriod => "period identifier is not valid",
            ValidationCode::InvalidFilter => "query filter is not valid",
            ValidationCode::NoProgram => "program must be specified",
            ValidationCode::PagingOutOfRange => "page offset is too large",
            ValidationCode::MaxLimitExceeded => "query result set exceeded the max limit",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCode {
    /// Data store unreachable, pool exhausted or statement timed out.
    Resource,
    DivisionByZero,
    DataIntegrity,
}

impl fmt::Display for RuntimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            RuntimeCode::Resource => "E7131",
            RuntimeCode::DivisionByZero => "E7132",
            RuntimeCode::DataIntegrity => "E7133",
        };
        f.write_str(code)
    }
}
