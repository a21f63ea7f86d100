//! Domain model: descriptors, dimensions, items and periods.

pub mod descriptor;
pub mod dimension;
pub mod item;
pub mod period;
pub mod types;

pub use descriptor::{Partitions, QueryDescriptor};
pub use dimension::{
    Dimension, DimensionItem, DimensionOption, DimensionType, OrgUnit, DATA_X_DIM_ID,
    ORGUNIT_DIM_ID, PERIOD_DIM_ID,
};
pub use item::{
    AnalyticsPeriodBoundary, BoundaryTarget, BoundaryType, ItemKind, Legend, LegendSet,
    OptionItem, OptionSet, Program, ProgramIndicator, ProgramStage, QueryFilter, QueryItem,
    QueryOperator, NV, OPTION_SEP,
};
pub use period::{DateRange, Period, PeriodType};
pub use types::{
    AggregationType, AnalyticsType, EnrollmentStatus, EventStatus, IdScheme,
    OrgUnitSelectionMode, OutputType, QueryMode, SortOrder, TimeField, ValueType,
};
