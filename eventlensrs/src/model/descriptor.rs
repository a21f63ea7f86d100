//! The immutable description of one logical analytical query.
//!
//! Descriptors are never mutated in place: every `with_*` call returns a new
//! value, so the planner can fan one request out into many independently
//! executed descriptors without sharing mutable state.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::dimension::{Dimension, OrgUnit, ORGUNIT_DIM_ID, PERIOD_DIM_ID};
use super::item::{OptionItem, Program, ProgramIndicator, ProgramStage, QueryItem};
use super::period::{DateRange, Period};
use super::types::{
    AggregationType, AnalyticsType, EnrollmentStatus, EventStatus, IdScheme, OrgUnitSelectionMode,
    OutputType, QueryMode, SortOrder, TimeField,
};

/// Yearly partitions a descriptor scans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partitions(BTreeSet<i32>);

impl Partitions {
    pub fn new(years: impl IntoIterator<Item = i32>) -> Self {
        Self(years.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, year: i32) -> bool {
        self.0.contains(&year)
    }

    pub fn as_strings(&self) -> Vec<String> {
        self.0.iter().map(|y| y.to_string()).collect()
    }

    pub fn union(&self, other: &Partitions) -> Partitions {
        Partitions(self.0.union(&other.0).copied().collect())
    }

    pub fn retain(&self, keep: impl Fn(i32) -> bool) -> Partitions {
        Partitions(self.0.iter().copied().filter(|y| keep(*y)).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub mode: QueryMode,
    pub program: Program,
    #[serde(default)]
    pub program_stage: Option<ProgramStage>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub filters: Vec<Dimension>,
    #[serde(default)]
    pub items: Vec<QueryItem>,
    #[serde(default)]
    pub item_filters: Vec<QueryItem>,
    /// Value dimension aggregated by `aggregation_type`.
    #[serde(default)]
    pub value: Option<QueryItem>,
    /// Program indicator dimension; its expression is the aggregated value.
    #[serde(default)]
    pub program_indicator: Option<ProgramIndicator>,
    /// Restricts the value dimension to a single option code.
    #[serde(default)]
    pub option: Option<OptionItem>,
    #[serde(default)]
    pub aggregation_type: Option<AggregationType>,
    #[serde(default)]
    pub output_type: OutputType,
    #[serde(default)]
    pub time_field: Option<TimeField>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Additional date windows keyed by the date they apply to.
    #[serde(default)]
    pub time_date_ranges: BTreeMap<TimeField, Vec<DateRange>>,
    #[serde(default)]
    pub org_unit_mode: OrgUnitSelectionMode,
    #[serde(default)]
    pub event_statuses: Vec<EventStatus>,
    #[serde(default)]
    pub enrollment_statuses: Vec<EnrollmentStatus>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
    /// Compute the total row count for the pager.
    #[serde(default = "default_true")]
    pub total_pages: bool,
    #[serde(default)]
    pub asc: Vec<String>,
    #[serde(default)]
    pub desc: Vec<String>,
    /// Sort order of the aggregated value.
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub output_id_scheme: Option<IdScheme>,
    #[serde(default)]
    pub coordinate_field: Option<String>,
    #[serde(default)]
    pub cluster_size: Option<u64>,
    #[serde(default)]
    pub bbox: Option<String>,
    #[serde(default)]
    pub include_cluster_points: bool,
    /// Resolved by the planner.
    #[serde(default)]
    pub table_name: Option<String>,
    /// Resolved by the planner.
    #[serde(default)]
    pub partitions: Option<Partitions>,
    #[serde(default)]
    pub skip_data: bool,
    #[serde(default)]
    pub skip_meta: bool,
    #[serde(default)]
    pub skip_rounding: bool,
    #[serde(default)]
    pub skip_partitioning: bool,
    #[serde(default)]
    pub collapse_data_dimensions: bool,
    #[serde(default)]
    pub aggregate_data: bool,
    #[serde(default)]
    pub row_context: bool,
    #[serde(default)]
    pub geometry_only: bool,
    #[serde(default)]
    pub coordinates_only: bool,
    #[serde(default)]
    pub completed_only: bool,
}

fn default_true() -> bool {
    true
}

impl QueryDescriptor {
    pub fn new(mode: QueryMode, program: Program) -> Self {
        Self {
            mode,
            program,
            program_stage: None,
            dimensions: Vec::new(),
            filters: Vec::new(),
            items: Vec::new(),
            item_filters: Vec::new(),
            value: None,
            program_indicator: None,
            option: None,
            aggregation_type: None,
            output_type: OutputType::Event,
            time_field: None,
            start_date: None,
            end_date: None,
            time_date_ranges: BTreeMap::new(),
            org_unit_mode: OrgUnitSelectionMode::Descendants,
            event_statuses: Vec::new(),
            enrollment_statuses: Vec::new(),
            page: None,
            page_size: None,
            total_pages: true,
            asc: Vec::new(),
            desc: Vec::new(),
            sort_order: None,
            limit: None,
            output_id_scheme: None,
            coordinate_field: None,
            cluster_size: None,
            bbox: None,
            include_cluster_points: false,
            table_name: None,
            partitions: None,
            skip_data: false,
            skip_meta: false,
            skip_rounding: false,
            skip_partitioning: false,
            collapse_data_dimensions: false,
            aggregate_data: false,
            row_context: false,
            geometry_only: false,
            coordinates_only: false,
            completed_only: false,
        }
    }

    // ====================================================================
    // Functional updates
    // ====================================================================

    pub fn with_program(&self, program: Program) -> Self {
        Self {
            program,
            ..self.clone()
        }
    }

    pub fn with_dimension(&self, dimension: Dimension) -> Self {
        let mut dimensions = self.dimensions.clone();
        dimensions.push(dimension);
        Self {
            dimensions,
            ..self.clone()
        }
    }

    pub fn with_filter(&self, filter: Dimension) -> Self {
        let mut filters = self.filters.clone();
        filters.push(filter);
        Self {
            filters,
            ..self.clone()
        }
    }

    /// Replace the dimension with the same uid.
    pub fn with_replaced_dimension(&self, dimension: Dimension) -> Self {
        let dimensions = self
            .dimensions
            .iter()
            .map(|d| {
                if d.uid == dimension.uid {
                    dimension.clone()
                } else {
                    d.clone()
                }
            })
            .collect();
        Self {
            dimensions,
            ..self.clone()
        }
    }

    pub fn with_item(&self, item: QueryItem) -> Self {
        let mut items = self.items.clone();
        items.push(item);
        Self {
            items,
            ..self.clone()
        }
    }

    pub fn with_items(&self, items: Vec<QueryItem>) -> Self {
        Self {
            items,
            ..self.clone()
        }
    }

    pub fn with_item_filter(&self, item: QueryItem) -> Self {
        let mut item_filters = self.item_filters.clone();
        item_filters.push(item);
        Self {
            item_filters,
            ..self.clone()
        }
    }

    pub fn with_value(&self, value: Option<QueryItem>) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    pub fn with_program_indicator(&self, program_indicator: Option<ProgramIndicator>) -> Self {
        Self {
            program_indicator,
            ..self.clone()
        }
    }

    pub fn with_aggregation_type(&self, aggregation_type: Option<AggregationType>) -> Self {
        Self {
            aggregation_type,
            ..self.clone()
        }
    }

    pub fn with_dates(&self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..self.clone()
        }
    }

    pub fn with_time_field(&self, time_field: Option<TimeField>) -> Self {
        Self {
            time_field,
            ..self.clone()
        }
    }

    pub fn with_table(&self, table_name: String, partitions: Partitions) -> Self {
        Self {
            table_name: Some(table_name),
            partitions: Some(partitions),
            ..self.clone()
        }
    }

    pub fn with_paging(&self, page: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            page,
            page_size,
            ..self.clone()
        }
    }

    // ====================================================================
    // Value / indicator
    // ====================================================================

    pub fn has_value_dimension(&self) -> bool {
        self.value.is_some()
    }

    pub fn has_program_indicator_dimension(&self) -> bool {
        self.program_indicator.is_some()
    }

    pub fn has_non_default_boundaries(&self) -> bool {
        self.program_indicator
            .as_ref()
            .map(ProgramIndicator::has_non_default_boundaries)
            .unwrap_or(false)
    }

    /// Aggregation applied to the value dimension; average when unset.
    pub fn aggregation_type_fallback(&self) -> AggregationType {
        self.aggregation_type
            .or_else(|| self.value.as_ref().and_then(|v| v.aggregation_type))
            .unwrap_or(AggregationType::Average)
    }

    pub fn is_first_or_last_period_aggregation(&self) -> bool {
        (self.has_value_dimension() || self.has_program_indicator_dimension())
            && self.aggregation_type_fallback().is_first_or_last_period()
    }

    /// Aggregation switched off: the value column is returned per row.
    pub fn is_aggregation_disabled(&self) -> bool {
        self.aggregation_type == Some(AggregationType::None)
    }

    pub fn items_and_item_filters(&self) -> impl Iterator<Item = &QueryItem> {
        self.items.iter().chain(self.item_filters.iter())
    }

    // ====================================================================
    // Dimensions
    // ====================================================================

    pub fn dimensions_and_filters(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter().chain(self.filters.iter())
    }

    pub fn dimension(&self, uid: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.uid == uid)
    }

    pub fn filter(&self, uid: &str) -> Option<&Dimension> {
        self.filters.iter().find(|d| d.uid == uid)
    }

    pub fn period_dimension(&self) -> Option<&Dimension> {
        self.dimension(PERIOD_DIM_ID)
    }

    pub fn non_period_dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.iter().filter(|d| !d.is_period())
    }

    pub fn periods(&self) -> Vec<&Period> {
        self.period_dimension()
            .map(|d| d.period_items().collect())
            .unwrap_or_default()
    }

    pub fn filter_periods(&self) -> Vec<&Period> {
        self.filter(PERIOD_DIM_ID)
            .map(|d| d.period_items().collect())
            .unwrap_or_default()
    }

    pub fn all_periods(&self) -> Vec<&Period> {
        let mut periods = self.periods();
        periods.extend(self.filter_periods());
        periods
    }

    pub fn has_periods(&self) -> bool {
        !self.periods().is_empty()
    }

    pub fn has_filter_periods(&self) -> bool {
        !self.filter_periods().is_empty()
    }

    pub fn has_single_period(&self) -> bool {
        self.periods().len() == 1
    }

    /// Org units of the `ou` dimension or filter.
    pub fn org_units(&self) -> Vec<&OrgUnit> {
        self.dimensions_and_filters()
            .filter(|d| d.uid == ORGUNIT_DIM_ID)
            .flat_map(|d| d.org_unit_items())
            .collect()
    }

    pub fn has_org_units(&self) -> bool {
        !self.org_units().is_empty()
    }

    // ====================================================================
    // Time
    // ====================================================================

    pub fn has_start_end_date(&self) -> bool {
        self.start_date.is_some() && self.end_date.is_some()
    }

    pub fn has_time_date_ranges(&self) -> bool {
        self.has_start_end_date() || self.time_date_ranges.values().any(|r| !r.is_empty())
    }

    /// Earliest date the query can touch, from dates or periods.
    pub fn earliest_start_date(&self) -> Option<NaiveDate> {
        let periods = self.all_periods().into_iter().map(Period::start);
        let ranges = self.time_date_ranges.values().flatten().map(|r| r.start);
        self.start_date.into_iter().chain(periods).chain(ranges).min()
    }

    pub fn latest_end_date(&self) -> Option<NaiveDate> {
        let periods = self.all_periods().into_iter().map(Period::end);
        let ranges = self.time_date_ranges.values().flatten().map(|r| r.end);
        self.end_date.into_iter().chain(periods).chain(ranges).max()
    }

    /// True when a time field other than the type default was requested.
    pub fn has_time_field(&self, analytics_type: AnalyticsType) -> bool {
        match self.time_field {
            Some(field) => field != TimeField::default_for(analytics_type),
            None => false,
        }
    }

    pub fn time_field_or_default(&self, analytics_type: AnalyticsType) -> TimeField {
        self.time_field
            .unwrap_or_else(|| TimeField::default_for(analytics_type))
    }

    // ====================================================================
    // Paging / sorting
    // ====================================================================

    pub fn is_paging(&self) -> bool {
        self.page.is_some() || self.page_size.is_some()
    }

    pub fn page_with_default(&self) -> i64 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    pub fn page_size_with_default(&self, default_page_size: u64) -> i64 {
        self.page_size
            .filter(|s| *s > 0)
            .unwrap_or(default_page_size as i64)
    }

    /// Row offset of the requested page, saturating at `i64::MAX`.
    pub fn offset(&self, default_page_size: u64) -> i64 {
        (self.page_with_default() - 1).saturating_mul(self.page_size_with_default(default_page_size))
    }

    pub fn is_sorting(&self) -> bool {
        !self.asc.is_empty() || !self.desc.is_empty()
    }

    pub fn has_partitions(&self) -> bool {
        self.partitions.as_ref().map(|p| !p.is_empty()).unwrap_or(false)
    }

    pub fn has_coordinate_field(&self) -> bool {
        self.coordinate_field.is_some()
    }

    /// Deterministic key for an external cache collaborator.
    pub fn key(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}
