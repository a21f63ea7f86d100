//! Yearly partitions a descriptor needs, and their intersection with the
//! partitions that physically exist.

use std::collections::BTreeSet;

use chrono::Datelike;

use crate::model::{AnalyticsType, Partitions, QueryDescriptor};
use crate::resolvers::PartitionCatalog;

/// Rows older than this many years are outside the first/last value window.
pub const LAST_VALUE_YEARS: i32 = 10;

/// Years touched by the periods, date ranges, indicator boundaries and the
/// first/last value window of a descriptor.
pub fn requested_years(desc: &QueryDescriptor, analytics_type: AnalyticsType) -> Partitions {
    let mut years = BTreeSet::new();

    for period in desc.all_periods() {
        years.extend(period.years());
    }
    if let (Some(start), Some(end)) = (desc.start_date, desc.end_date) {
        years.extend(start.year()..=end.year());
    }
    for range in desc.time_date_ranges.values().flatten() {
        years.extend(range.start.year()..=range.end.year());
    }

    if let (Some(start), Some(end)) = (desc.earliest_start_date(), desc.latest_end_date()) {
        if let Some(pi) = desc
            .program_indicator
            .as_ref()
            .filter(|pi| pi.has_non_default_boundaries())
        {
            for boundary in &pi.boundaries {
                let date = boundary.boundary_date(start, end);
                let (from, to) = if date < start {
                    (date.year(), start.year())
                } else {
                    (end.year(), date.year())
                };
                years.extend(from..=to);
            }
        }
        if desc.is_first_or_last_period_aggregation() {
            years.extend((end.year() - LAST_VALUE_YEARS)..=end.year());
        }
    }

    tracing::trace!(
        analytics_type = ?analytics_type,
        years = ?years,
        "requested partitions"
    );
    Partitions::new(years)
}

/// Requested years that exist for `table`.
pub fn existing_partitions(
    catalog: &dyn PartitionCatalog,
    table: &str,
    requested: &Partitions,
) -> Partitions {
    requested.retain(|year| catalog.has_partition(table, year))
}
