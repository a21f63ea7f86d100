//! WHERE fragments for the time dimension.
//!
//! Exactly one of three modes applies to a descriptor, checked in order:
//! non-default indicator boundaries, explicit date ranges, enumerated
//! periods. Everything here is a pure function of the descriptor.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{AnalyticsError, Result};
use crate::model::{
    AnalyticsPeriodBoundary, AnalyticsType, BoundaryTarget, DateRange, PeriodType,
    QueryDescriptor,
};
use crate::query_builder::{SqlContext, DATE_PERIOD_STRUCT_ALIAS};
use crate::sql_ast::or_group;

const EVENT_ALIAS: &str = "evt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    Boundaries,
    DateRanges,
    Periods,
}

pub fn time_mode(desc: &QueryDescriptor) -> TimeMode {
    if desc.has_non_default_boundaries() {
        TimeMode::Boundaries
    } else if desc.has_time_date_ranges() {
        TimeMode::DateRanges
    } else {
        TimeMode::Periods
    }
}

/// Time predicate, or `None` when the descriptor has no time constraint.
pub fn time_condition(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> Result<Option<String>> {
    match time_mode(desc) {
        TimeMode::Boundaries => boundary_condition(ctx, desc, analytics_type).map(Some),
        TimeMode::DateRanges => Ok(Some(date_range_condition(ctx, desc, analytics_type))),
        TimeMode::Periods => Ok(period_condition(ctx, desc, analytics_type)),
    }
}

fn boundary_condition(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> Result<String> {
    let pi = desc
        .program_indicator
        .as_ref()
        .ok_or_else(|| AnalyticsError::invariant("boundaries without a program indicator"))?;
    let (start, end) = match (desc.earliest_start_date(), desc.latest_end_date()) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(AnalyticsError::invariant(format!(
                "program indicator {} has boundaries but no reporting period",
                pi.uid
            )))
        }
    };
    let parts: Vec<String> = pi
        .boundaries
        .iter()
        .map(|b| boundary_predicate(ctx, desc, b, analytics_type, start, end))
        .collect();
    Ok(parts.join(" and "))
}

fn boundary_predicate(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    boundary: &AnalyticsPeriodBoundary,
    analytics_type: AnalyticsType,
    start: NaiveDate,
    end: NaiveDate,
) -> String {
    let op = if boundary.is_end_boundary() { "<" } else { ">=" };
    let date = ctx.literal(&boundary.comparison_date(start, end).to_string());
    let column = boundary.target.column();

    let event_scoped = matches!(
        boundary.target,
        BoundaryTarget::EventDate | BoundaryTarget::StageEventDate(_)
    );
    if analytics_type == AnalyticsType::Enrollment && event_scoped {
        let table = ctx.table_name(AnalyticsType::Event, &desc.program.uid);
        let evt = |c: &str| ctx.dialect.qualified(EVENT_ALIAS, c);
        let stage = match &boundary.target {
            BoundaryTarget::StageEventDate(ps) => {
                format!(" and {} = {}", evt("ps"), ctx.literal(ps))
            }
            _ => String::new(),
        };
        format!(
            "exists(select 1 from {table} as {EVENT_ALIAS} where {} = {}{stage} and {} {op} {date})",
            evt("pi"),
            ctx.col("pi"),
            evt(column),
        )
    } else {
        format!("{} {op} {date}", ctx.col(column))
    }
}

fn range_predicate(ctx: &SqlContext, column: &str, range: &DateRange) -> String {
    format!(
        "{column} >= {} and {column} < {}",
        ctx.literal(&range.start.to_string()),
        ctx.literal(&range.end_exclusive().to_string())
    )
}

/// Ranges on one column are alternatives; each is parenthesised when ORed.
fn ranges_predicate(ctx: &SqlContext, column: &str, ranges: &[DateRange]) -> String {
    match ranges {
        [single] => range_predicate(ctx, column, single),
        many => {
            let parts: Vec<String> = many
                .iter()
                .map(|r| format!("({})", range_predicate(ctx, column, r)))
                .collect();
            or_group(&parts)
        }
    }
}

fn date_range_condition(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> String {
    let mut parts = Vec::new();
    if let (Some(start), Some(end)) = (desc.start_date, desc.end_date) {
        let column = ctx.col(desc.time_field_or_default(analytics_type).column());
        parts.push(range_predicate(ctx, &column, &DateRange::new(start, end)));
    }
    for (field, ranges) in desc.time_date_ranges.iter().filter(|(_, r)| !r.is_empty()) {
        parts.push(ranges_predicate(ctx, &ctx.col(field.column()), ranges));
    }
    parts.join(" and ")
}

fn period_condition(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> Option<String> {
    let periods = desc.all_periods();
    if periods.is_empty() {
        return None;
    }

    if desc.has_time_field(analytics_type) {
        let column = ctx.col(desc.time_field_or_default(analytics_type).column());
        let ranges: Vec<DateRange> = periods.iter().map(|p| p.range()).collect();
        return Some(ranges_predicate(ctx, &column, &ranges));
    }

    let mut by_type: BTreeMap<PeriodType, Vec<&str>> = BTreeMap::new();
    for period in &periods {
        let isos = by_type.entry(period.period_type()).or_default();
        if !isos.contains(&period.iso()) {
            isos.push(period.iso());
        }
    }
    let parts: Vec<String> = by_type
        .into_iter()
        .map(|(period_type, isos)| {
            format!(
                "{} in ({})",
                ctx.col(period_type.column()),
                ctx.literal_list(isos)
            )
        })
        .collect();
    Some(or_group(&parts))
}

/// Yearly partition pruning; skipped whenever time is constrained on
/// something other than the default period columns.
pub fn partition_condition(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> Option<String> {
    let partitions = desc.partitions.as_ref().filter(|p| !p.is_empty())?;
    if desc.skip_partitioning
        || desc.has_time_date_ranges()
        || desc.has_non_default_boundaries()
        || desc.has_time_field(analytics_type)
        || desc.is_first_or_last_period_aggregation()
    {
        return None;
    }
    let years = partitions.as_strings();
    Some(format!(
        "{} in ({})",
        ctx.col(PeriodType::Yearly.column()),
        ctx.literal_list(years.iter().map(String::as_str))
    ))
}

/// Join mapping a non-default time field to its period columns.
pub fn date_period_join(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> Option<String> {
    if !desc.has_time_field(analytics_type) {
        return None;
    }
    let column = ctx.col(desc.time_field_or_default(analytics_type).column());
    Some(format!(
        "left join {} as {DATE_PERIOD_STRUCT_ALIAS} on {} = {}",
        ctx.tables.date_period_table,
        ctx.dialect.cast_date(&column),
        ctx.dialect.qualified(DATE_PERIOD_STRUCT_ALIAS, "dateperiod")
    ))
}
