//! Aggregate value expression, grouping columns and the ranked source used
//! by first/last value aggregation.

use crate::error::{AnalyticsError, Result};
use crate::grid::GridHeader;
use crate::materializer::ValueDecoder;
use crate::model::{AggregationType, AnalyticsType, QueryDescriptor, ValueType};
use crate::planner::scope::{CountTarget, IndicatorScope};
use crate::resolvers::ExpressionKind;

use super::columns::{dimension_expression, item_column, item_header};
use super::{ColumnAndAlias, OutputColumn, SqlContext, ANALYTICS_TBL_ALIAS};

/// Alias of the aggregated value column.
pub const VALUE_ALIAS: &str = "value";

/// Rank column produced by the first/last value sub-query.
pub const RANK_COLUMN: &str = "pe_rank";

/// The aggregated value expression:
/// - the raw value column when aggregation is disabled,
/// - `fn(value)` for a value dimension,
/// - `fn(expression)` for a program indicator with an expression,
/// - otherwise a count whose target follows the indicator scope.
pub fn aggregate_clause(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    scope: &IndicatorScope,
) -> Result<String> {
    let disabled = desc.is_aggregation_disabled();

    if let Some(value) = &desc.value {
        let column = ctx.col(value.column_name());
        if disabled {
            return Ok(column);
        }
        return Ok(ctx
            .dialect
            .render_aggregation(desc.aggregation_type_fallback(), &column));
    }

    if let Some(pi) = desc.program_indicator.as_ref().filter(|pi| pi.has_expression()) {
        let expression = ctx.indicators.analytics_sql(
            &pi.expression,
            ExpressionKind::Numeric,
            pi,
            desc.earliest_start_date(),
            desc.latest_end_date(),
        )?;
        if disabled {
            return Ok(expression);
        }
        // The indicator decides its own aggregation.
        return Ok(ctx
            .dialect
            .render_aggregation(pi.aggregation_type_fallback(), &expression));
    }

    Ok(count_expression(ctx, scope))
}

pub fn count_expression(ctx: &SqlContext, scope: &IndicatorScope) -> String {
    match scope.count {
        CountTarget::DistinctTrackedEntities if scope.enrollment_indicator => {
            "count(distinct tei)".to_string()
        }
        CountTarget::DistinctTrackedEntities => format!("count(distinct {})", ctx.col("tei")),
        CountTarget::Enrollments => format!("count({})", ctx.col("pi")),
        CountTarget::DistinctEnrollments => format!("count(distinct {})", ctx.col("pi")),
        CountTarget::Events => format!("count({})", ctx.col("psi")),
    }
}

/// Dimension and item columns of an aggregate statement, in select order.
///
/// With non-default boundaries the reporting period is fixed, so the period
/// dimension is selected as a literal and must hold exactly one period.
pub fn aggregate_output_columns(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> Result<Vec<OutputColumn>> {
    let mut columns = Vec::new();
    for dim in &desc.dimensions {
        let expr = if dim.is_period() && desc.has_non_default_boundaries() {
            let periods: Vec<_> = dim.period_items().collect();
            match periods.as_slice() {
                [single] => ctx.literal(single.iso()),
                _ => {
                    return Err(AnalyticsError::invariant(format!(
                        "non-default boundaries need exactly one period, got {}",
                        periods.len()
                    )))
                }
            }
        } else {
            dimension_expression(ctx, desc, dim, analytics_type)
        };
        columns.push(OutputColumn::new(
            ColumnAndAlias::new(expr, dim.uid.clone()),
            GridHeader::new(&dim.uid, &dim.uid, ValueType::Text).meta(),
            ValueDecoder::new(ValueType::Text),
        ));
    }
    for item in &desc.items {
        let select = item_column(ctx, desc, item, analytics_type)?;
        let header = item_header(item, &select.alias);
        columns.push(OutputColumn::new(select, header, ValueDecoder::for_item(item)));
    }
    Ok(columns)
}

/// Group-by expressions; empty when aggregation is disabled.
pub fn group_by_columns(
    desc: &QueryDescriptor,
    columns: &[OutputColumn],
) -> Vec<String> {
    if desc.is_aggregation_disabled() {
        return Vec::new();
    }
    let boundaries = desc.has_non_default_boundaries();
    desc.dimensions
        .iter()
        .map(|d| d.is_period())
        .chain(std::iter::repeat(false))
        .zip(columns)
        .filter(|(is_period, _)| !(boundaries && *is_period))
        .map(|(_, c)| c.select.column.clone())
        .collect()
}

/// Ranked sub-query replacing the analytics table for first/last value
/// aggregation: rows of the last ten years, ranked per group by time.
pub fn last_value_source(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    table: &str,
    analytics_type: AnalyticsType,
) -> Result<String> {
    let latest = desc.latest_end_date().ok_or_else(|| {
        AnalyticsError::invariant("first/last value aggregation requires a reporting period")
    })?;
    let aggregation = desc.aggregation_type_fallback();
    let direction = if aggregation.is_first_period() {
        "asc"
    } else {
        "desc"
    };

    let partition_columns: Vec<String> = if aggregation.ranks_all_dimensions() {
        desc.non_period_dimensions()
            .map(|d| ctx.col(d.dimension_name()))
            .collect()
    } else {
        vec![ctx.col("ou"), ctx.col("ao")]
    };
    let partition = if partition_columns.is_empty() {
        String::new()
    } else {
        format!("partition by {} ", partition_columns.join(","))
    };

    let time = ctx.col(desc.time_field_or_default(analytics_type).column());
    let latest = latest.to_string();
    let mut window = format!(
        "{time} >= {} and {time} <= {}",
        ctx.dialect.ten_years_before(&latest),
        ctx.literal(&latest)
    );
    if let Some(value) = &desc.value {
        window.push_str(&format!(" and {} is not null", ctx.col(value.column_name())));
    }

    Ok(format!(
        "(select *, row_number() over ({partition}order by {time} {direction}, {} {direction}) as {} from {table} as {ANALYTICS_TBL_ALIAS} where {window}) as {ANALYTICS_TBL_ALIAS}",
        ctx.col("created"),
        ctx.quote(RANK_COLUMN),
    ))
}

/// `ax."pe_rank" = 1`
pub fn rank_condition(ctx: &SqlContext) -> String {
    format!("{} = 1", ctx.col(RANK_COLUMN))
}

/// Effective aggregation of the value, for the grid value type.
pub fn value_aggregation(desc: &QueryDescriptor) -> Option<AggregationType> {
    if desc.has_value_dimension() {
        Some(desc.aggregation_type_fallback())
    } else {
        desc.program_indicator
            .as_ref()
            .map(|pi| pi.aggregation_type_fallback())
    }
}
