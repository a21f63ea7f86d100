//! Select expressions for query items and dimensions.

use crate::error::Result;
use crate::grid::GridHeader;
use crate::materializer::ValueDecoder;
use crate::model::{
    AnalyticsType, Dimension, ProgramIndicator, QueryDescriptor, QueryItem, ValueType,
};
use crate::resolvers::ExpressionKind;

use super::{ColumnAndAlias, OutputColumn, SqlContext, DATE_PERIOD_STRUCT_ALIAS};

const SUBQUERY_ALIAS: &str = "subax";

/// Select expression (without alias) for an item, following the priority:
/// program indicator, coordinate, org unit, stage scoped, plain column.
pub fn item_expression(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    item: &QueryItem,
    analytics_type: AnalyticsType,
) -> Result<String> {
    if let Some(pi) = item.as_program_indicator() {
        return program_indicator_subquery(ctx, desc, pi, analytics_type);
    }
    Ok(match item.value_type {
        ValueType::Coordinate => ctx.dialect.coordinate(&ctx.col(item.column_name())),
        ValueType::OrganisationUnit => org_unit_expression(ctx, desc, item),
        _ if uses_stage_subquery(item, analytics_type) => {
            repeatable_stage_subquery(ctx, desc, item)
        }
        _ => ctx.col(item.column_name()),
    })
}

/// Expression used when filtering on an item. Org units compare on uid and
/// coordinates on the raw column rather than their display forms.
pub fn item_filter_expression(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    item: &QueryItem,
    analytics_type: AnalyticsType,
) -> Result<String> {
    match item.value_type {
        ValueType::OrganisationUnit | ValueType::Coordinate if !item.is_program_indicator() => {
            Ok(ctx.col(item.column_name()))
        }
        _ => item_expression(ctx, desc, item, analytics_type),
    }
}

pub fn item_column(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    item: &QueryItem,
    analytics_type: AnalyticsType,
) -> Result<ColumnAndAlias> {
    let alias = item_alias(item, analytics_type);
    let plain = !item.is_program_indicator()
        && !matches!(
            item.value_type,
            ValueType::Coordinate | ValueType::OrganisationUnit
        )
        && !uses_stage_subquery(item, analytics_type);

    if plain && item.value_type.is_text() && is_sorted_on(desc, item) {
        return Ok(ColumnAndAlias::nullif_empty(
            ctx.dialect.as_ref(),
            &ctx.col(item.column_name()),
            alias,
        ));
    }
    Ok(ColumnAndAlias::new(
        item_expression(ctx, desc, item, analytics_type)?,
        alias,
    ))
}

/// Output columns for every item, plus `<alias>.exists` row context columns
/// for repeatable stage items when requested.
pub fn item_output_columns(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> Result<Vec<OutputColumn>> {
    let mut columns = Vec::with_capacity(desc.items.len());
    for item in &desc.items {
        let select = item_column(ctx, desc, item, analytics_type)?;
        let header = item_header(item, &select.alias);
        columns.push(OutputColumn::new(select, header, ValueDecoder::for_item(item)));

        if desc.row_context && item.is_repeatable_stage() {
            let select = row_context_column(ctx, desc, item);
            let header = GridHeader::new(&select.alias, &select.alias, ValueType::Boolean).meta();
            columns.push(OutputColumn::new(
                select,
                header,
                ValueDecoder::new(ValueType::Boolean),
            ));
        }
    }
    Ok(columns)
}

pub fn item_header(item: &QueryItem, alias: &str) -> GridHeader {
    let label = if item.name.is_empty() {
        item.uid.as_str()
    } else {
        item.name.as_str()
    };
    let value_type = match item.value_type {
        ValueType::Coordinate | ValueType::OrganisationUnit => ValueType::Text,
        other => other,
    };
    let mut header = GridHeader::new(alias, label, value_type).meta();
    header.option_set = item.option_set.as_ref().map(|os| os.uid.clone());
    header.legend_set = item.legend_set.as_ref().map(|ls| ls.uid.clone());
    header
}

/// Alias the item is selected and read back under.
pub fn item_alias(item: &QueryItem, analytics_type: AnalyticsType) -> String {
    if uses_stage_subquery(item, analytics_type) && !item.is_program_indicator() {
        item.alias()
    } else {
        item.uid.clone()
    }
}

fn uses_stage_subquery(item: &QueryItem, analytics_type: AnalyticsType) -> bool {
    item.program_stage.is_some()
        && (item.is_repeatable_stage() || analytics_type == AnalyticsType::Enrollment)
}

fn is_sorted_on(desc: &QueryDescriptor, item: &QueryItem) -> bool {
    desc.asc
        .iter()
        .chain(desc.desc.iter())
        .any(|s| *s == item.uid)
}

fn org_unit_expression(ctx: &SqlContext, desc: &QueryDescriptor, item: &QueryItem) -> String {
    if desc.coordinate_field.as_deref() == Some(item.uid.as_str()) {
        let geometry = ctx.col(&format!("{}_geom", item.uid));
        ctx.dialect.coordinate(&ctx.dialect.centroid(&geometry))
    } else {
        ctx.col(&format!("{}_name", item.uid))
    }
}

/// Correlated sub-select over the indicator's own analytics table, joined
/// on the shared enrollment or event id.
pub fn program_indicator_subquery(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    pi: &ProgramIndicator,
    analytics_type: AnalyticsType,
) -> Result<String> {
    let (start, end) = (desc.earliest_start_date(), desc.latest_end_date());
    let expression =
        ctx.indicators
            .analytics_sql(&pi.expression, ExpressionKind::Numeric, pi, start, end)?;
    let value = ctx
        .dialect
        .render_aggregation(pi.aggregation_type_fallback(), &expression);
    let table = ctx.table_name(pi.analytics_type, &pi.program);

    let key = if pi.analytics_type == AnalyticsType::Event && analytics_type == AnalyticsType::Event
    {
        "psi"
    } else {
        "pi"
    };
    let mut sql = format!(
        "(select {value} from {table} as {SUBQUERY_ALIAS} where {}.{} = {}",
        SUBQUERY_ALIAS,
        ctx.quote(key),
        ctx.col(key)
    );
    if let Some(filter) = pi.filter.as_deref().filter(|f| !f.trim().is_empty()) {
        let filter =
            ctx.indicators
                .analytics_sql(filter, ExpressionKind::Boolean, pi, start, end)?;
        sql.push_str(&format!(" and ({filter})"));
    }
    sql.push(')');
    Ok(sql)
}

/// Value of the item from the latest (or offset) event of its stage.
pub fn repeatable_stage_subquery(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    item: &QueryItem,
) -> String {
    let (order, offset) = stage_ordering(item.stage_offset);
    format!(
        "(select {column} {from_where} order by {date} {order} limit 1 offset {offset})",
        column = ctx.quote(item.column_name()),
        from_where = stage_from_where(ctx, desc, item),
        date = ctx.quote("executiondate"),
    )
}

/// `exists(...) as "<alias>.exists"`.
pub fn row_context_column(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    item: &QueryItem,
) -> ColumnAndAlias {
    ColumnAndAlias::new(
        format!(
            "exists(select {} {})",
            ctx.quote(item.column_name()),
            stage_from_where(ctx, desc, item)
        ),
        format!("{}.exists", item.alias()),
    )
}

fn stage_from_where(ctx: &SqlContext, desc: &QueryDescriptor, item: &QueryItem) -> String {
    let program = item.program.as_ref().unwrap_or(&desc.program);
    let table = ctx.table_name(AnalyticsType::Event, &program.uid);
    let column = ctx.quote(item.column_name());
    let stage = item
        .program_stage
        .as_ref()
        .map(|s| s.uid.as_str())
        .unwrap_or_default();
    format!(
        "from {table} where {table}.{pi} = {outer_pi} and {column} is not null and {ps} = {stage}",
        pi = ctx.quote("pi"),
        outer_pi = ctx.col("pi"),
        ps = ctx.quote("ps"),
        stage = ctx.literal(stage),
    )
}

/// 0 is the latest event, -n the n-th before it, +n the n-th from the start.
fn stage_ordering(offset: i32) -> (&'static str, u32) {
    if offset > 0 {
        ("asc", offset.unsigned_abs() - 1)
    } else {
        ("desc", offset.unsigned_abs())
    }
}

/// Select expression of a dimension column.
pub fn dimension_expression(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    dimension: &Dimension,
    analytics_type: AnalyticsType,
) -> String {
    if dimension.is_period() {
        let column = period_column(dimension);
        if desc.has_time_field(analytics_type) {
            return ctx.dialect.qualified(DATE_PERIOD_STRUCT_ALIAS, &column);
        }
        return ctx.col(&column);
    }
    ctx.col(dimension.dimension_name())
}

/// Period type column of a period dimension, e.g. `monthly`.
pub fn period_column(dimension: &Dimension) -> String {
    match &dimension.column {
        Some(column) => column.clone(),
        None => dimension
            .period_items()
            .next()
            .map(|p| p.period_type().column().to_string())
            .unwrap_or_else(|| dimension.uid.clone()),
    }
}

pub fn dimension_output_columns(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> Vec<OutputColumn> {
    desc.dimensions
        .iter()
        .map(|dim| {
            let select = ColumnAndAlias::new(
                dimension_expression(ctx, desc, dim, analytics_type),
                dim.uid.clone(),
            );
            let header = GridHeader::new(&dim.uid, &dim.uid, ValueType::Text).meta();
            OutputColumn::new(select, header, ValueDecoder::new(ValueType::Text))
        })
        .collect()
}
