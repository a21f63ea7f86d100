//! Statement composition per analytics table type.
//!
//! [`AnalyticsManager`] is a template: implementors supply the table type,
//! the standard row-list columns and the few predicates only their table
//! has; the provided methods compose select, from, where, group by, order
//! and paging into complete statements.

use std::time::{Duration, Instant};

use crate::backends::BackendConnection;
use crate::error::{AnalyticsError, Result, RuntimeCode};
use crate::executor::{BackendFailure, FailureKind, QueryOutcome};
use crate::grid::GridHeader;
use crate::labels::header_label;
use crate::materializer::{ValueDecoder, COORDINATE_DECIMALS};
use crate::model::{
    AggregationType, AnalyticsType, QueryDescriptor, QueryMode, SortOrder, ValueType,
};
use crate::planner::scope::indicator_scope;
use crate::query_builder::aggregate::{
    aggregate_clause, aggregate_output_columns, group_by_columns, last_value_source,
    rank_condition, value_aggregation, VALUE_ALIAS,
};
use crate::query_builder::columns::{dimension_output_columns, item_output_columns};
use crate::query_builder::filters::{
    dimension_conditions, item_filter_conditions, option_condition, org_unit_condition,
};
use crate::query_builder::{ColumnAndAlias, OutputColumn, SqlContext, ANALYTICS_TBL_ALIAS};
use crate::resolvers::ExpressionKind;
use crate::sql_ast::{Conditions, OrderItem, SelectStatement};
use crate::time_field::{date_period_join, partition_condition, time_condition};

mod enrollment;
mod event;

pub use enrollment::EnrollmentManager;
pub use event::EventManager;

/// Geometry column used when no coordinate field is given.
pub const DEFAULT_GEOMETRY_COLUMN: &str = "geometry";

/// A statement and the columns its rows are decoded by, in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub columns: Vec<OutputColumn>,
}

impl CompiledQuery {
    pub fn headers(&self) -> Vec<GridHeader> {
        self.columns.iter().map(|c| c.header.clone()).collect()
    }
}

pub trait AnalyticsManager: Send + Sync {
    fn analytics_type(&self) -> AnalyticsType;

    fn context(&self) -> &SqlContext;

    /// Fixed leading columns of a row-list statement.
    fn standard_columns(&self, desc: &QueryDescriptor) -> Vec<OutputColumn>;

    /// Program stage predicate; only event rows carry a stage.
    fn stage_condition(&self, _desc: &QueryDescriptor) -> Option<String> {
        None
    }

    /// Event and enrollment status predicates.
    fn status_conditions(&self, desc: &QueryDescriptor) -> Vec<String>;

    /// Physical table the descriptor is bound to.
    fn table(&self, desc: &QueryDescriptor) -> String {
        desc.table_name
            .clone()
            .unwrap_or_else(|| self.context().table_name(self.analytics_type(), &desc.program.uid))
    }

    fn from_clause(&self, desc: &QueryDescriptor) -> Result<String> {
        let ctx = self.context();
        let analytics_type = self.analytics_type();
        let table = self.table(desc);
        let mut from = if uses_last_value_source(desc) {
            last_value_source(ctx, desc, &table, analytics_type)?
        } else {
            format!("{table} as {ANALYTICS_TBL_ALIAS}")
        };
        if let Some(join) = date_period_join(ctx, desc, analytics_type) {
            from.push(' ');
            from.push_str(&join);
        }
        Ok(from)
    }

    fn where_clause(&self, desc: &QueryDescriptor) -> Result<Conditions> {
        let ctx = self.context();
        let analytics_type = self.analytics_type();
        let mut conditions = Conditions::new();

        // The ranked source already windows time; an outer period predicate
        // would drop values carried forward from earlier periods.
        if !uses_last_value_source(desc) {
            if let Some(time) = time_condition(ctx, desc, analytics_type)? {
                conditions.push(time);
            }
        }
        if let Some(ou) = org_unit_condition(ctx, desc) {
            conditions.push(ou);
        }
        conditions.extend(dimension_conditions(ctx, desc));
        if let Some(stage) = self.stage_condition(desc) {
            conditions.push(stage);
        }
        conditions.extend(item_filter_conditions(ctx, desc, analytics_type)?);
        if let Some(option) = option_condition(ctx, desc) {
            conditions.push(option);
        }
        if let Some(filter) = indicator_filter_condition(ctx, desc)? {
            conditions.push(filter);
        }
        conditions.extend(self.status_conditions(desc));

        let geometry = coordinate_column(ctx, desc);
        if desc.geometry_only {
            conditions.push(format!("{geometry} is not null"));
        }
        if desc.coordinates_only {
            conditions.push(format!(
                "{} is not null and {} is not null",
                ctx.col("longitude"),
                ctx.col("latitude")
            ));
        }
        if desc.completed_only {
            conditions.push(format!("{} is not null", ctx.col("completeddate")));
        }
        if let Some(bbox) = &desc.bbox {
            conditions.push(ctx.dialect.bbox_predicate(&geometry, bbox));
        }
        if let Some(partitions) = partition_condition(ctx, desc, analytics_type) {
            conditions.push(partitions);
        }
        if uses_last_value_source(desc) {
            conditions.push(rank_condition(ctx));
        }
        Ok(conditions)
    }

    /// Aggregate statement: value first, then dimension and item columns.
    fn aggregated_sql(&self, desc: &QueryDescriptor) -> Result<CompiledQuery> {
        let ctx = self.context();
        let analytics_type = self.analytics_type();
        let scope = indicator_scope(desc);

        let value = aggregate_clause(ctx, desc, &scope)?;
        let dimensions = aggregate_output_columns(ctx, desc, analytics_type)?;
        let group_by = group_by_columns(desc, &dimensions);

        let mut columns = Vec::with_capacity(dimensions.len() + 1);
        columns.push(value_column(desc, value));
        columns.extend(dimensions);

        let order_by = desc
            .sort_order
            .map(|order| {
                let value = ctx.quote(VALUE_ALIAS);
                vec![match order {
                    SortOrder::Asc => OrderItem::asc(value),
                    SortOrder::Desc => OrderItem::desc(value),
                }]
            })
            .unwrap_or_default();

        let statement = SelectStatement {
            columns: render_columns(ctx, &columns),
            from: self.from_clause(desc)?,
            conditions: self.where_clause(desc)?,
            group_by,
            order_by,
            limit: desc.limit.or_else(|| ctx.max_limit_plus_one()),
            offset: None,
        };
        Ok(CompiledQuery {
            sql: statement.render(),
            columns,
        })
    }

    /// Row-list statement: standard columns, dimensions, then items.
    fn events_sql(&self, desc: &QueryDescriptor) -> Result<CompiledQuery> {
        let ctx = self.context();
        let analytics_type = self.analytics_type();

        let mut columns = self.standard_columns(desc);
        columns.extend(dimension_output_columns(ctx, desc, analytics_type));
        columns.extend(item_output_columns(ctx, desc, analytics_type)?);

        let order_by = sort_items(ctx, desc, &columns);
        let (limit, offset) = if desc.is_paging() {
            (
                Some(desc.page_size_with_default(ctx.default_page_size).max(0) as u64),
                Some(desc.offset(ctx.default_page_size).max(0) as u64),
            )
        } else {
            (desc.limit.or_else(|| ctx.max_limit_plus_one()), None)
        };

        let statement = SelectStatement {
            columns: render_columns(ctx, &columns),
            from: self.from_clause(desc)?,
            conditions: self.where_clause(desc)?,
            order_by,
            limit,
            offset,
            ..Default::default()
        };
        Ok(CompiledQuery {
            sql: statement.render(),
            columns,
        })
    }

    /// `select count(1)` over the row-list filters, for the pager total.
    fn count_sql(&self, desc: &QueryDescriptor) -> Result<String> {
        let statement = SelectStatement {
            columns: vec!["count(1)".to_string()],
            from: self.from_clause(desc)?,
            conditions: self.where_clause(desc)?,
            ..Default::default()
        };
        Ok(statement.render())
    }
}

/// First/last value aggregation reads the ranked sub-query instead of the
/// table, and keeps only rank one.
pub fn uses_last_value_source(desc: &QueryDescriptor) -> bool {
    desc.mode == QueryMode::Aggregate && desc.is_first_or_last_period_aggregation()
}

/// Geometry column of the requested coordinate field. An org unit item
/// field reads the geometry of the org unit, `<uid>_geom`.
pub fn coordinate_column(ctx: &SqlContext, desc: &QueryDescriptor) -> String {
    let Some(field) = desc.coordinate_field.as_deref() else {
        return ctx.col(DEFAULT_GEOMETRY_COLUMN);
    };
    let org_unit_item = desc
        .items_and_item_filters()
        .any(|i| i.uid == field && i.value_type == ValueType::OrganisationUnit);
    if org_unit_item {
        ctx.col(&format!("{field}_geom"))
    } else {
        ctx.col(field)
    }
}

/// Standard column selected under its own name.
pub(crate) fn standard_column(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    name: &str,
    value_type: ValueType,
) -> OutputColumn {
    standard_expression(desc, name, ctx.col(name), value_type)
}

pub(crate) fn standard_expression(
    desc: &QueryDescriptor,
    name: &str,
    expression: String,
    value_type: ValueType,
) -> OutputColumn {
    let label = header_label(name, &desc.program, desc.program_stage.as_ref());
    OutputColumn::new(
        ColumnAndAlias::new(expression, name),
        GridHeader::new(name, label, value_type).meta(),
        ValueDecoder::new(value_type),
    )
}

/// Geometry as GeoJSON plus longitude and latitude of the coordinate field.
pub(crate) fn geometry_columns(ctx: &SqlContext, desc: &QueryDescriptor) -> Vec<OutputColumn> {
    let geometry = coordinate_column(ctx, desc);
    let dialect = ctx.dialect.as_ref();
    let mut columns = vec![standard_expression(
        desc,
        "geometry",
        dialect.geojson(&geometry),
        ValueType::Geojson,
    )];
    for (name, expression) in [
        ("longitude", dialect.longitude(&geometry)),
        ("latitude", dialect.latitude(&geometry)),
    ] {
        let mut column = standard_expression(desc, name, expression, ValueType::Number);
        column.decoder = column.decoder.with_decimals(COORDINATE_DECIMALS);
        columns.push(column);
    }
    columns
}

/// `ax."<column>" in ('A','B')`, or nothing for an empty status list.
pub(crate) fn status_condition<'a>(
    ctx: &SqlContext,
    column: &str,
    statuses: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let statuses: Vec<&str> = statuses.into_iter().collect();
    if statuses.is_empty() {
        return None;
    }
    Some(format!(
        "{} in ({})",
        ctx.col(column),
        ctx.literal_list(statuses)
    ))
}

fn render_columns(ctx: &SqlContext, columns: &[OutputColumn]) -> Vec<String> {
    columns
        .iter()
        .map(|c| c.select.render(ctx.dialect.as_ref()))
        .collect()
}

fn value_column(desc: &QueryDescriptor, expression: String) -> OutputColumn {
    let decoder = match value_aggregation(desc) {
        None | Some(AggregationType::Count) => ValueDecoder::new(ValueType::Integer),
        Some(_) => {
            let decoder = ValueDecoder::new(ValueType::Number);
            match desc.program_indicator.as_ref().and_then(|pi| pi.decimals) {
                Some(decimals) => decoder.with_decimals(decimals),
                None => decoder,
            }
        }
    };
    OutputColumn::new(
        ColumnAndAlias::new(expression, VALUE_ALIAS),
        GridHeader::new(VALUE_ALIAS, "Value", decoder.value_type),
        decoder,
    )
}

/// The indicator's own filter expression, compiled as a boolean.
fn indicator_filter_condition(ctx: &SqlContext, desc: &QueryDescriptor) -> Result<Option<String>> {
    let Some(pi) = desc.program_indicator.as_ref() else {
        return Ok(None);
    };
    let Some(filter) = pi.filter.as_deref().filter(|f| !f.trim().is_empty()) else {
        return Ok(None);
    };
    let sql = ctx.indicators.analytics_sql(
        filter,
        ExpressionKind::Boolean,
        pi,
        desc.earliest_start_date(),
        desc.latest_end_date(),
    )?;
    Ok(Some(format!("({sql})")))
}

/// Sort on the selected alias of each requested uid; stage scoped items
/// match on their `<stage>.<uid>` alias.
fn sort_items(ctx: &SqlContext, desc: &QueryDescriptor, columns: &[OutputColumn]) -> Vec<OrderItem> {
    let resolve = |uid: &str| {
        let suffix = format!(".{uid}");
        columns
            .iter()
            .map(OutputColumn::alias)
            .find(|alias| *alias == uid || alias.ends_with(&suffix))
            .map(|alias| ctx.quote(alias))
            .unwrap_or_else(|| ctx.col(uid))
    };
    desc.asc
        .iter()
        .map(|uid| OrderItem::asc(resolve(uid)).nulls_last())
        .chain(desc.desc.iter().map(|uid| OrderItem::desc(resolve(uid)).nulls_last()))
        .collect()
}

/// Execute one statement and classify the outcome. SQL is only ever logged
/// at debug level since it embeds filter values.
/// A zero `timeout` waits indefinitely.
pub async fn execute_statement(
    backend: &dyn BackendConnection,
    sql: &str,
    timeout: Duration,
) -> QueryOutcome {
    let start = Instant::now();
    tracing::debug!(sql = %sql, "executing analytics statement");
    let result = if timeout.is_zero() {
        backend.execute_sql(sql).await
    } else {
        tokio::time::timeout(timeout, backend.execute_sql(sql))
            .await
            .unwrap_or_else(|_| {
                Err(BackendFailure::new(
                    FailureKind::Resource,
                    format!("statement timed out after {} ms", timeout.as_millis()),
                ))
            })
    };
    let outcome = QueryOutcome::from_result(result);
    let ms = start.elapsed().as_millis() as u64;
    match &outcome {
        QueryOutcome::Rows(rows) => {
            tracing::debug!(rows = rows.len(), ms, "analytics statement finished");
        }
        QueryOutcome::NoTable => {
            tracing::info!(ms, "analytics table does not exist, no data for slice");
        }
        QueryOutcome::RuntimeFailure(failure) => {
            tracing::warn!(kind = ?failure.kind, ms, error = %failure.message, "analytics statement failed");
        }
    }
    outcome
}

/// Query runtime error for a failure that is not a missing table.
pub fn runtime_error(failure: BackendFailure) -> AnalyticsError {
    let code = match failure.kind {
        FailureKind::DivisionByZero => RuntimeCode::DivisionByZero,
        FailureKind::DataIntegrity => RuntimeCode::DataIntegrity,
        FailureKind::MissingRelation | FailureKind::Resource | FailureKind::Other => {
            RuntimeCode::Resource
        }
    };
    AnalyticsError::QueryRuntime {
        code,
        message: failure.message,
    }
}
