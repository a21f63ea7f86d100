//! Request orchestration: plan, compile, execute, materialize.
//!
//! Planned aggregate descriptors run concurrently up to
//! `query.max_parallel_queries` but are merged in planner order, so the
//! final sort and limit over the merged grid are deterministic.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt, TryStreamExt};
use serde_json::{json, Map, Value};

use crate::backends::BackendConnection;
use crate::config::AnalyticsConfig;
use crate::error::{AnalyticsError, Result, ValidationCode};
use crate::executor::QueryOutcome;
use crate::grid::{Grid, GridHeader, Pager};
use crate::manager::{
    execute_statement, runtime_error, AnalyticsManager, CompiledQuery, EnrollmentManager,
    EventManager,
};
use crate::materializer::{apply_id_scheme, collapsed_value_text, materialize_rows, DecodeOptions};
use crate::model::{
    AggregationType, AnalyticsType, QueryDescriptor, QueryItem, SortOrder, ValueType,
    DATA_X_DIM_ID,
};
use crate::planner::scope::indicator_scope;
use crate::planner::QueryPlanner;
use crate::query_builder::aggregate::{value_aggregation, VALUE_ALIAS};
use crate::query_builder::columns::{item_alias, item_header};
use crate::query_builder::{OutputColumn, SqlContext};
use crate::resolvers::{IndicatorSqlCompiler, MetadataResolver, PartitionCatalog};

pub struct AnalyticsService {
    backend: Arc<dyn BackendConnection>,
    planner: QueryPlanner,
    events: EventManager,
    enrollments: EnrollmentManager,
    metadata: Arc<dyn MetadataResolver>,
    config: AnalyticsConfig,
}

impl AnalyticsService {
    pub fn new(
        backend: Arc<dyn BackendConnection>,
        indicators: Arc<dyn IndicatorSqlCompiler>,
        catalog: Arc<dyn PartitionCatalog>,
        metadata: Arc<dyn MetadataResolver>,
        config: AnalyticsConfig,
    ) -> Self {
        let ctx = SqlContext::new(backend.dialect(), indicators, &config);
        Self {
            planner: QueryPlanner::new(&config, catalog),
            events: EventManager::new(ctx.clone()),
            enrollments: EnrollmentManager::new(ctx),
            backend,
            metadata,
            config,
        }
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    fn manager(&self, analytics_type: AnalyticsType) -> &dyn AnalyticsManager {
        match analytics_type {
            AnalyticsType::Event => &self.events,
            AnalyticsType::Enrollment => &self.enrollments,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.query.timeout_ms)
    }

    fn decode_options(&self, desc: &QueryDescriptor) -> DecodeOptions {
        DecodeOptions::new(&self.config.rounding, desc.skip_rounding)
    }

    /// Aggregated values per dimension combination, merged across all
    /// planned slices.
    pub async fn aggregated_event_data(&self, desc: &QueryDescriptor) -> Result<Grid> {
        let planned = self.planner.plan_aggregate_query(desc)?;
        let layout = AggregateLayout::new(desc);
        let mut grid = Grid::with_headers(layout.headers.clone());

        if !desc.skip_data {
            let parallel = self.config.query.max_parallel_queries.max(1);
            let slices: Vec<Option<(CompiledQuery, Grid)>> = stream::iter(planned.iter())
                .map(|query| self.run_aggregate_slice(query))
                .buffered(parallel)
                .try_collect()
                .await?;

            let mut id_columns: Vec<OutputColumn> = Vec::new();
            for ((compiled, slice), query) in slices
                .into_iter()
                .zip(&planned)
                .filter_map(|(s, q)| s.map(|s| (s, q)))
            {
                layout.append(&mut grid, query, &compiled, slice);
                if id_columns.is_empty() {
                    id_columns = compiled.columns;
                }
            }

            if let Some(order) = desc.sort_order {
                if let Some(idx) = grid.header_index(VALUE_ALIAS) {
                    grid.sort_by_column(idx, order == SortOrder::Desc);
                }
            }
            if let Some(limit) = desc.limit {
                grid.truncate(limit as usize);
            }
            let max_limit = self.config.query.max_limit;
            if max_limit > 0 && grid.height() as u64 > max_limit {
                return Err(AnalyticsError::validation(
                    ValidationCode::MaxLimitExceeded,
                    max_limit,
                ));
            }
            if let Some(scheme) = desc.output_id_scheme {
                apply_id_scheme(&mut grid, &id_columns, scheme);
            }
        }

        self.add_metadata(&mut grid, desc);
        tracing::debug!(rows = grid.height(), slices = planned.len(), "aggregate query done");
        Ok(grid)
    }

    async fn run_aggregate_slice(
        &self,
        query: &QueryDescriptor,
    ) -> Result<Option<(CompiledQuery, Grid)>> {
        let manager = self.manager(indicator_scope(query).table);
        let compiled = manager.aggregated_sql(query)?;
        let Some(slice) = self.fetch(query, &compiled).await? else {
            return Ok(None);
        };
        Ok(Some((compiled, slice)))
    }

    /// Execute a compiled statement into a grid with the compiled headers.
    /// `None` when the analytics table does not exist.
    async fn fetch(&self, desc: &QueryDescriptor, compiled: &CompiledQuery) -> Result<Option<Grid>> {
        match execute_statement(self.backend.as_ref(), &compiled.sql, self.timeout()).await {
            QueryOutcome::Rows(rows) => {
                let mut grid = Grid::with_headers(compiled.headers());
                let mut cursor = rows.cursor();
                materialize_rows(
                    &mut cursor,
                    &compiled.columns,
                    &self.decode_options(desc),
                    &mut grid,
                )?;
                Ok(Some(grid))
            }
            QueryOutcome::NoTable => Ok(None),
            QueryOutcome::RuntimeFailure(failure) => Err(runtime_error(failure)),
        }
    }

    /// Event rows of a program, paged when requested.
    pub async fn events(&self, desc: &QueryDescriptor) -> Result<Grid> {
        let planned = self.planner.plan_event_query(desc)?;
        self.row_list(&planned, AnalyticsType::Event).await
    }

    /// Enrollment rows of a program, paged when requested.
    pub async fn enrollments(&self, desc: &QueryDescriptor) -> Result<Grid> {
        let planned = self.planner.plan_enrollment_query(desc)?;
        self.row_list(&planned, AnalyticsType::Enrollment).await
    }

    async fn row_list(&self, desc: &QueryDescriptor, analytics_type: AnalyticsType) -> Result<Grid> {
        let manager = self.manager(analytics_type);
        let compiled = manager.events_sql(desc)?;
        let mut grid = Grid::with_headers(compiled.headers());

        let has_data = desc.has_partitions() || desc.skip_partitioning;
        if !has_data {
            tracing::debug!(program = %desc.program.uid, "no partitions for row query");
        }
        if has_data && !desc.skip_data {
            if let Some(rows) = self.fetch(desc, &compiled).await? {
                grid.append(rows);
            }
            if let Some(scheme) = desc.output_id_scheme {
                apply_id_scheme(&mut grid, &compiled.columns, scheme);
            }
        }

        if desc.is_paging() {
            let page_size = desc.page_size_with_default(self.config.query.default_page_size);
            let total = if !has_data {
                0
            } else if desc.total_pages {
                self.count(manager, desc).await?
            } else {
                desc.offset(self.config.query.default_page_size)
                    .saturating_add(grid.height() as i64)
            };
            grid.pager = Some(Pager::new(desc.page_with_default(), page_size, total));
        }

        self.add_metadata(&mut grid, desc);
        Ok(grid)
    }

    async fn count(&self, manager: &dyn AnalyticsManager, desc: &QueryDescriptor) -> Result<i64> {
        let sql = manager.count_sql(desc)?;
        match execute_statement(self.backend.as_ref(), &sql, self.timeout()).await {
            QueryOutcome::Rows(rows) => {
                let mut cursor = rows.cursor();
                Ok(if cursor.next() { cursor.int(1).unwrap_or(0) } else { 0 })
            }
            QueryOutcome::NoTable => Ok(0),
            QueryOutcome::RuntimeFailure(failure) => Err(runtime_error(failure)),
        }
    }

    /// Event clusters on a grid of `cluster_size`.
    pub async fn event_clusters(&self, desc: &QueryDescriptor) -> Result<Grid> {
        let planned = self.planner.plan_event_query(desc)?;
        let compiled = self.events.clusters_sql(&planned)?;
        self.spatial(&planned, &compiled).await
    }

    /// Event count and extent of all matching events.
    pub async fn rectangle(&self, desc: &QueryDescriptor) -> Result<Grid> {
        let planned = self.planner.plan_event_query(desc)?;
        let compiled = self.events.rectangle_sql(&planned)?;
        self.spatial(&planned, &compiled).await
    }

    async fn spatial(&self, desc: &QueryDescriptor, compiled: &CompiledQuery) -> Result<Grid> {
        let mut grid = Grid::with_headers(compiled.headers());
        if (desc.has_partitions() || desc.skip_partitioning) && !desc.skip_data {
            if let Some(rows) = self.fetch(desc, compiled).await? {
                grid.append(rows);
            }
        }
        Ok(grid)
    }

    /// `items` (uid to display name) and `dimensions` (dimension to item
    /// uids) metadata blocks.
    fn add_metadata(&self, grid: &mut Grid, desc: &QueryDescriptor) {
        if desc.skip_meta {
            return;
        }
        let mut items = Map::new();
        let mut dimensions = Map::new();
        let mut named = |uid: &str, name: &str| {
            let name = self
                .metadata
                .display_name(uid)
                .or_else(|| (!name.is_empty()).then(|| name.to_string()))
                .unwrap_or_else(|| uid.to_string());
            items.insert(uid.to_string(), json!({ "name": name }));
        };

        named(&desc.program.uid, &desc.program.name);
        if let Some(stage) = &desc.program_stage {
            named(&stage.uid, &stage.name);
        }
        for dim in desc.dimensions_and_filters() {
            for item in &dim.items {
                named(item.uid(), item.name());
            }
            let uids: Vec<Value> = dim.item_uids().into_iter().map(Value::from).collect();
            dimensions.insert(dim.uid.clone(), Value::Array(uids));
        }
        for item in desc.items_and_item_filters().chain(desc.value.iter()) {
            named(&item.uid, &item.name);
            let mut codes: BTreeSet<String> = BTreeSet::new();
            if let Some(set) = &item.option_set {
                codes.extend(set.options.iter().map(|o| o.code.clone()));
            }
            if let Some(set) = &item.legend_set {
                codes.extend(set.legends.iter().map(|l| l.uid.clone()));
            }
            dimensions.insert(
                item.uid.clone(),
                Value::Array(codes.into_iter().map(Value::from).collect()),
            );
        }
        if let Some(pi) = &desc.program_indicator {
            named(&pi.uid, &pi.name);
        }

        grid.meta_data.insert("items".to_string(), Value::Object(items));
        grid.meta_data
            .insert("dimensions".to_string(), Value::Object(dimensions));
    }
}

/// Column layout of the merged aggregate grid: an optional `dx` column,
/// the dimensions, the items unless collapsed, then the value.
struct AggregateLayout {
    headers: Vec<GridHeader>,
    data_column: bool,
    collapse: bool,
}

impl AggregateLayout {
    fn new(desc: &QueryDescriptor) -> Self {
        let data_column = desc.collapse_data_dimensions || desc.aggregate_data;
        let table = indicator_scope(desc).table;
        let mut headers = Vec::new();
        if data_column {
            headers.push(GridHeader::new(DATA_X_DIM_ID, "Data", ValueType::Text).meta());
        }
        for dim in &desc.dimensions {
            headers.push(GridHeader::new(&dim.uid, &dim.uid, ValueType::Text).meta());
        }
        if !data_column {
            for item in &desc.items {
                headers.push(item_header(item, &item_alias(item, table)));
            }
        }
        headers.push(GridHeader::new(VALUE_ALIAS, "Value", value_type(desc)));
        Self {
            headers,
            data_column,
            collapse: desc.collapse_data_dimensions,
        }
    }

    /// Re-order one slice's rows into the merged layout.
    fn append(&self, grid: &mut Grid, query: &QueryDescriptor, compiled: &CompiledQuery, slice: Grid) {
        let positions: Vec<Option<usize>> = self
            .headers
            .iter()
            .map(|h| slice.header_index(&h.name))
            .collect();
        let item = query.items.first();
        let table = indicator_scope(query).table;

        for row in &slice.rows {
            let mut out = Vec::with_capacity(self.headers.len());
            for (header, position) in self.headers.iter().zip(&positions) {
                if self.data_column && header.name == DATA_X_DIM_ID {
                    out.push(self.data_value(query, item, compiled, row, table));
                    continue;
                }
                out.push(
                    position
                        .and_then(|idx| row.get(idx).cloned())
                        .unwrap_or(Value::Null),
                );
            }
            grid.add_row(out);
        }
        grid.references.extend(slice.references);
    }

    fn data_value(
        &self,
        query: &QueryDescriptor,
        item: Option<&QueryItem>,
        compiled: &CompiledQuery,
        row: &[Value],
        table: AnalyticsType,
    ) -> Value {
        if self.collapse {
            if let Some(item) = item {
                let alias = item_alias(item, table);
                let value = compiled
                    .columns
                    .iter()
                    .position(|c| c.alias() == alias)
                    .and_then(|idx| row.get(idx))
                    .unwrap_or(&Value::Null);
                return Value::String(collapsed_value_text(item, value));
            }
        }
        query
            .value
            .as_ref()
            .map(|v| v.uid.clone())
            .or_else(|| query.program_indicator.as_ref().map(|pi| pi.uid.clone()))
            .map(Value::String)
            .unwrap_or(Value::Null)
    }
}

fn value_type(desc: &QueryDescriptor) -> ValueType {
    if desc.aggregate_data {
        return ValueType::Number;
    }
    match value_aggregation(desc) {
        None | Some(AggregationType::Count) => ValueType::Integer,
        Some(_) => ValueType::Number,
    }
}
