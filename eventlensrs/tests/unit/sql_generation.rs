use std::sync::Arc;

use eventlens::{
    manager::AnalyticsManager,
    model::{
        AggregationType, EventStatus, OrgUnitSelectionMode, ProgramStage, QueryItem, QueryMode,
        ValueType,
    },
    AnalyticsConfig, DuckDbDialect, EventManager, PostgresDialect, QueryPlanner, SqlContext,
    VerbatimIndicatorCompiler,
};

use super::support::{aggregate, catalog_2023, row_query};

fn context(dialect: Arc<dyn eventlens::Dialect>) -> SqlContext {
    SqlContext::new(dialect, Arc::new(VerbatimIndicatorCompiler), &AnalyticsConfig::default())
}

fn planner() -> QueryPlanner {
    QueryPlanner::new(&AnalyticsConfig::default(), Arc::new(catalog_2023()))
}

#[test]
fn planned_sum_groups_by_split_period_column() {
    let mut desc = aggregate(&["202301"])
        .with_value(Some(QueryItem::data_element("deA", ValueType::Number)))
        .with_aggregation_type(Some(AggregationType::Sum));
    desc.org_unit_mode = OrgUnitSelectionMode::Selected;

    let planned = planner().plan_aggregate_query(&desc).unwrap();
    let sql = EventManager::new(context(Arc::new(PostgresDialect)))
        .aggregated_sql(&planned[0])
        .unwrap()
        .sql;
    assert_eq!(
        sql,
        "select sum(ax.\"deA\") as \"value\",ax.\"monthly\" as \"pe\" from analytics_event_prga as ax where ax.\"monthly\" in ('202301') and ax.\"ou\" in ('ouA') and ax.\"yearly\" in ('2023') group by ax.\"monthly\" limit 50001"
    );
}

#[test]
fn where_clause_keeps_fixed_predicate_order() {
    let mut desc = row_query(QueryMode::Events);
    desc.org_unit_mode = OrgUnitSelectionMode::Selected;
    desc.program_stage = Some(ProgramStage::new("psA", false));
    desc.event_statuses = vec![EventStatus::Completed];
    desc.geometry_only = true;
    desc.completed_only = true;

    let planned = planner().plan_event_query(&desc).unwrap();
    let sql = EventManager::new(context(Arc::new(PostgresDialect)))
        .count_sql(&planned)
        .unwrap();
    assert_eq!(
        sql,
        "select count(1) from analytics_event_prga as ax where ax.\"yearly\" in ('2023') and ax.\"ou\" in ('ouA') and ax.\"ps\" = 'psA' and ax.\"eventstatus\" in ('COMPLETED') and ax.\"geometry\" is not null and ax.\"completeddate\" is not null and ax.\"yearly\" in ('2023')"
    );
}

#[test]
fn duckdb_spatial_functions() {
    let mut desc = row_query(QueryMode::Events);
    desc.coordinate_field = Some("geometry".into());
    desc.cluster_size = Some(1000);
    desc.bbox = Some("1,2,3,4".into());

    let planned = planner().plan_event_query(&desc).unwrap();
    let manager = EventManager::new(context(Arc::new(DuckDbDialect)));
    let clusters = manager.clusters_sql(&planned).unwrap().sql;
    assert!(clusters.contains("ST_Union_Agg(ax.\"geometry\")"));
    assert!(clusters.contains("cast(ST_Extent_Agg(ax.\"geometry\") as varchar) as \"extent\""));
    assert!(clusters.contains("ST_Intersects(ax.\"geometry\", ST_MakeEnvelope(1,2,3,4))"));

    let rows = manager.events_sql(&planned).unwrap().sql;
    assert!(rows.contains("ST_AsGeoJSON(ax.\"geometry\") as \"geometry\""));
}
