use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use eventlens::{
    model::{
        AggregationType, Dimension, OrgUnit, Period, Program, QueryDescriptor, QueryFilter,
        QueryItem, QueryMode, SortOrder, ValueType,
    },
    AnalyticsConfig, AnalyticsService, DuckDbConnection, StaticCatalog,
    VerbatimIndicatorCompiler,
};

fn bootstrap_duckdb(db_path: &Path) -> anyhow::Result<()> {
    let conn = duckdb::Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        CREATE TABLE analytics_event_prga (
            psi VARCHAR,
            ps VARCHAR,
            ou VARCHAR,
            uidlevel1 VARCHAR,
            monthly VARCHAR,
            yearly VARCHAR,
            "deA" DOUBLE
        );
        INSERT INTO analytics_event_prga VALUES
            ('ev1', 'psA', 'ouA', 'ouA', '202301', '2023', 4.0),
            ('ev2', 'psA', 'ouA', 'ouA', '202301', '2023', 6.0),
            ('ev3', 'psA', 'ouC', 'ouA', '202302', '2023', 2.5),
            ('ev4', 'psA', 'ouZ', 'ouZ', '202301', '2023', 100.0);

        CREATE TABLE analytics_event_prgl (
            psi VARCHAR,
            ou VARCHAR,
            ao VARCHAR,
            uidlevel1 VARCHAR,
            monthly VARCHAR,
            yearly VARCHAR,
            executiondate DATE,
            created TIMESTAMP,
            "deA" DOUBLE
        );
        INSERT INTO analytics_event_prgl VALUES
            ('ev1', 'ouA', 'aoA', 'ouA', '202106', '2021', DATE '2021-06-01', TIMESTAMP '2021-06-01 08:00:00', 7.0);

        CREATE TABLE analytics_event_prgn (
            psi VARCHAR,
            ou VARCHAR,
            uidlevel1 VARCHAR,
            monthly VARCHAR,
            yearly VARCHAR,
            "deA" DOUBLE,
            "deT" VARCHAR
        );
        INSERT INTO analytics_event_prgn VALUES
            ('ev1', 'ouA', 'ouA', '202301', '2023', 1.0, NULL),
            ('ev2', 'ouA', 'ouA', '202301', '2023', 2.0, ''),
            ('ev3', 'ouA', 'ouA', '202301', '2023', 3.0, 'x'),
            ('ev4', 'ouA', 'ouA', '202301', '2023', 4.0, 'X'),
            ('ev5', 'ouA', 'ouA', '202301', '2023', 5.0, 'xyz'),
            ('ev6', 'ouA', 'ouA', '202301', '2023', 6.0, 'abc');
        "#,
    )?;
    Ok(())
}

fn service() -> (TempDir, AnalyticsService) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("analytics.duckdb");
    bootstrap_duckdb(&db_path).unwrap();

    let catalog = Arc::new(
        StaticCatalog::new()
            .with_name("deA", "Weight")
            .with_partitions("analytics_event_prga", [2023])
            .with_partitions("analytics_event_prgb", [2023])
            .with_partitions("analytics_event_prgl", [2021, 2023])
            .with_partitions("analytics_event_prgn", [2023]),
    );
    let service = AnalyticsService::new(
        Arc::new(DuckDbConnection::new(&db_path)),
        Arc::new(VerbatimIndicatorCompiler),
        catalog.clone(),
        catalog,
        AnalyticsConfig::default(),
    );
    (dir, service)
}

fn descriptor(program: &str, periods: &[&str]) -> QueryDescriptor {
    QueryDescriptor::new(QueryMode::Aggregate, Program::new(program))
        .with_filter(Dimension::org_units(vec![OrgUnit::new("ouA", 1)]))
        .with_value(Some(QueryItem::data_element("deA", ValueType::Number)))
        .with_dimension(Dimension::periods(
            periods.iter().map(|p| Period::parse(p).unwrap()).collect(),
        ))
}

fn sorted_values(grid: &eventlens::Grid) -> Vec<f64> {
    let value = grid.header_index("value").unwrap();
    let mut values: Vec<f64> = grid.column_values(value).filter_map(|v| v.as_f64()).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    values
}

#[tokio::test]
async fn disabled_aggregation_returns_raw_values() {
    let (_dir, service) = service();
    let desc = descriptor("prgA", &["202301"])
        .with_aggregation_type(Some(AggregationType::None));

    let grid = service.aggregated_event_data(&desc).await.unwrap();
    assert_eq!(sorted_values(&grid), vec![4.0, 6.0]);
}

#[tokio::test]
async fn sum_per_month_sorted_by_value() {
    let (_dir, service) = service();
    let mut desc = descriptor("prgA", &["202301", "202302"])
        .with_aggregation_type(Some(AggregationType::Sum));
    desc.sort_order = Some(SortOrder::Desc);

    let grid = service.aggregated_event_data(&desc).await.unwrap();
    assert_eq!(
        grid.rows,
        vec![vec![json!("202301"), json!(10.0)], vec![json!("202302"), json!(2.5)]]
    );
    assert_eq!(grid.meta_data["items"]["deA"]["name"], json!("Weight"));
}

#[tokio::test]
async fn missing_analytics_table_yields_empty_grid() {
    let (_dir, service) = service();
    let desc = descriptor("prgB", &["202301"]).with_aggregation_type(Some(AggregationType::Sum));

    let grid = service.aggregated_event_data(&desc).await.unwrap();
    assert_eq!(grid.height(), 0);
    assert_eq!(grid.width(), 2);
}

#[tokio::test]
async fn last_value_carries_forward_from_earlier_years() {
    let (_dir, service) = service();
    let desc = QueryDescriptor::new(QueryMode::Aggregate, Program::new("prgL"))
        .with_filter(Dimension::org_units(vec![OrgUnit::new("ouA", 1)]))
        .with_filter(Dimension::periods(vec![Period::parse("2023").unwrap()]))
        .with_value(Some(QueryItem::data_element("deA", ValueType::Number)))
        .with_aggregation_type(Some(AggregationType::Last));

    let grid = service.aggregated_event_data(&desc).await.unwrap();
    assert_eq!(grid.rows, vec![vec![json!(7.0)]]);
}

#[tokio::test]
async fn negated_filters_keep_null_and_empty_values() {
    let (_dir, service) = service();
    let cases = [
        ("NE:x", vec![1.0, 2.0, 4.0, 5.0, 6.0]),
        ("NEQ:x", vec![1.0, 2.0, 4.0, 5.0, 6.0]),
        ("NIEQ:X", vec![1.0, 2.0, 5.0, 6.0]),
        ("NLIKE:x", vec![1.0, 2.0, 4.0, 6.0]),
        ("NILIKE:X", vec![1.0, 2.0, 6.0]),
    ];

    for (filter, expected) in cases {
        let text = QueryItem::data_element("deT", ValueType::Text)
            .with_filter(QueryFilter::parse(filter).unwrap());
        let desc = descriptor("prgN", &["202301"])
            .with_aggregation_type(Some(AggregationType::None))
            .with_item_filter(text);

        let grid = service.aggregated_event_data(&desc).await.unwrap();
        assert_eq!(sorted_values(&grid), expected, "{filter}");
    }
}
