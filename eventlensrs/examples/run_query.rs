use std::{fs, path::Path, sync::Arc};

use eventlens::{
    model::{
        AggregationType, Dimension, OrgUnit, Period, Program, QueryDescriptor, QueryItem,
        QueryMode, ValueType,
    },
    telemetry, AnalyticsConfig, AnalyticsService, DuckDbConnection, StaticCatalog,
    VerbatimIndicatorCompiler,
};

fn bootstrap_duckdb(path: &Path) -> anyhow::Result<()> {
    let conn = duckdb::Connection::open(path)?;
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
            ('ev3', 'psA', 'ouB', 'ouA', '202302', '2023', 2.5);
        "#,
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let db_path = Path::new("demo.duckdb");
    if db_path.exists() {
        fs::remove_file(db_path)?;
    }
    bootstrap_duckdb(db_path)?;

    let catalog = Arc::new(
        StaticCatalog::new()
            .with_name("deA", "Weight")
            .with_partitions("analytics_event_prga", [2023]),
    );
    let config = AnalyticsConfig::load_default();
    let backend = Arc::new(DuckDbConnection::from_config(db_path, &config.duckdb));
    let service = AnalyticsService::new(
        backend,
        Arc::new(VerbatimIndicatorCompiler),
        catalog.clone(),
        catalog,
        config,
    );

    let desc = QueryDescriptor::new(QueryMode::Aggregate, Program::new("prgA"))
        .with_dimension(Dimension::periods(vec![
            Period::parse("202301")?,
            Period::parse("202302")?,
        ]))
        .with_filter(Dimension::org_units(vec![OrgUnit::new("ouA", 1)]))
        .with_value(Some(QueryItem::data_element("deA", ValueType::Number)))
        .with_aggregation_type(Some(AggregationType::Sum));

    let grid = service.aggregated_event_data(&desc).await?;
    println!("{}", serde_json::to_string_pretty(&grid)?);
    Ok(())
}
