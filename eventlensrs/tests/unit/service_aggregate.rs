use serde_json::{json, Value};

use eventlens::{
    error::{AnalyticsError, RuntimeCode, ValidationCode},
    model::{AggregationType, QueryItem, SortOrder, ValueType},
    AnalyticsConfig, FailureKind,
};

use super::support::{aggregate, catalog_2023, service_with, yes_no, Reply, ScriptedBackend};

fn sum_of_dea(periods: &[&str]) -> eventlens::QueryDescriptor {
    aggregate(periods)
        .with_value(Some(QueryItem::data_element("deA", ValueType::Number)))
        .with_aggregation_type(Some(AggregationType::Sum))
}

#[tokio::test]
async fn merges_period_type_slices_and_sorts_by_value() {
    let backend = ScriptedBackend::new()
        .on(
            "ax.\"monthly\" as \"pe\"",
            Reply::Records(vec![json!({"value": 3.0, "pe": "202301"})]),
        )
        .on(
            "ax.\"quarterly\" as \"pe\"",
            Reply::Records(vec![json!({"value": 7.5, "pe": "2023Q1"})]),
        );
    let (backend, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let mut desc = sum_of_dea(&["202301", "2023Q1"]);
    desc.sort_order = Some(SortOrder::Desc);
    let grid = service.aggregated_event_data(&desc).await.unwrap();

    assert_eq!(backend.executed().len(), 2);
    let names: Vec<&str> = grid.headers.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["pe", "value"]);
    assert_eq!(grid.headers[1].value_type, ValueType::Number);
    assert_eq!(
        grid.rows,
        vec![vec![json!("2023Q1"), json!(7.5)], vec![json!("202301"), json!(3.0)]]
    );
}

#[tokio::test]
async fn limit_applies_after_merge() {
    let backend = ScriptedBackend::new()
        .on("monthly", Reply::Records(vec![json!({"value": 1.0, "pe": "202301"})]))
        .on("quarterly", Reply::Records(vec![json!({"value": 9.0, "pe": "2023Q1"})]));
    let (_, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let mut desc = sum_of_dea(&["202301", "2023Q1"]);
    desc.sort_order = Some(SortOrder::Asc);
    desc.limit = Some(1);
    let grid = service.aggregated_event_data(&desc).await.unwrap();
    assert_eq!(grid.rows, vec![vec![json!("202301"), json!(1.0)]]);
}

#[tokio::test]
async fn missing_table_is_no_data() {
    let backend = ScriptedBackend::new().on("select", Reply::Fail(FailureKind::MissingRelation));
    let (_, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let grid = service.aggregated_event_data(&sum_of_dea(&["202301"])).await.unwrap();
    assert_eq!(grid.height(), 0);
    assert_eq!(grid.width(), 2);
}

#[tokio::test]
async fn runtime_failure_aborts_request() {
    let backend = ScriptedBackend::new().on("select", Reply::Fail(FailureKind::DivisionByZero));
    let (_, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let err = service
        .aggregated_event_data(&sum_of_dea(&["202301"]))
        .await
        .unwrap_err();
    match err {
        AnalyticsError::QueryRuntime { code, .. } => assert_eq!(code, RuntimeCode::DivisionByZero),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn exceeding_max_limit_is_rejected() {
    let backend = ScriptedBackend::new().on(
        "select",
        Reply::Records(vec![
            json!({"value": 1.0, "pe": "202301"}),
            json!({"value": 2.0, "pe": "202301"}),
        ]),
    );
    let mut config = AnalyticsConfig::default();
    config.query.max_limit = 1;
    let (backend, service) = service_with(backend, catalog_2023(), config);

    let err = service
        .aggregated_event_data(&sum_of_dea(&["202301"]))
        .await
        .unwrap_err();
    match err {
        AnalyticsError::Validation(e) => assert_eq!(e.code, ValidationCode::MaxLimitExceeded),
        other => panic!("unexpected error: {other}"),
    }
    assert!(backend.executed()[0].ends_with("limit 2"));
}

#[tokio::test]
async fn slices_without_partitions_are_not_executed() {
    let (backend, service) = service_with(
        ScriptedBackend::new(),
        eventlens::StaticCatalog::new(),
        AnalyticsConfig::default(),
    );
    let grid = service.aggregated_event_data(&sum_of_dea(&["202301"])).await.unwrap();
    assert!(backend.executed().is_empty());
    assert_eq!(grid.height(), 0);
}

#[tokio::test]
async fn aggregate_data_reports_item_as_data_column() {
    let backend = ScriptedBackend::new()
        .on("\"deA\"", Reply::Records(vec![json!({"value": 2.0})]))
        .on("\"deB\"", Reply::Records(vec![json!({"value": 3.5})]));
    let mut config = AnalyticsConfig::default();
    config.query.max_parallel_queries = 1;
    let (_, service) = service_with(backend, catalog_2023(), config);

    let mut desc = aggregate(&[])
        .with_filter(eventlens::model::Dimension::periods(vec![super::support::period("2023")]))
        .with_items(vec![
            QueryItem::data_element("deA", ValueType::Number),
            QueryItem::data_element("deB", ValueType::Number),
        ]);
    desc.dimensions.clear();
    desc.aggregate_data = true;
    let grid = service.aggregated_event_data(&desc).await.unwrap();

    let names: Vec<&str> = grid.headers.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["dx", "value"]);
    assert_eq!(
        grid.rows,
        vec![vec![json!("deA"), json!(2.0)], vec![json!("deB"), json!(3.5)]]
    );
}

#[tokio::test]
async fn collapsed_item_becomes_display_text() {
    let backend = ScriptedBackend::new().on(
        "select",
        Reply::Records(vec![
            json!({"value": 5, "deB": "Y"}),
            json!({"value": 2, "deB": Value::Null}),
        ]),
    );
    let (_, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let mut item = QueryItem::data_element("deB", ValueType::Text).with_option_set(yes_no());
    item.name = "Smoker".into();
    let mut desc = aggregate(&[]).with_item(item);
    desc.dimensions.clear();
    let mut desc = desc.with_filter(eventlens::model::Dimension::periods(vec![
        super::support::period("2023"),
    ]));
    desc.collapse_data_dimensions = true;
    let grid = service.aggregated_event_data(&desc).await.unwrap();

    assert_eq!(grid.headers[1].value_type, ValueType::Integer);
    assert_eq!(
        grid.rows,
        vec![
            vec![json!("Smoker: Yes"), json!(5)],
            vec![json!("Smoker: [N/A]"), json!(2)],
        ]
    );
}

#[tokio::test]
async fn metadata_names_items_and_dimensions() {
    let backend = ScriptedBackend::new();
    let (_, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let grid = service.aggregated_event_data(&sum_of_dea(&["202301"])).await.unwrap();
    assert_eq!(grid.meta_data["items"]["deA"]["name"], json!("Weight"));
    assert_eq!(grid.meta_data["items"]["ouA"]["name"], json!("ouA"));
    assert_eq!(grid.meta_data["dimensions"]["pe"], json!(["202301"]));

    let mut desc = sum_of_dea(&["202301"]);
    desc.skip_meta = true;
    let grid = service.aggregated_event_data(&desc).await.unwrap();
    assert!(grid.meta_data.is_empty());
}
