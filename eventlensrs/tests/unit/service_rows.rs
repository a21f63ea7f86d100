use serde_json::json;

use eventlens::{
    model::{IdScheme, QueryItem, QueryMode, ValueType},
    AnalyticsConfig, Pager, StaticCatalog,
};

use super::support::{catalog_2023, row_query, service_with, yes_no, Reply, ScriptedBackend};

fn two_events() -> Reply {
    Reply::Records(vec![
        json!({"psi": "ev3", "ps": "psA", "ouname": "Alpha"}),
        json!({"psi": "ev4", "ps": "psA", "ouname": "Alpha"}),
    ])
}

#[tokio::test]
async fn paged_events_count_total_when_requested() {
    let backend = ScriptedBackend::new()
        .on("count(1)", Reply::Scalar(json!(5)))
        .on("limit 2 offset 2", two_events());
    let (backend, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let mut desc = row_query(QueryMode::Events).with_paging(Some(2), Some(2));
    desc.total_pages = true;
    let grid = service.events(&desc).await.unwrap();

    assert_eq!(grid.headers[0].name, "psi");
    assert_eq!(grid.headers[0].column, "Event");
    assert_eq!(grid.height(), 2);
    assert_eq!(grid.value(1, "psi"), Some(&json!("ev4")));
    assert_eq!(grid.value(0, "ouname"), Some(&json!("Alpha")));
    assert_eq!(grid.pager, Some(Pager::new(2, 2, 5)));
    assert_eq!(grid.pager.map(|p| p.page_count), Some(3));
    assert_eq!(backend.executed().len(), 2);
}

#[tokio::test]
async fn paged_events_estimate_total_from_page() {
    let backend = ScriptedBackend::new().on("limit 2 offset 2", two_events());
    let (backend, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let desc = row_query(QueryMode::Events).with_paging(Some(2), Some(2));
    let grid = service.events(&desc).await.unwrap();

    assert_eq!(grid.pager.map(|p| p.total), Some(4));
    assert_eq!(backend.executed().len(), 1);
}

#[tokio::test]
async fn rows_without_partitions_skip_execution() {
    let (backend, service) = service_with(
        ScriptedBackend::new(),
        StaticCatalog::new(),
        AnalyticsConfig::default(),
    );

    let desc = row_query(QueryMode::Enrollments).with_paging(Some(1), None);
    let grid = service.enrollments(&desc).await.unwrap();

    assert!(backend.executed().is_empty());
    assert_eq!(grid.height(), 0);
    assert_eq!(grid.headers[0].name, "pi");
    assert_eq!(grid.pager.map(|p| (p.page_size, p.total)), Some((50, 0)));
}

#[tokio::test]
async fn skip_partitioning_reads_without_catalog() {
    let backend = ScriptedBackend::new().on("select", two_events());
    let (backend, service) =
        service_with(backend, StaticCatalog::new(), AnalyticsConfig::default());

    let mut desc = row_query(QueryMode::Events);
    desc.skip_partitioning = true;
    let grid = service.events(&desc).await.unwrap();

    assert_eq!(grid.height(), 2);
    assert!(grid.pager.is_none());
    assert!(!backend.executed()[0].contains("\"yearly\" in"));
}

#[tokio::test]
async fn option_values_follow_output_id_scheme() {
    let backend = ScriptedBackend::new().on(
        "select",
        Reply::Records(vec![json!({"psi": "ev1", "deB": "Y"}), json!({"psi": "ev2", "deB": "Z"})]),
    );
    let (_, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let mut desc = row_query(QueryMode::Events)
        .with_item(QueryItem::data_element("deB", ValueType::Text).with_option_set(yes_no()));
    desc.output_id_scheme = Some(IdScheme::Uid);
    let grid = service.events(&desc).await.unwrap();

    assert_eq!(grid.value(0, "deB"), Some(&json!("optY")));
    assert_eq!(grid.value(1, "deB"), Some(&json!("Z")));
    assert_eq!(grid.meta_data["dimensions"]["deB"], json!(["N", "Y"]));
}

#[tokio::test]
async fn clusters_and_rectangle() {
    let backend = ScriptedBackend::new()
        .on(
            "group by",
            Reply::Records(vec![json!({
                "count": 3,
                "center": "POINT(1 2)",
                "extent": "BOX(0 0,2 4)"
            })]),
        )
        .on(
            "select",
            Reply::Records(vec![json!({"count": 7, "extent": "BOX(0 0,5 5)"})]),
        );
    let (backend, service) = service_with(backend, catalog_2023(), AnalyticsConfig::default());

    let mut desc = row_query(QueryMode::Events);
    desc.coordinate_field = Some("geometry".into());
    desc.cluster_size = Some(1000);

    let clusters = service.event_clusters(&desc).await.unwrap();
    let names: Vec<&str> = clusters.headers.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["count", "center", "extent"]);
    assert_eq!(
        clusters.rows,
        vec![vec![json!(3), json!("POINT(1 2)"), json!("BOX(0 0,2 4)")]]
    );

    let rectangle = service.rectangle(&desc).await.unwrap();
    assert_eq!(rectangle.rows, vec![vec![json!(7), json!("BOX(0 0,5 5)")]]);
    assert!(backend.executed()[0].contains("ST_SnapToGrid"));
}
