use std::sync::Arc;

use eventlens::{
    error::{AnalyticsError, ValidationCode},
    model::{
        AggregationType, AnalyticsType, Dimension, OrgUnit, OrgUnitSelectionMode, ProgramIndicator,
        QueryItem, QueryMode, ValueType,
    },
    AllPartitions, AnalyticsConfig, QueryPlanner,
};

use super::support::{aggregate, catalog_2023, period, row_query};

fn planner() -> QueryPlanner {
    QueryPlanner::new(&AnalyticsConfig::default(), Arc::new(catalog_2023()))
}

fn split_target() -> eventlens::QueryDescriptor {
    let mut desc = aggregate(&["202301", "2023Q1"]);
    desc.filters.clear();
    desc.with_dimension(Dimension::org_units(vec![
        OrgUnit::new("ouA", 1),
        OrgUnit::new("ouB", 2),
    ]))
}

#[test]
fn aggregate_splits_by_org_unit_level_then_period_type() {
    let planned = planner().plan_aggregate_query(&split_target()).unwrap();

    let shape: Vec<(String, String, Vec<&str>)> = planned
        .iter()
        .map(|q| {
            let ou = q.dimension("ou").unwrap();
            let pe = q.dimension("pe").unwrap();
            (
                ou.dimension_name().to_string(),
                pe.dimension_name().to_string(),
                pe.item_uids(),
            )
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            ("uidlevel1".to_string(), "monthly".to_string(), vec!["202301"]),
            ("uidlevel1".to_string(), "quarterly".to_string(), vec!["2023Q1"]),
            ("uidlevel2".to_string(), "monthly".to_string(), vec!["202301"]),
            ("uidlevel2".to_string(), "quarterly".to_string(), vec!["2023Q1"]),
        ]
    );
    for q in &planned {
        assert_eq!(q.table_name.as_deref(), Some("analytics_event_prga"));
        assert_eq!(q.partitions.as_ref().map(|p| p.as_strings()), Some(vec!["2023".to_string()]));
    }
}

#[test]
fn selected_mode_keeps_org_unit_column() {
    let mut desc = split_target();
    desc.org_unit_mode = OrgUnitSelectionMode::Selected;
    let planned = planner().plan_aggregate_query(&desc).unwrap();
    assert_eq!(planned.len(), 4);
    assert!(planned.iter().all(|q| q.dimension("ou").unwrap().column.is_none()));
}

#[test]
fn enrollment_indicator_binds_enrollment_table() {
    let pi = ProgramIndicator {
        uid: "piA".into(),
        name: "Active cases".into(),
        program: "prgA".into(),
        expression: "\"deA\"".into(),
        filter: None,
        analytics_type: AnalyticsType::Enrollment,
        aggregation_type: Some(AggregationType::Sum),
        decimals: None,
        boundaries: Vec::new(),
    };
    let desc = aggregate(&["202301"]).with_program_indicator(Some(pi));
    let planned = planner().plan_aggregate_query(&desc).unwrap();
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].table_name.as_deref(), Some("analytics_enrollment_prga"));
}

#[test]
fn collapse_splits_per_item() {
    let mut desc = aggregate(&["202301"]).with_items(vec![
        QueryItem::data_element("deA", ValueType::Number),
        QueryItem::data_element("deB", ValueType::Text),
    ]);
    desc.collapse_data_dimensions = true;
    let planned = planner().plan_aggregate_query(&desc).unwrap();
    let items: Vec<Vec<&str>> = planned
        .iter()
        .map(|q| q.items.iter().map(|i| i.uid.as_str()).collect())
        .collect();
    assert_eq!(items, vec![vec!["deA"], vec!["deB"]]);
}

#[test]
fn row_queries_are_never_split() {
    let desc = row_query(QueryMode::Events).with_dimension(Dimension::periods(vec![
        period("202301"),
        period("2023Q1"),
    ]));
    let planned = QueryPlanner::new(&AnalyticsConfig::default(), Arc::new(AllPartitions))
        .plan_event_query(&desc)
        .unwrap();
    assert_eq!(planned.table_name.as_deref(), Some("analytics_event_prga"));
    assert_eq!(planned.dimension("pe").unwrap().items.len(), 2);
    assert!(planned.dimension("pe").unwrap().column.is_none());
}

#[test]
fn missing_org_unit_is_rejected() {
    let mut desc = aggregate(&["202301"]);
    desc.filters.clear();
    match planner().plan_aggregate_query(&desc) {
        Err(AnalyticsError::Validation(e)) => assert_eq!(e.code, ValidationCode::NoOrgUnit),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn spatial_queries_need_a_coordinate_field() {
    let mut desc = row_query(QueryMode::Events);
    desc.cluster_size = Some(500);
    let err = planner().plan_event_query(&desc).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("coordinateField"));
}
