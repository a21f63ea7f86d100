use crate::error::{AnalyticsError, Result};
use crate::grid::GridHeader;
use crate::materializer::ValueDecoder;
use crate::model::{AnalyticsType, QueryDescriptor, ValueType};
use crate::query_builder::{ColumnAndAlias, OutputColumn, SqlContext};
use crate::sql_ast::SelectStatement;

use super::{
    coordinate_column, geometry_columns, standard_column, status_condition, AnalyticsManager,
    CompiledQuery,
};

/// Statements over the event analytics tables.
#[derive(Debug, Clone)]
pub struct EventManager {
    ctx: SqlContext,
}

impl EventManager {
    pub fn new(ctx: SqlContext) -> Self {
        Self { ctx }
    }

    /// Events grouped on a grid of `cluster_size` metres: count, centre and
    /// extent per cell, plus the event ids when cluster points are requested.
    pub fn clusters_sql(&self, desc: &QueryDescriptor) -> Result<CompiledQuery> {
        let ctx = &self.ctx;
        let size = desc
            .cluster_size
            .ok_or_else(|| AnalyticsError::invariant("cluster query without a cluster size"))?;
        let geometry = coordinate_column(ctx, desc);
        let dialect = ctx.dialect.as_ref();

        let mut columns = vec![
            count_column(ctx),
            spatial_column(
                "center",
                "Center",
                dialect.as_text(&dialect.centroid(&dialect.collect(&geometry))),
            ),
            spatial_column("extent", "Extent", dialect.extent(&geometry)),
        ];
        if desc.include_cluster_points {
            columns.push(spatial_column(
                "points",
                "Points",
                format!("string_agg(cast({} as varchar), ',')", ctx.col("psi")),
            ));
        }

        let statement = SelectStatement {
            columns: columns
                .iter()
                .map(|c| c.select.render(dialect))
                .collect(),
            from: self.from_clause(desc)?,
            conditions: self.where_clause(desc)?,
            group_by: vec![dialect.snap_to_grid(&geometry, size)],
            ..Default::default()
        };
        Ok(CompiledQuery {
            sql: statement.render(),
            columns,
        })
    }

    /// Event count and the bounding box of all matching event geometries.
    pub fn rectangle_sql(&self, desc: &QueryDescriptor) -> Result<CompiledQuery> {
        let ctx = &self.ctx;
        let geometry = coordinate_column(ctx, desc);
        let dialect = ctx.dialect.as_ref();
        let columns = vec![
            count_column(ctx),
            spatial_column("extent", "Extent", dialect.extent(&geometry)),
        ];
        let statement = SelectStatement {
            columns: columns
                .iter()
                .map(|c| c.select.render(dialect))
                .collect(),
            from: self.from_clause(desc)?,
            conditions: self.where_clause(desc)?,
            ..Default::default()
        };
        Ok(CompiledQuery {
            sql: statement.render(),
            columns,
        })
    }
}

fn count_column(ctx: &SqlContext) -> OutputColumn {
    OutputColumn::new(
        ColumnAndAlias::new(format!("count({})", ctx.col("psi")), "count"),
        GridHeader::new("count", "Count", ValueType::Integer),
        ValueDecoder::new(ValueType::Integer),
    )
}

fn spatial_column(name: &str, label: &str, expression: String) -> OutputColumn {
    OutputColumn::new(
        ColumnAndAlias::new(expression, name),
        GridHeader::new(name, label, ValueType::Text),
        ValueDecoder::new(ValueType::Text),
    )
}

impl AnalyticsManager for EventManager {
    fn analytics_type(&self) -> AnalyticsType {
        AnalyticsType::Event
    }

    fn context(&self) -> &SqlContext {
        &self.ctx
    }

    fn standard_columns(&self, desc: &QueryDescriptor) -> Vec<OutputColumn> {
        let ctx = &self.ctx;
        let mut columns = vec![
            standard_column(ctx, desc, "psi", ValueType::Text),
            standard_column(ctx, desc, "ps", ValueType::Text),
            standard_column(ctx, desc, "executiondate", ValueType::Date),
            standard_column(ctx, desc, "storedby", ValueType::Text),
            standard_column(ctx, desc, "lastupdated", ValueType::Date),
            standard_column(ctx, desc, "duedate", ValueType::Date),
        ];
        if desc.program.registration {
            columns.extend([
                standard_column(ctx, desc, "enrollmentdate", ValueType::Date),
                standard_column(ctx, desc, "incidentdate", ValueType::Date),
                standard_column(ctx, desc, "tei", ValueType::Text),
                standard_column(ctx, desc, "pi", ValueType::Text),
            ]);
        }
        columns.extend(geometry_columns(ctx, desc));
        columns.extend([
            standard_column(ctx, desc, "ouname", ValueType::Text),
            standard_column(ctx, desc, "oucode", ValueType::Text),
            standard_column(ctx, desc, "eventstatus", ValueType::Text),
        ]);
        columns
    }

    fn stage_condition(&self, desc: &QueryDescriptor) -> Option<String> {
        desc.program_stage.as_ref().map(|stage| {
            format!("{} = {}", self.ctx.col("ps"), self.ctx.literal(&stage.uid))
        })
    }

    fn status_conditions(&self, desc: &QueryDescriptor) -> Vec<String> {
        let enrollment = status_condition(
            &self.ctx,
            "enrollmentstatus",
            desc.enrollment_statuses.iter().map(|s| s.as_str()),
        );
        let event = status_condition(
            &self.ctx,
            "eventstatus",
            desc.event_statuses.iter().map(|s| s.as_str()),
        );
        enrollment.into_iter().chain(event).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AggregationType, Dimension, EventStatus, OrgUnit, OrgUnitSelectionMode, Partitions,
        Period, Program, ProgramStage, QueryItem, QueryMode, SortOrder,
    };
    use crate::query_builder::test_support::postgres_context;

    fn manager() -> EventManager {
        EventManager::new(postgres_context())
    }

    fn aggregate() -> QueryDescriptor {
        let mut d = QueryDescriptor::new(QueryMode::Aggregate, Program::new("prgA"))
            .with_filter(Dimension::periods(vec![Period::parse("202301").unwrap()]))
            .with_filter(Dimension::org_units(vec![OrgUnit::new("ouA", 1)]))
            .with_value(Some(QueryItem::data_element("deA", ValueType::Number)))
            .with_table("analytics_event_prga".into(), Partitions::new([2023]));
        d.org_unit_mode = OrgUnitSelectionMode::Selected;
        d
    }

    #[test]
    fn disabled_aggregation_selects_raw_value_without_group_by() {
        let d = aggregate().with_aggregation_type(Some(AggregationType::None));
        let q = manager().aggregated_sql(&d).unwrap();
        assert_eq!(
            q.sql,
            "select ax.\"deA\" as \"value\" from analytics_event_prga as ax where ax.\"monthly\" in ('202301') and ax.\"ou\" in ('ouA') and ax.\"yearly\" in ('2023') limit 50001"
        );
        assert_eq!(q.columns.len(), 1);
        assert_eq!(q.columns[0].decoder.value_type, ValueType::Number);
    }

    #[test]
    fn sum_aggregation_with_sort_and_limit() {
        let mut d = aggregate()
            .with_aggregation_type(Some(AggregationType::Sum))
            .with_dimension(Dimension::org_units(vec![OrgUnit::new("ouB", 2)]).with_column("uidlevel2"));
        d.filters.retain(|f| !f.is_org_unit());
        d.sort_order = Some(SortOrder::Desc);
        d.limit = Some(10);
        let q = manager().aggregated_sql(&d).unwrap();
        assert_eq!(
            q.sql,
            "select sum(ax.\"deA\") as \"value\",ax.\"uidlevel2\" as \"ou\" from analytics_event_prga as ax where ax.\"monthly\" in ('202301') and ax.\"ou\" in ('ouB') and ax.\"yearly\" in ('2023') group by ax.\"uidlevel2\" order by \"value\" desc limit 10"
        );
    }

    #[test]
    fn count_without_value_is_integer() {
        let mut d = aggregate();
        d.value = None;
        let q = manager().aggregated_sql(&d).unwrap();
        assert!(q.sql.starts_with("select count(ax.\"psi\") as \"value\" from"));
        assert_eq!(q.columns[0].decoder.value_type, ValueType::Integer);
    }

    #[test]
    fn last_value_aggregation_reads_ranked_source() {
        let d = aggregate().with_aggregation_type(Some(AggregationType::Last));
        let q = manager().aggregated_sql(&d).unwrap();
        assert!(q.sql.contains("from (select *, row_number() over ("));
        assert!(q.sql.contains("and ax.\"pe_rank\" = 1"));
        // neither periods nor partitions narrow the ten year window
        assert!(!q.sql.contains("\"monthly\" in"));
        assert!(!q.sql.contains("\"yearly\" in"));
    }

    #[test]
    fn row_list_standard_columns_and_paging() {
        let mut d = aggregate();
        d.mode = QueryMode::Events;
        d.value = None;
        d.program_stage = Some(ProgramStage::new("psA", false));
        d.event_statuses = vec![EventStatus::Completed];
        d.desc = vec!["deB".into()];
        let d = d
            .with_item(QueryItem::data_element("deB", ValueType::Text))
            .with_paging(Some(2), Some(20));
        let q = manager().events_sql(&d).unwrap();

        let aliases: Vec<&str> = q.columns.iter().map(|c| c.alias()).collect();
        assert_eq!(
            aliases,
            vec![
                "psi", "ps", "executiondate", "storedby", "lastupdated", "duedate", "geometry",
                "longitude", "latitude", "ouname", "oucode", "eventstatus", "deB"
            ]
        );
        assert!(q.sql.contains("ST_AsGeoJSON(ax.\"geometry\", 6) as \"geometry\""));
        assert!(q.sql.contains(
            "and ax.\"ps\" = 'psA' and ax.\"eventstatus\" in ('COMPLETED') and ax.\"yearly\" in ('2023')"
        ));
        assert!(q.sql.ends_with("order by \"deB\" desc nulls last limit 20 offset 20"));
        assert!(q.sql.contains("nullif(ax.\"deB\",'') as \"deB\""));
    }

    #[test]
    fn registration_adds_enrollment_columns() {
        let mut d = aggregate();
        d.mode = QueryMode::Events;
        d.program.registration = true;
        let columns = manager().standard_columns(&d);
        let aliases: Vec<&str> = columns.iter().map(|c| c.alias()).collect();
        assert_eq!(&aliases[6..10], &["enrollmentdate", "incidentdate", "tei", "pi"]);
    }

    #[test]
    fn count_statement_reuses_filters() {
        let mut d = aggregate();
        d.mode = QueryMode::Events;
        let sql = manager().count_sql(&d).unwrap();
        assert_eq!(
            sql,
            "select count(1) from analytics_event_prga as ax where ax.\"monthly\" in ('202301') and ax.\"ou\" in ('ouA') and ax.\"yearly\" in ('2023')"
        );
    }

    #[test]
    fn clusters_and_rectangle() {
        let mut d = aggregate();
        d.mode = QueryMode::Events;
        d.coordinate_field = Some("geometry".into());
        d.cluster_size = Some(1000);
        d.include_cluster_points = true;
        d.bbox = Some("1,2,3,4".into());
        let q = manager().clusters_sql(&d).unwrap();
        assert!(q.sql.starts_with(
            "select count(ax.\"psi\") as \"count\",ST_AsText(ST_Centroid(ST_Collect(ax.\"geometry\"))) as \"center\",cast(ST_Extent(ax.\"geometry\") as varchar) as \"extent\",string_agg(cast(ax.\"psi\" as varchar), ',') as \"points\""
        ));
        assert!(q.sql.contains("ax.\"geometry\" && ST_MakeEnvelope(1,2,3,4,4326)"));
        assert!(q.sql.ends_with(
            "group by ST_SnapToGrid(ST_Transform(ST_SetSRID(ax.\"geometry\", 4326), 3785), 1000)"
        ));

        let q = manager().rectangle_sql(&d).unwrap();
        assert!(q.sql.starts_with(
            "select count(ax.\"psi\") as \"count\",cast(ST_Extent(ax.\"geometry\") as varchar) as \"extent\" from analytics_event_prga as ax"
        ));
        assert_eq!(q.columns.len(), 2);
    }
}
