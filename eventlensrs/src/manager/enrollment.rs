use crate::model::{AnalyticsType, QueryDescriptor, ValueType};
use crate::query_builder::{OutputColumn, SqlContext};

use super::{geometry_columns, standard_column, status_condition, AnalyticsManager};

/// Statements over the enrollment analytics tables.
#[derive(Debug, Clone)]
pub struct EnrollmentManager {
    ctx: SqlContext,
}

impl EnrollmentManager {
    pub fn new(ctx: SqlContext) -> Self {
        Self { ctx }
    }
}

impl AnalyticsManager for EnrollmentManager {
    fn analytics_type(&self) -> AnalyticsType {
        AnalyticsType::Enrollment
    }

    fn context(&self) -> &SqlContext {
        &self.ctx
    }

    fn standard_columns(&self, desc: &QueryDescriptor) -> Vec<OutputColumn> {
        let ctx = &self.ctx;
        let mut columns = vec![
            standard_column(ctx, desc, "pi", ValueType::Text),
            standard_column(ctx, desc, "tei", ValueType::Text),
            standard_column(ctx, desc, "enrollmentdate", ValueType::Date),
            standard_column(ctx, desc, "incidentdate", ValueType::Date),
            standard_column(ctx, desc, "storedby", ValueType::Text),
            standard_column(ctx, desc, "lastupdated", ValueType::Date),
        ];
        columns.extend(geometry_columns(ctx, desc));
        columns.extend([
            standard_column(ctx, desc, "ouname", ValueType::Text),
            standard_column(ctx, desc, "oucode", ValueType::Text),
            standard_column(ctx, desc, "enrollmentstatus", ValueType::Text),
        ]);
        columns
    }

    fn status_conditions(&self, desc: &QueryDescriptor) -> Vec<String> {
        status_condition(
            &self.ctx,
            "enrollmentstatus",
            desc.enrollment_statuses.iter().map(|s| s.as_str()),
        )
        .into_iter()
        .collect()
    }
}
