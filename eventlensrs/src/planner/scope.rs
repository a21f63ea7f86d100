//! The single decision of which table a descriptor reads and what an
//! aggregate count counts. Planner, SQL managers and the aggregate grid all
//! ask this function instead of re-deriving it from descriptor flags.

use crate::model::{AnalyticsType, OutputType, QueryDescriptor, QueryMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountTarget {
    /// `count(ax."psi")`
    Events,
    /// `count(ax."pi")`, one enrollment row per enrollment table row.
    Enrollments,
    /// `count(distinct ax."pi")` over event rows.
    DistinctEnrollments,
    /// `count(distinct tei)`
    DistinctTrackedEntities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorScope {
    pub table: AnalyticsType,
    pub count: CountTarget,
    /// The value is an enrollment-level program indicator.
    pub enrollment_indicator: bool,
}

pub fn indicator_scope(desc: &QueryDescriptor) -> IndicatorScope {
    let enrollment_indicator = desc
        .program_indicator
        .as_ref()
        .map(|pi| pi.analytics_type == AnalyticsType::Enrollment)
        .unwrap_or(false);

    let table = if enrollment_indicator || desc.mode == QueryMode::Enrollments {
        AnalyticsType::Enrollment
    } else {
        AnalyticsType::Event
    };

    let count = if desc.output_type == OutputType::TrackedEntityInstance
        && desc.program.registration
    {
        CountTarget::DistinctTrackedEntities
    } else if enrollment_indicator || table == AnalyticsType::Enrollment {
        CountTarget::Enrollments
    } else if desc.output_type == OutputType::Enrollment {
        CountTarget::DistinctEnrollments
    } else {
        CountTarget::Events
    };

    IndicatorScope {
        table,
        count,
        enrollment_indicator,
    }
}
