use serde::{Deserialize, Serialize};

/// Endpoint a descriptor was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    Events,
    Enrollments,
    #[default]
    Aggregate,
}

/// Physical analytics table family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsType {
    #[default]
    Event,
    Enrollment,
}

/// What an aggregate count is counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputType {
    #[default]
    Event,
    Enrollment,
    TrackedEntityInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationType {
    Sum,
    Average,
    AverageSumOrgUnit,
    Count,
    Stddev,
    Variance,
    Min,
    Max,
    First,
    Last,
    FirstAverageOrgUnit,
    LastAverageOrgUnit,
    Custom,
    None,
}

impl AggregationType {
    /// SQL aggregate function applied in the outer query. Empty for custom.
    pub fn sql_function(&self) -> &'static str {
        match self {
            AggregationType::Sum | AggregationType::First | AggregationType::Last => "sum",
            AggregationType::Average
            | AggregationType::AverageSumOrgUnit
            | AggregationType::FirstAverageOrgUnit
            | AggregationType::LastAverageOrgUnit => "avg",
            AggregationType::Count => "count",
            AggregationType::Stddev => "stddev",
            AggregationType::Variance => "variance",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Custom | AggregationType::None => "",
        }
    }

    pub fn is_aggregatable(&self) -> bool {
        !matches!(self, AggregationType::None)
    }

    pub fn is_first_or_last_period(&self) -> bool {
        matches!(
            self,
            AggregationType::First
                | AggregationType::Last
                | AggregationType::FirstAverageOrgUnit
                | AggregationType::LastAverageOrgUnit
        )
    }

    pub fn is_first_period(&self) -> bool {
        matches!(
            self,
            AggregationType::First | AggregationType::FirstAverageOrgUnit
        )
    }

    /// FIRST and LAST rank across every non-period dimension; the org unit
    /// average variants rank per org unit and attribute option combo only.
    pub fn ranks_all_dimensions(&self) -> bool {
        matches!(self, AggregationType::First | AggregationType::Last)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    #[default]
    Text,
    LongText,
    Letter,
    Email,
    PhoneNumber,
    Username,
    Url,
    Number,
    Integer,
    IntegerPositive,
    IntegerNegative,
    IntegerZeroOrPositive,
    Percentage,
    UnitInterval,
    Boolean,
    TrueOnly,
    Date,
    Datetime,
    Time,
    Age,
    Coordinate,
    OrganisationUnit,
    Geojson,
    Reference,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Number
                | ValueType::Integer
                | ValueType::IntegerPositive
                | ValueType::IntegerNegative
                | ValueType::IntegerZeroOrPositive
                | ValueType::Percentage
                | ValueType::UnitInterval
        )
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            ValueType::Text
                | ValueType::LongText
                | ValueType::Letter
                | ValueType::Email
                | ValueType::PhoneNumber
                | ValueType::Username
                | ValueType::Url
        )
    }

    /// Values parsed as JSON and emitted through the grid reference map.
    pub fn is_reference(&self) -> bool {
        matches!(self, ValueType::Geojson | ValueType::Reference)
    }
}

/// Output encoding for categorical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdScheme {
    Uid,
    Code,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgUnitSelectionMode {
    Selected,
    Children,
    #[default]
    Descendants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Active,
    Completed,
    Schedule,
    Overdue,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
}

macro_rules! status_name {
    ($ty:ty { $($variant:ident => $name:literal),* $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(<$ty>::$variant => $name),*
                }
            }
        }
    };
}

status_name!(EventStatus {
    Active => "ACTIVE",
    Completed => "COMPLETED",
    Schedule => "SCHEDULE",
    Overdue => "OVERDUE",
    Skipped => "SKIPPED",
});

status_name!(EnrollmentStatus {
    Active => "ACTIVE",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

/// Date column a query is windowed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeField {
    EventDate,
    EnrollmentDate,
    IncidentDate,
    ScheduledDate,
    CompletedDate,
    Created,
    LastUpdated,
}

impl TimeField {
    pub fn column(&self) -> &'static str {
        match self {
            TimeField::EventDate => "executiondate",
            TimeField::EnrollmentDate => "enrollmentdate",
            TimeField::IncidentDate => "incidentdate",
            TimeField::ScheduledDate => "duedate",
            TimeField::CompletedDate => "completeddate",
            TimeField::Created => "created",
            TimeField::LastUpdated => "lastupdated",
        }
    }

    pub fn default_for(analytics_type: AnalyticsType) -> TimeField {
        match analytics_type {
            AnalyticsType::Event => TimeField::EventDate,
            AnalyticsType::Enrollment => TimeField::EnrollmentDate,
        }
    }

    /// Enrollment tables carry no event-level dates.
    pub fn allowed_for(&self, analytics_type: AnalyticsType) -> bool {
        match analytics_type {
            AnalyticsType::Event => true,
            AnalyticsType::Enrollment => matches!(
                self,
                TimeField::EnrollmentDate
                    | TimeField::IncidentDate
                    | TimeField::CompletedDate
                    | TimeField::LastUpdated
            ),
        }
    }
}
