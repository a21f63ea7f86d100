use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::period::PeriodType;
use super::types::{AggregationType, AnalyticsType, ValueType};
use crate::error::{AnalyticsError, Result, ValidationCode};

/// Sentinel filter value meaning "column has no value".
pub const NV: &str = "NV";

/// Separator for multi-valued `IN` filters.
pub const OPTION_SEP: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryOperator {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    Ilike,
    In,
    Ne,
    Neq,
    Nieq,
    Nlike,
    Nilike,
}

impl QueryOperator {
    /// Negated operators treat null and empty as satisfying the predicate.
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            QueryOperator::Ne
                | QueryOperator::Neq
                | QueryOperator::Nieq
                | QueryOperator::Nlike
                | QueryOperator::Nilike
        )
    }

    pub fn is_like(&self) -> bool {
        matches!(
            self,
            QueryOperator::Like | QueryOperator::Ilike | QueryOperator::Nlike | QueryOperator::Nilike
        )
    }

    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            QueryOperator::Ilike | QueryOperator::Nilike | QueryOperator::Nieq
        )
    }

    pub fn sql_operator(&self) -> &'static str {
        match self {
            QueryOperator::Eq => "=",
            QueryOperator::Gt => ">",
            QueryOperator::Ge => ">=",
            QueryOperator::Lt => "<",
            QueryOperator::Le => "<=",
            QueryOperator::Like => "like",
            QueryOperator::Ilike => "ilike",
            QueryOperator::In => "in",
            QueryOperator::Ne | QueryOperator::Neq | QueryOperator::Nieq => "!=",
            QueryOperator::Nlike => "not like",
            QueryOperator::Nilike => "not ilike",
        }
    }
}

impl FromStr for QueryOperator {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s.to_ascii_uppercase().as_str() {
            "EQ" => QueryOperator::Eq,
            "GT" => QueryOperator::Gt,
            "GE" => QueryOperator::Ge,
            "LT" => QueryOperator::Lt,
            "LE" => QueryOperator::Le,
            "LIKE" => QueryOperator::Like,
            "ILIKE" => QueryOperator::Ilike,
            "IN" => QueryOperator::In,
            "NE" => QueryOperator::Ne,
            "NEQ" => QueryOperator::Neq,
            "NIEQ" => QueryOperator::Nieq,
            "NLIKE" => QueryOperator::Nlike,
            "NILIKE" => QueryOperator::Nilike,
            _ => return Err(AnalyticsError::validation(ValidationCode::InvalidFilter, s)),
        };
        Ok(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFilter {
    pub operator: QueryOperator,
    pub filter: String,
}

impl QueryFilter {
    pub fn new(operator: QueryOperator, filter: impl Into<String>) -> Self {
        Self {
            operator,
            filter: filter.into(),
        }
    }

    /// Parse the `OP:value` form, e.g. `GT:5` or `IN:a;b;NV`.
    pub fn parse(input: &str) -> Result<Self> {
        let (op, value) = input
            .split_once(':')
            .ok_or_else(|| AnalyticsError::validation(ValidationCode::InvalidFilter, input))?;
        Ok(Self::new(op.parse()?, value))
    }

    pub fn is_no_value(&self) -> bool {
        self.filter == NV
    }

    /// Values of a multi-valued filter, in order.
    pub fn values(&self) -> Vec<&str> {
        self.filter
            .split(OPTION_SEP)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect()
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.operator, self.filter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionItem {
    pub uid: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionSet {
    pub uid: String,
    pub options: Vec<OptionItem>,
}

impl OptionSet {
    pub fn option_by_code(&self, code: &str) -> Option<&OptionItem> {
        self.options.iter().find(|o| o.code == code)
    }

    /// Match a numeric raw value against option codes compared as doubles,
    /// so `"1"` and `"1.0"` resolve to the same option.
    pub fn option_by_numeric_value(&self, value: f64) -> Option<&OptionItem> {
        self.options
            .iter()
            .find(|o| o.code.trim().parse::<f64>().map(|c| c == value).unwrap_or(false))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub uid: String,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendSet {
    pub uid: String,
    pub legends: Vec<Legend>,
}

impl LegendSet {
    pub fn legend_by_uid(&self, uid: &str) -> Option<&Legend> {
        self.legends.iter().find(|l| l.uid == uid)
    }

    /// Legend whose `[start, end)` interval contains `value`.
    pub fn legend_for_value(&self, value: f64) -> Option<&Legend> {
        self.legends
            .iter()
            .find(|l| value >= l.start && value < l.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Program {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    /// Programs with registration track enrollments and tracked entities.
    #[serde(default)]
    pub registration: bool,
    #[serde(default)]
    pub enrollment_date_label: Option<String>,
    #[serde(default)]
    pub incident_date_label: Option<String>,
}

impl Program {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: String::new(),
            registration: false,
            enrollment_date_label: None,
            incident_date_label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramStage {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default)]
    pub execution_date_label: Option<String>,
}

impl ProgramStage {
    pub fn new(uid: impl Into<String>, repeatable: bool) -> Self {
        Self {
            uid: uid.into(),
            name: String::new(),
            repeatable,
            execution_date_label: None,
        }
    }
}

/// Date a period boundary is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryTarget {
    EventDate,
    EnrollmentDate,
    IncidentDate,
    ScheduledDate,
    /// Event date of any event in the given program stage.
    StageEventDate(String),
}

impl BoundaryTarget {
    pub fn column(&self) -> &'static str {
        match self {
            BoundaryTarget::EventDate | BoundaryTarget::StageEventDate(_) => "executiondate",
            BoundaryTarget::EnrollmentDate => "enrollmentdate",
            BoundaryTarget::IncidentDate => "incidentdate",
            BoundaryTarget::ScheduledDate => "duedate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoundaryType {
    BeforeStartOfReportingPeriod,
    BeforeEndOfReportingPeriod,
    AfterStartOfReportingPeriod,
    AfterEndOfReportingPeriod,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalyticsPeriodBoundary {
    pub target: BoundaryTarget,
    pub boundary_type: BoundaryType,
    #[serde(default)]
    pub offset_periods: i32,
    #[serde(default)]
    pub offset_period_type: Option<PeriodType>,
}

impl AnalyticsPeriodBoundary {
    pub fn new(target: BoundaryTarget, boundary_type: BoundaryType) -> Self {
        Self {
            target,
            boundary_type,
            offset_periods: 0,
            offset_period_type: None,
        }
    }

    pub fn with_offset(mut self, periods: i32, period_type: PeriodType) -> Self {
        self.offset_periods = periods;
        self.offset_period_type = Some(period_type);
        self
    }

    /// "Before" boundaries are inclusive upper bounds.
    pub fn is_end_boundary(&self) -> bool {
        matches!(
            self.boundary_type,
            BoundaryType::BeforeStartOfReportingPeriod | BoundaryType::BeforeEndOfReportingPeriod
        )
    }

    pub fn boundary_date(&self, report_start: NaiveDate, report_end: NaiveDate) -> NaiveDate {
        let base = match self.boundary_type {
            BoundaryType::BeforeStartOfReportingPeriod
            | BoundaryType::AfterStartOfReportingPeriod => report_start,
            BoundaryType::BeforeEndOfReportingPeriod | BoundaryType::AfterEndOfReportingPeriod => {
                report_end
            }
        };
        match self.offset_period_type {
            Some(pt) if self.offset_periods != 0 => pt.shift(base, self.offset_periods),
            _ => base,
        }
    }

    /// Date literal compared against; end boundaries are exclusive the day after.
    pub fn comparison_date(&self, report_start: NaiveDate, report_end: NaiveDate) -> NaiveDate {
        let date = self.boundary_date(report_start, report_end);
        if self.is_end_boundary() {
            date + Duration::days(1)
        } else {
            date
        }
    }

    fn is_default_for(&self, analytics_type: AnalyticsType) -> bool {
        let default_target = match analytics_type {
            AnalyticsType::Event => BoundaryTarget::EventDate,
            AnalyticsType::Enrollment => BoundaryTarget::EnrollmentDate,
        };
        self.target == default_target
            && self.offset_periods == 0
            && matches!(
                self.boundary_type,
                BoundaryType::AfterStartOfReportingPeriod | BoundaryType::BeforeEndOfReportingPeriod
            )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramIndicator {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    /// Owning program; its analytics tables back the indicator subquery.
    pub program: String,
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub analytics_type: AnalyticsType,
    #[serde(default)]
    pub aggregation_type: Option<AggregationType>,
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub boundaries: Vec<AnalyticsPeriodBoundary>,
}

impl ProgramIndicator {
    pub fn aggregation_type_fallback(&self) -> AggregationType {
        self.aggregation_type.unwrap_or(AggregationType::Average)
    }

    pub fn has_expression(&self) -> bool {
        !self.expression.trim().is_empty()
    }

    /// Boundaries other than "inside the reporting period on the default date".
    pub fn has_non_default_boundaries(&self) -> bool {
        !self.boundaries.is_empty()
            && !self
                .boundaries
                .iter()
                .all(|b| b.is_default_for(self.analytics_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    DataElement,
    Attribute,
    ProgramIndicator(ProgramIndicator),
}

/// A column-producing entity used as output column or filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryItem {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    pub kind: ItemKind,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub aggregation_type: Option<AggregationType>,
    /// Overrides the descriptor program when the item is split out.
    #[serde(default)]
    pub program: Option<Program>,
    #[serde(default)]
    pub program_stage: Option<ProgramStage>,
    /// 0 is the latest event of a repeatable stage, -1 the one before.
    #[serde(default)]
    pub stage_offset: i32,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    #[serde(default)]
    pub option_set: Option<OptionSet>,
    #[serde(default)]
    pub legend_set: Option<LegendSet>,
}

impl QueryItem {
    pub fn data_element(uid: impl Into<String>, value_type: ValueType) -> Self {
        Self::with_kind(uid, ItemKind::DataElement, value_type)
    }

    pub fn attribute(uid: impl Into<String>, value_type: ValueType) -> Self {
        Self::with_kind(uid, ItemKind::Attribute, value_type)
    }

    pub fn program_indicator(indicator: ProgramIndicator) -> Self {
        let uid = indicator.uid.clone();
        let name = indicator.name.clone();
        let mut item = Self::with_kind(uid, ItemKind::ProgramIndicator(indicator), ValueType::Number);
        item.name = name;
        item
    }

    fn with_kind(uid: impl Into<String>, kind: ItemKind, value_type: ValueType) -> Self {
        Self {
            uid: uid.into(),
            name: String::new(),
            short_name: None,
            kind,
            value_type,
            aggregation_type: None,
            program: None,
            program_stage: None,
            stage_offset: 0,
            filters: Vec::new(),
            option_set: None,
            legend_set: None,
        }
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_stage(mut self, stage: ProgramStage) -> Self {
        self.program_stage = Some(stage);
        self
    }

    pub fn with_option_set(mut self, option_set: OptionSet) -> Self {
        self.option_set = Some(option_set);
        self
    }

    pub fn with_legend_set(mut self, legend_set: LegendSet) -> Self {
        self.legend_set = Some(legend_set);
        self
    }

    pub fn as_program_indicator(&self) -> Option<&ProgramIndicator> {
        match &self.kind {
            ItemKind::ProgramIndicator(pi) => Some(pi),
            _ => None,
        }
    }

    pub fn is_program_indicator(&self) -> bool {
        self.as_program_indicator().is_some()
    }

    pub fn is_repeatable_stage(&self) -> bool {
        self.program_stage.as_ref().map(|s| s.repeatable).unwrap_or(false)
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn is_numeric(&self) -> bool {
        self.value_type.is_numeric()
    }

    /// Physical column holding the item value in the analytics table.
    pub fn column_name(&self) -> &str {
        &self.uid
    }

    /// Output alias; stage-scoped items are prefixed with the stage uid.
    pub fn alias(&self) -> String {
        match &self.program_stage {
            Some(stage) if self.stage_offset != 0 => {
                format!("{}[{}].{}", stage.uid, self.stage_offset, self.uid)
            }
            Some(stage) => format!("{}.{}", stage.uid, self.uid),
            None => self.uid.clone(),
        }
    }

    /// Key shared by repeated instances of the same stage item.
    pub fn repeatable_group_key(&self) -> String {
        match &self.program_stage {
            Some(stage) => format!("{}.{}", stage.uid, self.uid),
            None => self.uid.clone(),
        }
    }

    pub fn display_short_name(&self) -> &str {
        match self.short_name.as_deref() {
            Some(short_name) => short_name,
            None if self.name.is_empty() => self.uid.as_str(),
            None => self.name.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filters() {
        let f = QueryFilter::parse("in:a;b; NV").unwrap();
        assert_eq!(f.operator, QueryOperator::In);
        assert_eq!(f.values(), vec!["a", "b", "NV"]);
        assert!(QueryFilter::parse("XX:1").is_err());
        assert!(QueryFilter::parse("no-colon").is_err());
    }

    #[test]
    fn numeric_option_codes_compare_as_doubles() {
        let set = OptionSet {
            uid: "os".into(),
            options: vec![
                OptionItem {
                    uid: "o1".into(),
                    code: "1".into(),
                    name: "One".into(),
                },
                OptionItem {
                    uid: "o2".into(),
                    code: "2".into(),
                    name: "Two".into(),
                },
            ],
        };
        assert_eq!(set.option_by_numeric_value(1.0).unwrap().code, "1");
        assert_eq!(set.option_by_numeric_value("2.0".parse().unwrap()).unwrap().uid, "o2");
        assert!(set.option_by_numeric_value(3.0).is_none());
    }

    #[test]
    fn default_boundaries_are_not_flagged() {
        let mut pi = ProgramIndicator {
            uid: "pi".into(),
            name: String::new(),
            program: "prg".into(),
            expression: "#{x}".into(),
            filter: None,
            analytics_type: AnalyticsType::Enrollment,
            aggregation_type: None,
            decimals: None,
            boundaries: vec![
                AnalyticsPeriodBoundary::new(
                    BoundaryTarget::EnrollmentDate,
                    BoundaryType::AfterStartOfReportingPeriod,
                ),
                AnalyticsPeriodBoundary::new(
                    BoundaryTarget::EnrollmentDate,
                    BoundaryType::BeforeEndOfReportingPeriod,
                ),
            ],
        };
        assert!(!pi.has_non_default_boundaries());
        pi.boundaries[0] = pi.boundaries[0]
            .clone()
            .with_offset(-30, PeriodType::Daily);
        assert!(pi.has_non_default_boundaries());
    }

    #[test]
    fn boundary_dates_shift_and_exclude_end() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        let before_end = AnalyticsPeriodBoundary::new(
            BoundaryTarget::EventDate,
            BoundaryType::BeforeEndOfReportingPeriod,
        );
        assert_eq!(
            before_end.comparison_date(start, end),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
        );
        let after_start = AnalyticsPeriodBoundary::new(
            BoundaryTarget::EventDate,
            BoundaryType::AfterStartOfReportingPeriod,
        )
        .with_offset(-1, PeriodType::Monthly);
        assert_eq!(
            after_start.comparison_date(start, end),
            NaiveDate::from_ymd_opt(2022, 12, 1).unwrap()
        );
    }

    #[test]
    fn stage_items_alias_with_offset() {
        let item = QueryItem::data_element("de", ValueType::Number)
            .with_stage(ProgramStage::new("ps", true));
        assert_eq!(item.alias(), "ps.de");
        let mut previous = item.clone();
        previous.stage_offset = -1;
        assert_eq!(previous.alias(), "ps[-1].de");
        assert_eq!(previous.repeatable_group_key(), item.repeatable_group_key());
    }
}
