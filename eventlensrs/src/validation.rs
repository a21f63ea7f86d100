use std::collections::HashSet;

use crate::error::{AnalyticsError, Result, ValidationCode};
use crate::model::{QueryDescriptor, QueryMode};
use crate::planner::scope::indicator_scope;

/// Descriptor checks run before any planning or SQL generation.
pub struct Validator {
    max_limit: u64,
}

impl Validator {
    pub fn new(max_limit: u64) -> Self {
        Self { max_limit }
    }

    pub fn validate(&self, desc: &QueryDescriptor) -> Result<()> {
        self.check(
            !desc.program.uid.trim().is_empty(),
            ValidationCode::NoProgram,
            "",
        )?;
        self.check(
            desc.has_org_units(),
            ValidationCode::NoOrgUnit,
            "ou",
        )?;
        self.validate_dates(desc)?;
        self.validate_uniqueness(desc)?;
        self.validate_value(desc)?;
        self.validate_items(desc)?;
        self.validate_paging(desc)?;
        self.validate_spatial(desc)?;

        if let Some(field) = desc.time_field {
            let analytics_type = indicator_scope(desc).table;
            self.check(
                field.allowed_for(analytics_type),
                ValidationCode::TimeFieldNotAllowed,
                format!("{field:?}"),
            )?;
        }
        Ok(())
    }

    fn validate_dates(&self, desc: &QueryDescriptor) -> Result<()> {
        if let (Some(start), Some(end)) = (desc.start_date, desc.end_date) {
            self.check(start <= end, ValidationCode::StartAfterEnd, start)?;
        }
        for range in desc.time_date_ranges.values().flatten() {
            self.check(range.start <= range.end, ValidationCode::StartAfterEnd, range.start)?;
        }
        let has_time = !desc.all_periods().is_empty() || desc.has_time_date_ranges();
        self.check(has_time, ValidationCode::NoPeriodOrDateRange, "pe")
    }

    fn validate_uniqueness(&self, desc: &QueryDescriptor) -> Result<()> {
        let mut dimensions = HashSet::new();
        for dim in desc.dimensions_and_filters() {
            self.check(
                dimensions.insert(dim.uid.as_str()),
                ValidationCode::DuplicateDimension,
                &dim.uid,
            )?;
        }
        let mut items = HashSet::new();
        for item in &desc.items {
            let alias = item.alias();
            self.check(
                !items.contains(&alias),
                ValidationCode::DuplicateItem,
                &alias,
            )?;
            items.insert(alias);
        }
        Ok(())
    }

    fn validate_value(&self, desc: &QueryDescriptor) -> Result<()> {
        if let Some(value) = &desc.value {
            let clash = desc.items_and_item_filters().any(|item| item.uid == value.uid);
            self.check(!clash, ValidationCode::ValueDimensionAlsoItem, &value.uid)?;
        }
        if desc.aggregation_type.is_some() {
            self.check(
                desc.has_value_dimension() || desc.aggregate_data,
                ValidationCode::AggregationWithoutValue,
                format!("{:?}", desc.aggregation_type),
            )?;
        }
        Ok(())
    }

    fn validate_items(&self, desc: &QueryDescriptor) -> Result<()> {
        for item in desc.items_and_item_filters() {
            self.check(
                !(item.option_set.is_some() && item.legend_set.is_some()),
                ValidationCode::LegendAndOptionSet,
                &item.uid,
            )?;
            if desc.mode == QueryMode::Aggregate {
                let aggregatable = item
                    .aggregation_type
                    .map(|agg| agg.is_aggregatable())
                    .unwrap_or(true);
                self.check(aggregatable, ValidationCode::NotAggregatable, &item.uid)?;
            }
        }
        Ok(())
    }

    fn validate_paging(&self, desc: &QueryDescriptor) -> Result<()> {
        let page = desc.page.unwrap_or(0);
        let page_size = desc.page_size.unwrap_or(0);
        self.check(
            page >= 0 && page_size >= 0,
            ValidationCode::NegativePaging,
            format!("{page}/{page_size}"),
        )?;
        if let (Some(page), Some(page_size)) = (desc.page, desc.page_size) {
            self.check(
                (page.max(1) - 1).checked_mul(page_size).is_some(),
                ValidationCode::PagingOutOfRange,
                format!("{page}/{page_size}"),
            )?;
        }
        if let Some(limit) = desc.limit {
            self.check(
                self.max_limit == 0 || limit <= self.max_limit,
                ValidationCode::LimitAboveMax,
                limit,
            )?;
        }
        Ok(())
    }

    fn validate_spatial(&self, desc: &QueryDescriptor) -> Result<()> {
        if desc.cluster_size.is_some() || desc.bbox.is_some() {
            self.check(
                desc.has_coordinate_field(),
                ValidationCode::CoordinateFieldRequired,
                "coordinateField",
            )?;
        }
        if let Some(bbox) = &desc.bbox {
            self.check(parse_bbox(bbox).is_some(), ValidationCode::InvalidBbox, bbox)?;
        }
        Ok(())
    }

    fn check(&self, condition: bool, code: ValidationCode, value: impl std::fmt::Display) -> Result<()> {
        if condition {
            Ok(())
        } else {
            tracing::debug!(code = %code, value = %value, "descriptor rejected");
            Err(AnalyticsError::validation(code, value))
        }
    }
}

/// `min_lon,min_lat,max_lon,max_lat`.
pub fn parse_bbox(bbox: &str) -> Option<[f64; 4]> {
    let parts: Vec<f64> = bbox
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [a, b, c, d] => Some([*a, *b, *c, *d]),
        _ => None,
    }
}
