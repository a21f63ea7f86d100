//! Item filters and dimension predicates.
//!
//! A null or empty value satisfies every negated comparison: absence is not
//! equal to anything, so `NEQ:x` must keep rows without a value.

use std::collections::BTreeMap;

use crate::error::{AnalyticsError, Result, ValidationCode};
use crate::model::{
    AnalyticsType, DimensionType, OrgUnitSelectionMode, QueryDescriptor, QueryFilter, QueryItem,
    QueryOperator, ORGUNIT_DIM_ID, NV,
};
use crate::sql_ast::or_group;

use super::columns::item_filter_expression;
use super::SqlContext;

/// One SQL predicate for `column <op> value`.
pub fn filter_predicate(
    ctx: &SqlContext,
    column: &str,
    item: &QueryItem,
    filter: &QueryFilter,
) -> Result<String> {
    let op = filter.operator;

    if op == QueryOperator::In {
        return in_predicate(ctx, column, item, filter);
    }

    if filter.is_no_value() {
        return match op {
            QueryOperator::Eq => Ok(format!("{column} is null")),
            _ if op.is_negated() => Ok(format!("{column} is not null")),
            _ => Err(AnalyticsError::validation(
                ValidationCode::InvalidFilter,
                filter,
            )),
        };
    }

    let numeric = item.is_numeric() && !op.is_like();
    let value = if op.is_like() {
        ctx.literal(&format!("%{}%", filter.filter))
    } else {
        encode_value(ctx, item, &filter.filter, filter)?
    };

    // lower() only takes text; numeric comparisons are case free anyway.
    let comparison = if op.is_case_insensitive() && !op.is_like() && !numeric {
        format!(
            "lower({column}) {} {}",
            op.sql_operator(),
            value.to_lowercase()
        )
    } else {
        format!("{column} {} {value}", op.sql_operator())
    };

    if op.is_negated() {
        if numeric {
            Ok(format!("({column} is null or {comparison})"))
        } else {
            Ok(format!("(coalesce({column},'') = '' or {comparison})"))
        }
    } else {
        Ok(comparison)
    }
}

fn in_predicate(
    ctx: &SqlContext,
    column: &str,
    item: &QueryItem,
    filter: &QueryFilter,
) -> Result<String> {
    let values = filter.values();
    let has_nv = values.iter().any(|v| *v == NV);
    let encoded = values
        .iter()
        .filter(|v| **v != NV)
        .map(|v| encode_value(ctx, item, v, filter))
        .collect::<Result<Vec<_>>>()?;

    Ok(match (encoded.is_empty(), has_nv) {
        (true, _) => format!("{column} is null"),
        (false, true) => format!("({column} in ({}) or {column} is null)", encoded.join(",")),
        (false, false) => format!("{column} in ({})", encoded.join(",")),
    })
}

/// Numeric items take unquoted values, validated as numbers.
fn encode_value(
    ctx: &SqlContext,
    item: &QueryItem,
    value: &str,
    filter: &QueryFilter,
) -> Result<String> {
    if item.is_numeric() {
        let trimmed = value.trim();
        trimmed
            .parse::<f64>()
            .map_err(|_| AnalyticsError::validation(ValidationCode::InvalidFilter, filter))?;
        Ok(trimmed.to_string())
    } else {
        Ok(ctx.literal(value))
    }
}

/// Predicates for all item filters. Filters of one item are ANDed;
/// repeatable stage items sharing a `stage.item` key are ORed as a group.
pub fn item_filter_conditions(
    ctx: &SqlContext,
    desc: &QueryDescriptor,
    analytics_type: AnalyticsType,
) -> Result<Vec<String>> {
    let mut predicates = Vec::new();
    let mut repeatable: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for item in desc.items_and_item_filters().filter(|i| i.has_filters()) {
        let column = item_filter_expression(ctx, desc, item, analytics_type)?;
        let parts = item
            .filters
            .iter()
            .map(|f| filter_predicate(ctx, &column, item, f))
            .collect::<Result<Vec<_>>>()?;
        let combined = parts.join(" and ");

        if item.is_repeatable_stage() {
            repeatable
                .entry(item.repeatable_group_key())
                .or_default()
                .push(combined);
        } else {
            predicates.extend(parts);
        }
    }

    predicates.extend(repeatable.values().map(|group| or_group(group)));
    Ok(predicates)
}

/// Org unit predicate for the selection mode.
pub fn org_unit_condition(ctx: &SqlContext, desc: &QueryDescriptor) -> Option<String> {
    let units = desc.org_units();
    if units.is_empty() {
        return None;
    }
    let ou = ctx.col(ORGUNIT_DIM_ID);
    match desc.org_unit_mode {
        OrgUnitSelectionMode::Selected => Some(format!(
            "{ou} in ({})",
            ctx.literal_list(units.iter().map(|u| u.uid.as_str()))
        )),
        OrgUnitSelectionMode::Children => {
            let children: Vec<&str> = units
                .iter()
                .flat_map(|u| u.children.iter().map(String::as_str))
                .collect();
            if children.is_empty() {
                Some("1 = 0".to_string())
            } else {
                Some(format!("{ou} in ({})", ctx.literal_list(children)))
            }
        }
        OrgUnitSelectionMode::Descendants => {
            let mut by_level: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
            for unit in &units {
                by_level.entry(unit.level).or_default().push(unit.uid.as_str());
            }
            let parts: Vec<String> = by_level
                .into_iter()
                .map(|(level, uids)| {
                    format!(
                        "{} in ({})",
                        ctx.col(&format!("uidlevel{level}")),
                        ctx.literal_list(uids)
                    )
                })
                .collect();
            Some(or_group(&parts))
        }
    }
}

/// Category, category option group set and org unit group set predicates.
pub fn dimension_conditions(ctx: &SqlContext, desc: &QueryDescriptor) -> Vec<String> {
    desc.dimensions_and_filters()
        .filter(|d| !d.is_period() && !d.is_org_unit() && !d.items.is_empty())
        .filter(|d| !(d.dimension_type == DimensionType::OrganisationUnitGroupSet && d.all_items))
        .map(|d| {
            format!(
                "{} in ({})",
                ctx.col(d.dimension_name()),
                ctx.literal_list(d.item_uids())
            )
        })
        .collect()
}

/// `"value" in ('code')` restricting the value dimension to one option.
pub fn option_condition(ctx: &SqlContext, desc: &QueryDescriptor) -> Option<String> {
    let value = desc.value.as_ref()?;
    let option = desc.option.as_ref()?;
    Some(format!(
        "{} in ({})",
        ctx.col(value.column_name()),
        ctx.literal(&option.code)
    ))
}
