//! Validation and splitting of descriptors into physically executable ones.
//!
//! Aggregate queries pass through four stages in fixed order, each of which
//! may multiply the list: by query item, by partition, by org unit level and
//! by period type. Row-list queries are validated and bound to one table.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{AnalyticsConfig, TableConfig};
use crate::error::Result;
use crate::model::{
    AnalyticsType, Dimension, DimensionItem, OrgUnitSelectionMode, PeriodType, Program,
    QueryDescriptor, ORGUNIT_DIM_ID, PERIOD_DIM_ID,
};
use crate::resolvers::PartitionCatalog;
use crate::validation::Validator;

pub mod partitions;
pub mod scope;

use partitions::{existing_partitions, requested_years};
use scope::indicator_scope;

/// Org unit level column in the analytics tables, e.g. `uidlevel2`.
pub fn org_unit_level_column(level: u32) -> String {
    format!("uidlevel{level}")
}

pub struct QueryPlanner {
    tables: TableConfig,
    validator: Validator,
    catalog: Arc<dyn PartitionCatalog>,
}

impl QueryPlanner {
    pub fn new(config: &AnalyticsConfig, catalog: Arc<dyn PartitionCatalog>) -> Self {
        Self {
            tables: config.tables.clone(),
            validator: Validator::new(config.query.max_limit),
            catalog,
        }
    }

    pub fn validate(&self, desc: &QueryDescriptor) -> Result<()> {
        self.validator.validate(desc)
    }

    /// Validate and split an aggregate descriptor. Slices without any
    /// existing partition are dropped rather than returned empty.
    pub fn plan_aggregate_query(&self, desc: &QueryDescriptor) -> Result<Vec<QueryDescriptor>> {
        self.validate(desc)?;

        let by_item = group_by_query_item(desc);
        let item_count = by_item.len();

        let mut by_partition = Vec::with_capacity(item_count);
        for query in &by_item {
            if let Some(bound) = self.bind_partitions(query) {
                by_partition.push(bound);
            }
        }
        let dropped = item_count - by_partition.len();

        let planned: Vec<QueryDescriptor> = by_partition
            .iter()
            .flat_map(group_by_org_unit_level)
            .flat_map(|q| group_by_period_type(&q))
            .collect();

        tracing::debug!(
            items = item_count,
            dropped,
            planned = planned.len(),
            "planned aggregate query"
        );
        Ok(planned)
    }

    /// Validate a row-list event query and bind it to its event table.
    pub fn plan_event_query(&self, desc: &QueryDescriptor) -> Result<QueryDescriptor> {
        self.plan_row_query(desc, AnalyticsType::Event)
    }

    /// Validate a row-list enrollment query and bind it to its enrollment table.
    pub fn plan_enrollment_query(&self, desc: &QueryDescriptor) -> Result<QueryDescriptor> {
        self.plan_row_query(desc, AnalyticsType::Enrollment)
    }

    fn plan_row_query(
        &self,
        desc: &QueryDescriptor,
        analytics_type: AnalyticsType,
    ) -> Result<QueryDescriptor> {
        self.validate(desc)?;
        let table = self.tables.table_name(analytics_type, &desc.program.uid);
        let requested = requested_years(desc, analytics_type);
        let partitions = if desc.skip_partitioning {
            requested
        } else {
            existing_partitions(self.catalog.as_ref(), &table, &requested)
        };
        tracing::debug!(
            table = %table,
            partitions = ?partitions.as_strings(),
            "planned row query"
        );
        Ok(with_single_period_type(&desc.with_table(table, partitions)))
    }

    fn bind_partitions(&self, desc: &QueryDescriptor) -> Option<QueryDescriptor> {
        let scope = indicator_scope(desc);
        let program_uid = desc
            .program_indicator
            .as_ref()
            .map(|pi| pi.program.as_str())
            .unwrap_or(&desc.program.uid);
        let table = self.tables.table_name(scope.table, program_uid);
        let requested = requested_years(desc, scope.table);

        if desc.skip_partitioning {
            return Some(desc.with_table(table, requested));
        }
        let existing = existing_partitions(self.catalog.as_ref(), &table, &requested);
        if existing.is_empty() {
            tracing::debug!(table = %table, "no partitions for slice, dropping");
            return None;
        }
        Some(desc.with_table(table, existing))
    }
}

/// One descriptor per item when aggregating data or collapsing data
/// dimensions. Aggregate data substitutes the item as value (or program
/// indicator); collapsing keeps it as the only item.
fn group_by_query_item(desc: &QueryDescriptor) -> Vec<QueryDescriptor> {
    if !(desc.aggregate_data || desc.collapse_data_dimensions) || desc.items.is_empty() {
        return vec![desc.clone()];
    }

    desc.items
        .iter()
        .map(|item| {
            let mut query = if desc.aggregate_data {
                match item.as_program_indicator() {
                    Some(pi) => desc
                        .with_items(Vec::new())
                        .with_value(None)
                        .with_program_indicator(Some(pi.clone())),
                    None => desc
                        .with_items(Vec::new())
                        .with_value(Some(item.clone())),
                }
            } else {
                let query = desc.with_items(vec![item.clone()]);
                match item.as_program_indicator() {
                    Some(pi) => query.with_program_indicator(Some(pi.clone())),
                    None => query,
                }
            };
            if let Some(program) = &item.program {
                query = query.with_program(program.clone());
            } else if let Some(pi) = item.as_program_indicator() {
                if pi.program != desc.program.uid {
                    query = query.with_program(Program {
                        uid: pi.program.clone(),
                        ..desc.program.clone()
                    });
                }
            }
            query
        })
        .collect()
}

/// Split the `ou` dimension by hierarchy level. In descendants mode each
/// slice reads the denormalized `uidlevelN` column.
fn group_by_org_unit_level(desc: &QueryDescriptor) -> Vec<QueryDescriptor> {
    let Some(dimension) = desc.dimension(ORGUNIT_DIM_ID) else {
        return vec![desc.clone()];
    };

    let mut by_level: BTreeMap<u32, Vec<DimensionItem>> = BTreeMap::new();
    for unit in dimension.org_unit_items() {
        by_level
            .entry(unit.level)
            .or_default()
            .push(DimensionItem::OrgUnit(unit.clone()));
    }
    if by_level.is_empty() {
        return vec![desc.clone()];
    }

    by_level
        .into_iter()
        .map(|(level, items)| {
            let mut split = dimension.with_items(items);
            if desc.org_unit_mode == OrgUnitSelectionMode::Descendants {
                split = split.with_column(org_unit_level_column(level));
            }
            desc.with_replaced_dimension(split)
        })
        .collect()
}

/// Split the `pe` dimension by period type and point it at the matching
/// period column.
fn group_by_period_type(desc: &QueryDescriptor) -> Vec<QueryDescriptor> {
    let Some(dimension) = desc.dimension(PERIOD_DIM_ID) else {
        return vec![desc.clone()];
    };

    let mut by_type: BTreeMap<PeriodType, Vec<DimensionItem>> = BTreeMap::new();
    for period in dimension.period_items() {
        by_type
            .entry(period.period_type())
            .or_default()
            .push(DimensionItem::Period(period.clone()));
    }
    if by_type.is_empty() {
        return vec![desc.clone()];
    }

    by_type
        .into_iter()
        .map(|(period_type, items)| {
            let split: Dimension = dimension
                .with_items(items)
                .with_column(period_type.column());
            desc.with_replaced_dimension(split)
        })
        .collect()
}

/// Row queries never split; the period column is only set when the
/// dimension holds a single period type.
fn with_single_period_type(desc: &QueryDescriptor) -> QueryDescriptor {
    match group_by_period_type(desc).as_slice() {
        [single] => single.clone(),
        _ => desc.clone(),
    }
}
