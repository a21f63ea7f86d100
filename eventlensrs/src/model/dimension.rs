use serde::{Deserialize, Serialize};

use super::period::Period;

pub const PERIOD_DIM_ID: &str = "pe";
pub const ORGUNIT_DIM_ID: &str = "ou";
pub const DATA_X_DIM_ID: &str = "dx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DimensionType {
    Period,
    OrganisationUnit,
    Category,
    CategoryOptionGroupSet,
    OrganisationUnitGroupSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgUnit {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    /// 1-based hierarchy level.
    pub level: u32,
    /// Immediate children, used by the CHILDREN selection mode.
    #[serde(default)]
    pub children: Vec<String>,
}

impl OrgUnit {
    pub fn new(uid: impl Into<String>, level: u32) -> Self {
        Self {
            uid: uid.into(),
            name: String::new(),
            code: None,
            level,
            children: Vec::new(),
        }
    }
}

/// Generic dimension item (category option, group, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionOption {
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DimensionItem {
    Period(Period),
    OrgUnit(OrgUnit),
    Option(DimensionOption),
}

impl DimensionItem {
    pub fn uid(&self) -> &str {
        match self {
            DimensionItem::Period(p) => p.iso(),
            DimensionItem::OrgUnit(ou) => &ou.uid,
            DimensionItem::Option(o) => &o.uid,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DimensionItem::Period(p) => p.iso(),
            DimensionItem::OrgUnit(ou) => &ou.name,
            DimensionItem::Option(o) => &o.name,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            DimensionItem::Period(p) => Some(p.iso()),
            DimensionItem::OrgUnit(ou) => ou.code.as_deref(),
            DimensionItem::Option(o) => o.code.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub uid: String,
    pub dimension_type: DimensionType,
    /// Physical column when it differs from the uid, e.g. `uidlevel2` or
    /// `monthly`. Filled in by the planner.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub items: Vec<DimensionItem>,
    /// Group set dimensions spanning every group need no predicate.
    #[serde(default)]
    pub all_items: bool,
}

impl Dimension {
    pub fn periods(periods: Vec<Period>) -> Self {
        Self {
            uid: PERIOD_DIM_ID.to_string(),
            dimension_type: DimensionType::Period,
            column: None,
            items: periods.into_iter().map(DimensionItem::Period).collect(),
            all_items: false,
        }
    }

    pub fn org_units(units: Vec<OrgUnit>) -> Self {
        Self {
            uid: ORGUNIT_DIM_ID.to_string(),
            dimension_type: DimensionType::OrganisationUnit,
            column: None,
            items: units.into_iter().map(DimensionItem::OrgUnit).collect(),
            all_items: false,
        }
    }

    pub fn options(
        uid: impl Into<String>,
        dimension_type: DimensionType,
        options: Vec<DimensionOption>,
    ) -> Self {
        Self {
            uid: uid.into(),
            dimension_type,
            column: None,
            items: options.into_iter().map(DimensionItem::Option).collect(),
            all_items: false,
        }
    }

    pub fn with_column(&self, column: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            ..self.clone()
        }
    }

    pub fn with_items(&self, items: Vec<DimensionItem>) -> Self {
        Self {
            items,
            ..self.clone()
        }
    }

    /// Column the dimension is read from in the analytics table.
    pub fn dimension_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.uid)
    }

    pub fn is_period(&self) -> bool {
        self.dimension_type == DimensionType::Period
    }

    pub fn is_org_unit(&self) -> bool {
        self.dimension_type == DimensionType::OrganisationUnit
    }

    pub fn item_uids(&self) -> Vec<&str> {
        self.items.iter().map(DimensionItem::uid).collect()
    }

    pub fn period_items(&self) -> impl Iterator<Item = &Period> {
        self.items.iter().filter_map(|item| match item {
            DimensionItem::Period(p) => Some(p),
            _ => None,
        })
    }

    pub fn org_unit_items(&self) -> impl Iterator<Item = &OrgUnit> {
        self.items.iter().filter_map(|item| match item {
            DimensionItem::OrgUnit(ou) => Some(ou),
            _ => None,
        })
    }
}
