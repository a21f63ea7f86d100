//! Tabular query output: headers, rows, metadata, pager and references.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::ValueType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridHeader {
    /// Stable column name; equals the select alias for compiled columns.
    pub name: String,
    /// Display label.
    pub column: String,
    pub value_type: ValueType,
    /// Dimension and metadata columns, as opposed to measured values.
    pub meta: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend_set: Option<String>,
}

impl GridHeader {
    pub fn new(name: impl Into<String>, column: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            value_type,
            meta: false,
            option_set: None,
            legend_set: None,
        }
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub page_count: i64,
}

impl Pager {
    pub fn new(page: i64, page_size: i64, total: i64) -> Self {
        let page_count = if page_size > 0 {
            (total + page_size - 1) / page_size
        } else {
            0
        };
        Self {
            page,
            page_size,
            total,
            page_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub headers: Vec<GridHeader>,
    pub rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pager: Option<Pager>,
    /// Parsed reference values keyed by the token emitted in the rows.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, Value>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(headers: Vec<GridHeader>) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    pub fn add_header(&mut self, header: GridHeader) -> &mut Self {
        self.headers.push(header);
        self
    }

    pub fn add_row(&mut self, row: Vec<Value>) -> &mut Self {
        self.rows.push(row);
        self
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn header_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.name == name)
    }

    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.header_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |r| r.get(idx))
    }

    /// Append rows of another grid with the same headers.
    pub fn append(&mut self, other: Grid) {
        if self.headers.is_empty() {
            self.headers = other.headers;
        }
        self.rows.extend(other.rows);
        self.references.extend(other.references);
    }

    /// Stable sort on one column; nulls always sort last.
    pub fn sort_by_column(&mut self, idx: usize, descending: bool) {
        self.rows.sort_by(|a, b| {
            let (left, right) = (a.get(idx), b.get(idx));
            match (is_null(left), is_null(right)) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = compare_values(left, right);
                    if descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
            }
        });
    }

    pub fn truncate(&mut self, limit: usize) {
        self.rows.truncate(limit);
    }

    pub fn add_reference(&mut self, token: String, value: Value) {
        self.references.insert(token, value);
    }
}

fn is_null(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        _ => Ordering::Equal,
    }
}
