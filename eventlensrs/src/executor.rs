//! Statement results: materialized row sets, a forward-only cursor over
//! them, and the typed outcome of executing one statement.

#[cfg(feature = "duckdb")]
use duckdb::types::{TimeUnit, Value as DuckValue};
#[cfg(feature = "duckdb")]
use serde_json::Map;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
}

/// Rows of one executed statement, values in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into_iter().map(|name| ColumnMeta { name }).collect(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_position(&self, alias: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == alias)
    }

    pub fn cursor(&self) -> RowCursor<'_> {
        RowCursor {
            set: self,
            position: None,
        }
    }
}

/// Column addressing for cursor accessors: 1-based index or alias.
pub trait ColumnIndex {
    fn position(&self, set: &RowSet) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn position(&self, set: &RowSet) -> Option<usize> {
        (*self >= 1 && *self <= set.columns.len()).then(|| *self - 1)
    }
}

impl ColumnIndex for &str {
    fn position(&self, set: &RowSet) -> Option<usize> {
        set.column_position(self)
    }
}

impl ColumnIndex for String {
    fn position(&self, set: &RowSet) -> Option<usize> {
        set.column_position(self)
    }
}

/// Forward-only cursor; call `next()` before reading the first row.
#[derive(Debug)]
pub struct RowCursor<'a> {
    set: &'a RowSet,
    position: Option<usize>,
}

impl<'a> RowCursor<'a> {
    pub fn next(&mut self) -> bool {
        let next = self.position.map(|p| p + 1).unwrap_or(0);
        self.position = Some(next);
        next < self.set.rows.len()
    }

    pub fn object<I: ColumnIndex>(&self, column: I) -> Option<&'a Value> {
        let row = self.set.rows.get(self.position?)?;
        row.get(column.position(self.set)?)
    }

    pub fn string<I: ColumnIndex>(&self, column: I) -> Option<String> {
        match self.object(column)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn double<I: ColumnIndex>(&self, column: I) -> Option<f64> {
        match self.object(column)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn int<I: ColumnIndex>(&self, column: I) -> Option<i64> {
        match self.object(column)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Driver failure classification shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Table or relation does not exist.
    MissingRelation,
    /// Unreachable store, exhausted pool or statement timeout.
    Resource,
    DivisionByZero,
    DataIntegrity,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Result of executing one statement. A missing table is "no data",
/// distinct from a runtime failure.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(RowSet),
    NoTable,
    RuntimeFailure(BackendFailure),
}

impl QueryOutcome {
    pub fn from_result(result: std::result::Result<RowSet, BackendFailure>) -> Self {
        match result {
            Ok(rows) => QueryOutcome::Rows(rows),
            Err(failure) if failure.kind == FailureKind::MissingRelation => QueryOutcome::NoTable,
            Err(failure) => QueryOutcome::RuntimeFailure(failure),
        }
    }
}

#[cfg(feature = "duckdb")]
pub(crate) fn duck_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::from(i),
        DuckValue::SmallInt(i) => Value::from(i),
        DuckValue::Int(i) => Value::from(i),
        DuckValue::BigInt(i) => Value::from(i),
        DuckValue::HugeInt(i) => Value::from(i as f64),
        DuckValue::UTinyInt(i) => Value::from(i),
        DuckValue::USmallInt(i) => Value::from(i),
        DuckValue::UInt(i) => Value::from(i),
        DuckValue::UBigInt(i) => Value::from(i),
        DuckValue::Float(f) => Value::from(f),
        DuckValue::Double(f) => Value::from(f),
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Timestamp(unit, t) => {
            let micros = match unit {
                TimeUnit::Second => t.saturating_mul(1_000_000),
                TimeUnit::Millisecond => t.saturating_mul(1_000),
                TimeUnit::Microsecond => t,
                TimeUnit::Nanosecond => t / 1_000,
            };
            chrono::DateTime::from_timestamp_micros(micros)
                .map(|dt| Value::String(dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.3f").to_string()))
                .unwrap_or(Value::Null)
        }
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Blob(bytes) => Value::String(hex::encode(bytes)),
        DuckValue::Date32(days) => chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days as i64)))
            .map(|date| Value::String(date.to_string()))
            .unwrap_or(Value::Null),
        DuckValue::Time64(unit, t) => Value::String(format!("{t} ({unit:?})")),
        DuckValue::Interval {
            months,
            days,
            nanos,
        } => Value::String(format!("{months} months {days} days {nanos} nanos")),
        DuckValue::List(items) | DuckValue::Array(items) => {
            Value::Array(items.into_iter().map(duck_value_to_json).collect())
        }
        DuckValue::Enum(s) => Value::String(s),
        DuckValue::Struct(fields) => {
            let mut map = Map::new();
            for (key, val) in fields.iter() {
                map.insert(key.clone(), duck_value_to_json(val.clone()));
            }
            Value::Object(map)
        }
        DuckValue::Map(entries) => Value::Array(
            entries
                .iter()
                .map(|(k, v)| {
                    Value::Array(vec![
                        duck_value_to_json(k.clone()),
                        duck_value_to_json(v.clone()),
                    ])
                })
                .collect(),
        ),
        DuckValue::Union(inner) => duck_value_to_json(*inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set() -> RowSet {
        RowSet::new(
            vec!["ou".into(), "value".into()],
            vec![vec![json!("ouA"), json!("4.5")], vec![Value::Null, json!(6)]],
        )
    }

    #[test]
    fn cursor_reads_by_index_and_alias() {
        let set = set();
        let mut cursor = set.cursor();
        assert!(cursor.object(1).is_none());
        assert!(cursor.next());
        assert_eq!(cursor.string(1).as_deref(), Some("ouA"));
        assert_eq!(cursor.double("value"), Some(4.5));
        assert!(cursor.next());
        assert_eq!(cursor.string("ou"), None);
        assert_eq!(cursor.int(2), Some(6));
        assert_eq!(cursor.object(3), None);
        assert_eq!(cursor.object(0), None);
        assert!(!cursor.next());
    }

    #[test]
    fn missing_relation_is_no_table() {
        let outcome = QueryOutcome::from_result(Err(BackendFailure::new(
            FailureKind::MissingRelation,
            "relation does not exist",
        )));
        assert_eq!(outcome, QueryOutcome::NoTable);
        let outcome =
            QueryOutcome::from_result(Err(BackendFailure::new(FailureKind::Resource, "timeout")));
        assert!(matches!(outcome, QueryOutcome::RuntimeFailure(_)));
    }
}
