//! Decoding of result rows into typed grid values.
//!
//! Every compiled [`OutputColumn`] carries a [`ValueDecoder`]; the
//! materializer reads each row of a [`RowCursor`] by the column alias the
//! compiler selected it under and appends the decoded row to a [`Grid`].

use serde_json::Value;
use uuid::Uuid;

use crate::config::RoundingConfig;
use crate::error::{AnalyticsError, Result};
use crate::executor::RowCursor;
use crate::grid::Grid;
use crate::model::{IdScheme, LegendSet, OptionSet, QueryItem, ValueType};
use crate::query_builder::OutputColumn;

/// Longitude and latitude keep six decimals regardless of configuration.
pub const COORDINATE_DECIMALS: u32 = 6;

/// Placeholder for missing values in collapsed data dimension text.
pub const NOT_AVAILABLE: &str = "[N/A]";

#[derive(Debug, Clone, PartialEq)]
pub struct ValueDecoder {
    pub value_type: ValueType,
    pub option_set: Option<OptionSet>,
    pub legend_set: Option<LegendSet>,
    /// Overrides the configured rounding precision.
    pub decimals: Option<u32>,
}

impl ValueDecoder {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            option_set: None,
            legend_set: None,
            decimals: None,
        }
    }

    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// Decoder for a query item column. Program indicators round to their own
    /// precision; coordinates and org units are selected as text.
    pub fn for_item(item: &QueryItem) -> Self {
        let value_type = match item.value_type {
            ValueType::Coordinate | ValueType::OrganisationUnit => ValueType::Text,
            other => other,
        };
        Self {
            value_type,
            option_set: item.option_set.clone(),
            legend_set: item.legend_set.clone(),
            decimals: item.as_program_indicator().and_then(|pi| pi.decimals),
        }
    }

    fn is_integer(&self) -> bool {
        matches!(
            self.value_type,
            ValueType::Integer
                | ValueType::IntegerPositive
                | ValueType::IntegerNegative
                | ValueType::IntegerZeroOrPositive
        )
    }

    /// Decode one raw cell. Reference values are parsed and registered in
    /// the grid under a fresh token which becomes the cell value.
    pub fn decode(&self, raw: &Value, options: &DecodeOptions, grid: &mut Grid) -> Value {
        if raw.is_null() {
            return Value::Null;
        }
        if self.value_type.is_numeric() {
            return self.decode_numeric(raw, options);
        }
        if self.value_type.is_reference() {
            return decode_reference(raw, grid);
        }
        match (self.value_type, raw) {
            (ValueType::Boolean | ValueType::TrueOnly, Value::Bool(b)) => Value::Bool(*b),
            _ => text_value(raw),
        }
    }

    fn decode_numeric(&self, raw: &Value, options: &DecodeOptions) -> Value {
        let Some(number) = as_f64(raw) else {
            return text_value(raw);
        };
        if let Some(option) = self
            .option_set
            .as_ref()
            .and_then(|set| set.option_by_numeric_value(number))
        {
            return Value::String(option.code.clone());
        }
        if self.is_integer() && number.fract() == 0.0 {
            return Value::from(number as i64);
        }
        let number = if options.skip_rounding {
            number
        } else {
            round(number, self.decimals.unwrap_or(options.decimals))
        };
        serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Per-request decoding switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub decimals: u32,
    pub skip_rounding: bool,
}

impl DecodeOptions {
    pub fn new(rounding: &RoundingConfig, skip_rounding: bool) -> Self {
        Self {
            decimals: rounding.decimals,
            skip_rounding,
        }
    }
}

/// Append one decoded row per cursor row and exhaust the cursor.
/// Returns the number of rows read.
pub fn materialize_rows(
    cursor: &mut RowCursor<'_>,
    columns: &[OutputColumn],
    options: &DecodeOptions,
    grid: &mut Grid,
) -> Result<usize> {
    let mut count = 0;
    while cursor.next() {
        let mut row = Vec::with_capacity(columns.len());
        for column in columns {
            let raw = cursor.object(column.alias()).ok_or_else(|| {
                AnalyticsError::invariant(format!(
                    "column `{}` missing from result set",
                    column.alias()
                ))
            })?;
            row.push(column.decoder.decode(raw, options, grid));
        }
        grid.add_row(row);
        count += 1;
    }
    Ok(count)
}

/// Translate option and legend backed values to the requested id scheme:
/// option code match first, then legend match, else the value unchanged.
pub fn apply_id_scheme(grid: &mut Grid, columns: &[OutputColumn], scheme: IdScheme) {
    if scheme == IdScheme::Name {
        return;
    }
    for column in columns {
        let decoder = &column.decoder;
        if decoder.option_set.is_none() && decoder.legend_set.is_none() {
            continue;
        }
        let Some(idx) = grid.header_index(column.alias()) else {
            continue;
        };
        for row in grid.rows.iter_mut() {
            if let Some(cell) = row.get_mut(idx) {
                if let Some(translated) = translate(decoder, cell, scheme) {
                    *cell = Value::String(translated);
                }
            }
        }
    }
}

fn translate(decoder: &ValueDecoder, value: &Value, scheme: IdScheme) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if let Some(option) = decoder
        .option_set
        .as_ref()
        .and_then(|set| set.option_by_code(&raw))
    {
        return Some(match scheme {
            IdScheme::Code => option.code.clone(),
            _ => option.uid.clone(),
        });
    }
    let legends = decoder.legend_set.as_ref()?;
    let legend = legends
        .legend_by_uid(&raw)
        .or_else(|| raw.trim().parse().ok().and_then(|v| legends.legend_for_value(v)))?;
    Some(match scheme {
        IdScheme::Code => legend.code.clone().unwrap_or_else(|| legend.uid.clone()),
        _ => legend.uid.clone(),
    })
}

/// `"<short name>: <display value>"` for collapsed data dimensions. Options
/// and legends show their names; missing values show `[N/A]`.
pub fn collapsed_value_text(item: &QueryItem, value: &Value) -> String {
    let display = match value {
        Value::Null => NOT_AVAILABLE.to_string(),
        other => {
            let raw = match other {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            };
            item.option_set
                .as_ref()
                .and_then(|set| set.option_by_code(&raw))
                .map(|o| o.name.clone())
                .or_else(|| {
                    let legends = item.legend_set.as_ref()?;
                    legends
                        .legend_by_uid(&raw)
                        .or_else(|| raw.parse().ok().and_then(|v| legends.legend_for_value(v)))
                        .map(|l| l.name.clone())
                })
                .unwrap_or(raw)
        }
    };
    format!("{}: {}", item.display_short_name(), display)
}

pub fn round(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn as_f64(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_value(raw: &Value) -> Value {
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return Value::Null,
        other => other.to_string(),
    };
    if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    }
}

fn decode_reference(raw: &Value, grid: &mut Grid) -> Value {
    let parsed = match raw {
        Value::String(s) if s.trim().is_empty() => return Value::Null,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed) => parsed,
            Err(_) => return text_value(raw),
        },
        other => other.clone(),
    };
    let token = Uuid::new_v4().to_string();
    grid.add_reference(token.clone(), parsed);
    Value::String(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RowSet;
    use crate::grid::GridHeader;
    use crate::model::{Legend, OptionItem};
    use crate::query_builder::ColumnAndAlias;
    use serde_json::json;

    fn options() -> DecodeOptions {
        DecodeOptions {
            decimals: 2,
            skip_rounding: false,
        }
    }

    fn option_set() -> OptionSet {
        OptionSet {
            uid: "osA".into(),
            options: vec![
                OptionItem {
                    uid: "optOne".into(),
                    code: "1".into(),
                    name: "One".into(),
                },
                OptionItem {
                    uid: "optTwo".into(),
                    code: "2".into(),
                    name: "Two".into(),
                },
            ],
        }
    }

    fn legend_set() -> LegendSet {
        LegendSet {
            uid: "lsA".into(),
            legends: vec![
                Legend {
                    uid: "lgLow".into(),
                    code: Some("LOW".into()),
                    name: "Low".into(),
                    start: 0.0,
                    end: 10.0,
                },
                Legend {
                    uid: "lgHigh".into(),
                    code: None,
                    name: "High".into(),
                    start: 10.0,
                    end: 100.0,
                },
            ],
        }
    }

    fn column(alias: &str, decoder: ValueDecoder) -> OutputColumn {
        OutputColumn::new(
            ColumnAndAlias::new(format!("ax.\"{alias}\""), alias),
            GridHeader::new(alias, alias, decoder.value_type),
            decoder,
        )
    }

    #[test]
    fn numeric_values_round_unless_skipped() {
        let mut grid = Grid::new();
        let decoder = ValueDecoder::new(ValueType::Number);
        assert_eq!(decoder.decode(&json!(3.14159), &options(), &mut grid), json!(3.14));
        let skip = DecodeOptions {
            skip_rounding: true,
            ..options()
        };
        assert_eq!(decoder.decode(&json!("3.14159"), &skip, &mut grid), json!(3.14159));
        let precise = decoder.clone().with_decimals(COORDINATE_DECIMALS);
        assert_eq!(
            precise.decode(&json!(10.1234567), &options(), &mut grid),
            json!(10.123457)
        );
        assert_eq!(decoder.decode(&Value::Null, &options(), &mut grid), Value::Null);
    }

    #[test]
    fn integer_values_stay_integers() {
        let mut grid = Grid::new();
        let decoder = ValueDecoder::new(ValueType::Integer);
        assert_eq!(decoder.decode(&json!(7), &options(), &mut grid), json!(7));
        assert_eq!(decoder.decode(&json!(7.0), &options(), &mut grid), json!(7));
    }

    #[test]
    fn option_codes_match_numerically() {
        let mut grid = Grid::new();
        let mut decoder = ValueDecoder::new(ValueType::Number);
        decoder.option_set = Some(option_set());
        assert_eq!(decoder.decode(&json!("1.0"), &options(), &mut grid), json!("1"));
        assert_eq!(decoder.decode(&json!(1.0), &options(), &mut grid), json!("1"));
        assert_eq!(decoder.decode(&json!("1"), &options(), &mut grid), json!("1"));
        assert_eq!(decoder.decode(&json!(3.5), &options(), &mut grid), json!(3.5));
    }

    #[test]
    fn text_is_trimmed_and_empty_is_null() {
        let mut grid = Grid::new();
        let decoder = ValueDecoder::new(ValueType::Text);
        assert_eq!(decoder.decode(&json!("  abc "), &options(), &mut grid), json!("abc"));
        assert_eq!(decoder.decode(&json!("   "), &options(), &mut grid), Value::Null);
        let boolean = ValueDecoder::new(ValueType::Boolean);
        assert_eq!(boolean.decode(&json!(true), &options(), &mut grid), json!(true));
    }

    #[test]
    fn references_are_registered_under_tokens() {
        let mut grid = Grid::new();
        let decoder = ValueDecoder::new(ValueType::Geojson);
        let raw = json!("{\"type\":\"Point\",\"coordinates\":[1.0,2.0]}");
        let token = decoder.decode(&raw, &options(), &mut grid);
        let token = token.as_str().unwrap().to_string();
        assert!(Uuid::parse_str(&token).is_ok());
        assert_eq!(grid.references[&token]["type"], json!("Point"));
    }

    #[test]
    fn materializes_rows_by_alias() {
        let set = RowSet::new(
            vec!["value".into(), "ou".into()],
            vec![
                vec![json!(4.0), json!("ouA")],
                vec![json!(6.006), json!(" ouB ")],
            ],
        );
        let columns = vec![
            column("ou", ValueDecoder::new(ValueType::Text)),
            column("value", ValueDecoder::new(ValueType::Number)),
        ];
        let mut grid = Grid::new();
        let mut cursor = set.cursor();
        let read = materialize_rows(&mut cursor, &columns, &options(), &mut grid).unwrap();
        assert_eq!(read, 2);
        assert_eq!(grid.rows[0], vec![json!("ouA"), json!(4.0)]);
        assert_eq!(grid.rows[1], vec![json!("ouB"), json!(6.01)]);
        assert!(!cursor.next());
    }

    #[test]
    fn missing_alias_is_an_invariant_error() {
        let set = RowSet::new(vec!["value".into()], vec![vec![json!(1)]]);
        let columns = vec![column("deA", ValueDecoder::new(ValueType::Number))];
        let mut grid = Grid::new();
        let err = materialize_rows(&mut set.cursor(), &columns, &options(), &mut grid).unwrap_err();
        assert!(matches!(err, AnalyticsError::Invariant(_)));
    }

    #[test]
    fn id_scheme_prefers_options_then_legends() {
        let mut option_decoder = ValueDecoder::new(ValueType::Text);
        option_decoder.option_set = Some(option_set());
        let mut legend_decoder = ValueDecoder::new(ValueType::Number);
        legend_decoder.legend_set = Some(legend_set());
        let columns = vec![
            column("deOpt", option_decoder),
            column("deLeg", legend_decoder),
            column("dePlain", ValueDecoder::new(ValueType::Text)),
        ];
        let headers = columns.iter().map(|c| c.header.clone()).collect();
        let mut grid = Grid::with_headers(headers);
        grid.add_row(vec![json!("2"), json!(42.0), json!("raw")]);
        grid.add_row(vec![json!("9"), json!(5), Value::Null]);

        let mut uid_grid = grid.clone();
        apply_id_scheme(&mut uid_grid, &columns, IdScheme::Uid);
        assert_eq!(uid_grid.rows[0], vec![json!("optTwo"), json!("lgHigh"), json!("raw")]);
        assert_eq!(uid_grid.rows[1], vec![json!("9"), json!("lgLow"), Value::Null]);

        let mut code_grid = grid.clone();
        apply_id_scheme(&mut code_grid, &columns, IdScheme::Code);
        assert_eq!(code_grid.rows[0][1], json!("lgHigh"));
        assert_eq!(code_grid.rows[1][1], json!("LOW"));

        let mut name_grid = grid.clone();
        apply_id_scheme(&mut name_grid, &columns, IdScheme::Name);
        assert_eq!(name_grid, grid);
    }

    #[test]
    fn collapsed_text_uses_names_and_placeholder() {
        let mut item = QueryItem::data_element("deA", ValueType::Text).with_option_set(option_set());
        item.short_name = Some("Weight".into());
        assert_eq!(collapsed_value_text(&item, &json!("1")), "Weight: One");
        assert_eq!(collapsed_value_text(&item, &Value::Null), "Weight: [N/A]");
        assert_eq!(collapsed_value_text(&item, &json!("x")), "Weight: x");
    }
}
