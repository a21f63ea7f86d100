//! SQL dialect abstractions for the analytics stores.
//!
//! The compilers produce Postgres-flavoured SQL; a dialect maps the few
//! engine-specific constructs (quoting, spatial functions, casts) to the
//! target engine. Both dialects are plain string renderers, so they are
//! always compiled regardless of which backends are enabled.

use crate::model::AggregationType;

/// Dialects render identifiers and primitive expression pieces.
/// Clause composition lives in the query builder; the dialect only maps
/// logical constructs to SQL fragments.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Table alias qualified column, e.g. `ax."ou"`.
    fn qualified(&self, alias: &str, column: &str) -> String {
        format!("{alias}.{}", self.quote_ident(column))
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Aggregate function wrapped around `expr`; custom aggregation returns
    /// the expression untouched since it aggregates itself.
    fn render_aggregation(&self, agg: AggregationType, expr: &str) -> String {
        match agg {
            AggregationType::Custom | AggregationType::None => expr.to_string(),
            other => format!("{}({expr})", other.sql_function()),
        }
    }

    fn nullif_empty(&self, expr: &str) -> String {
        format!("nullif({expr},'')")
    }

    fn cast_date(&self, expr: &str) -> String {
        format!("cast({expr} as date)")
    }

    fn longitude(&self, geom: &str) -> String {
        format!("ST_X({geom})")
    }

    fn latitude(&self, geom: &str) -> String {
        format!("ST_Y({geom})")
    }

    fn centroid(&self, geom: &str) -> String {
        format!("ST_Centroid({geom})")
    }

    /// `[lon,lat]` text composition, six decimals.
    fn coordinate(&self, geom: &str) -> String {
        format!(
            "'[' || round(cast({} as numeric), 6) || ',' || round(cast({} as numeric), 6) || ']'",
            self.longitude(geom),
            self.latitude(geom)
        )
    }

    fn geojson(&self, geom: &str) -> String {
        format!("ST_AsGeoJSON({geom}, 6)")
    }

    /// Spatial predicate restricting `geom` to a `minx,miny,maxx,maxy` box.
    fn bbox_predicate(&self, geom: &str, bbox: &str) -> String;

    fn snap_to_grid(&self, geom: &str, size: u64) -> String {
        format!("ST_SnapToGrid(ST_Transform(ST_SetSRID({geom}, 4326), 3785), {size})")
    }

    /// Aggregate bounding box of a geometry column, as text.
    fn extent(&self, geom: &str) -> String {
        format!("cast(ST_Extent({geom}) as varchar)")
    }

    /// Aggregate collecting a geometry column into one geometry.
    fn collect(&self, geom: &str) -> String {
        format!("ST_Collect({geom})")
    }

    fn as_text(&self, geom: &str) -> String {
        format!("ST_AsText({geom})")
    }

    fn ten_years_before(&self, date: &str) -> String {
        format!("(date '{date}' - interval '10 years')")
    }
}

mod duckdb;
mod postgres;

pub use duckdb::DuckDbDialect;
pub use postgres::PostgresDialect;
