//! DuckDB dialect implementation (spatial extension).

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    // ST_AsGeoJSON takes no precision argument in the spatial extension.
    fn geojson(&self, geom: &str) -> String {
        format!("ST_AsGeoJSON({geom})")
    }

    fn bbox_predicate(&self, geom: &str, bbox: &str) -> String {
        format!("ST_Intersects({geom}, ST_MakeEnvelope({bbox}))")
    }

    fn snap_to_grid(&self, geom: &str, size: u64) -> String {
        format!(
            "ST_Point(round(ST_X({geom}) / {size}) * {size}, round(ST_Y({geom}) / {size}) * {size})"
        )
    }

    // Aggregates carry an _Agg suffix; plain ST_Extent is per row.
    fn extent(&self, geom: &str) -> String {
        format!("cast(ST_Extent_Agg({geom}) as varchar)")
    }

    fn collect(&self, geom: &str) -> String {
        format!("ST_Union_Agg({geom})")
    }

    fn ten_years_before(&self, date: &str) -> String {
        format!("(date '{date}' - interval 10 year)")
    }
}
