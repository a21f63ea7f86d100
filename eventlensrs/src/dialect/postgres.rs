//! PostgreSQL / PostGIS dialect implementation.

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn coordinate(&self, geom: &str) -> String {
        format!(
            "'[' || round({}::numeric, 6) || ',' || round({}::numeric, 6) || ']'",
            self.longitude(geom),
            self.latitude(geom)
        )
    }

    fn bbox_predicate(&self, geom: &str, bbox: &str) -> String {
        format!("{geom} && ST_MakeEnvelope({bbox},4326)")
    }
}
