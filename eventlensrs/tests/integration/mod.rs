// End-to-end tests against an on-disk DuckDB analytics table.
mod duckdb_service;
