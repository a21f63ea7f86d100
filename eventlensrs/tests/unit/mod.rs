// Planner, SQL generation and service tests against a scripted backend.
mod planning;
mod service_aggregate;
mod service_rows;
mod sql_generation;
mod support;
