//! Shared fixtures: descriptor builders and a scripted backend that answers
//! statements by substring match.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use eventlens::{
    model::{
        Dimension, OptionItem, OptionSet, OrgUnit, Period, Program, QueryDescriptor, QueryMode,
    },
    AnalyticsConfig, AnalyticsService, BackendConnection, BackendFailure, Dialect, FailureKind,
    PartitionCatalog, PostgresDialect, RowSet, StaticCatalog, VerbatimIndicatorCompiler,
};

/// Canned answer to a statement.
#[derive(Clone)]
pub enum Reply {
    /// Rows as alias keyed objects; columns follow the select aliases.
    Records(Vec<Value>),
    /// A single unnamed column, e.g. `count(1)`.
    Scalar(Value),
    Fail(FailureKind),
}

#[derive(Default)]
pub struct ScriptedBackend {
    replies: Vec<(String, Reply)>,
    pub statements: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `needle`; first match wins.
    pub fn on(mut self, needle: impl Into<String>, reply: Reply) -> Self {
        self.replies.push((needle.into(), reply));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

/// Aliases of the outer select list.
pub fn select_aliases(sql: &str) -> Vec<String> {
    let select = sql.split(" from ").next().unwrap_or(sql);
    select
        .split(" as \"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl BackendConnection for ScriptedBackend {
    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(PostgresDialect)
    }

    async fn execute_sql(&self, sql: &str) -> Result<RowSet, BackendFailure> {
        self.statements.lock().unwrap().push(sql.to_string());
        let reply = self
            .replies
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());
        match reply {
            Some(Reply::Records(records)) => {
                let columns = select_aliases(sql);
                let rows = records
                    .iter()
                    .map(|record| {
                        columns
                            .iter()
                            .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect();
                Ok(RowSet::new(columns, rows))
            }
            Some(Reply::Scalar(value)) => Ok(RowSet::new(vec!["count".into()], vec![vec![value]])),
            Some(Reply::Fail(kind)) => Err(BackendFailure::new(kind, "scripted failure")),
            None => Ok(RowSet::new(select_aliases(sql), Vec::new())),
        }
    }
}

pub fn service_with(
    backend: ScriptedBackend,
    catalog: StaticCatalog,
    config: AnalyticsConfig,
) -> (Arc<ScriptedBackend>, AnalyticsService) {
    let backend = Arc::new(backend);
    let catalog = Arc::new(catalog);
    let service = AnalyticsService::new(
        backend.clone(),
        Arc::new(VerbatimIndicatorCompiler),
        catalog.clone() as Arc<dyn PartitionCatalog>,
        catalog,
        config,
    );
    (backend, service)
}

pub fn catalog_2023() -> StaticCatalog {
    StaticCatalog::new()
        .with_name("deA", "Weight")
        .with_partitions("analytics_event_prga", [2023])
        .with_partitions("analytics_enrollment_prga", [2023])
}

pub fn period(iso: &str) -> Period {
    Period::parse(iso).unwrap()
}

/// Aggregate descriptor over program `prgA`, filtered on org unit `ouA`.
pub fn aggregate(periods: &[&str]) -> QueryDescriptor {
    QueryDescriptor::new(QueryMode::Aggregate, Program::new("prgA"))
        .with_dimension(Dimension::periods(periods.iter().map(|p| period(p)).collect()))
        .with_filter(Dimension::org_units(vec![OrgUnit::new("ouA", 1)]))
}

pub fn row_query(mode: QueryMode) -> QueryDescriptor {
    QueryDescriptor::new(mode, Program::new("prgA"))
        .with_filter(Dimension::periods(vec![period("2023")]))
        .with_filter(Dimension::org_units(vec![OrgUnit::new("ouA", 1)]))
}

pub fn yes_no() -> OptionSet {
    OptionSet {
        uid: "osYesNo".into(),
        options: vec![
            OptionItem {
                uid: "optY".into(),
                code: "Y".into(),
                name: "Yes".into(),
            },
            OptionItem {
                uid: "optN".into(),
                code: "N".into(),
                name: "No".into(),
            },
        ],
    }
}
