use std::{env, fs, path::PathBuf, sync::Arc};

use eventlens::{
    manager::AnalyticsManager,
    model::{AnalyticsType, QueryDescriptor, QueryMode},
    planner::scope::indicator_scope,
    telemetry, AllPartitions, AnalyticsConfig, EnrollmentManager, EventManager, PartitionCatalog,
    PostgresDialect, QueryPlanner, SqlContext, StaticCatalog, VerbatimIndicatorCompiler,
};

fn manager_for<'a>(
    events: &'a EventManager,
    enrollments: &'a EnrollmentManager,
    desc: &QueryDescriptor,
) -> &'a dyn AnalyticsManager {
    match indicator_scope(desc).table {
        AnalyticsType::Event => events,
        AnalyticsType::Enrollment => enrollments,
    }
}

fn usage() {
    eprintln!("Usage: print_sql <descriptor_json> [catalog_dir]");
    eprintln!("Example: cargo run --example print_sql -- request.json catalog/");
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        usage();
        std::process::exit(1);
    }

    let descriptor_path = PathBuf::from(args.remove(0));
    let catalog: Arc<dyn PartitionCatalog> = match args.first() {
        Some(dir) => Arc::new(StaticCatalog::load_from_dir(dir)?),
        None => Arc::new(AllPartitions),
    };
    let desc: QueryDescriptor = serde_json::from_str(&fs::read_to_string(descriptor_path)?)?;

    let config = AnalyticsConfig::load_default();
    let ctx = SqlContext::new(
        Arc::new(PostgresDialect),
        Arc::new(VerbatimIndicatorCompiler),
        &config,
    );
    let events = EventManager::new(ctx.clone());
    let enrollments = EnrollmentManager::new(ctx);

    let planner = QueryPlanner::new(&config, catalog);
    match desc.mode {
        QueryMode::Aggregate => {
            for planned in planner.plan_aggregate_query(&desc)? {
                println!("{};", manager_for(&events, &enrollments, &planned).aggregated_sql(&planned)?.sql);
            }
        }
        QueryMode::Events => {
            let planned = planner.plan_event_query(&desc)?;
            println!("{};", events.events_sql(&planned)?.sql);
        }
        QueryMode::Enrollments => {
            let planned = planner.plan_enrollment_query(&desc)?;
            println!("{};", enrollments.events_sql(&planned)?.sql);
        }
    }
    Ok(())
}
