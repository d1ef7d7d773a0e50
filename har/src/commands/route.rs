//! `har route` - run a graph envelope through the control plane and print
//! the routing decisions.

use super::{read_file, StageError};
use clap::Args;
use har_core::{decode_graph, HarConfig};
use har_routing::{
    load_policies, HealthChecker, HealthCheckerConfig, PolicyEngine, RouteOptions, Router,
    RoutingTable,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct RouteArgs {
    /// Graph envelope JSON file
    pub graph: PathBuf,

    /// Routing table YAML (config default when omitted)
    #[arg(long)]
    pub table: Option<PathBuf>,

    /// Target dialect recorded in the plan
    #[arg(long, default_value = "ansible")]
    pub target: String,

    /// Policy YAML to evaluate candidates against (no policies when omitted)
    #[arg(long)]
    pub policies_file: Option<PathBuf>,

    /// Names of policies from the file to apply (all when omitted)
    #[arg(long)]
    pub policies: Vec<String>,
}

pub async fn run(args: &RouteArgs, config: &HarConfig) -> Result<(), StageError> {
    let envelope = read_file(&args.graph)?;
    let graph = decode_graph(&envelope).map_err(|err| StageError::new("bridge", err))?;

    let table_path = args
        .table
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.routing.table_path));
    let table = if config.routing.fallback_enabled {
        RoutingTable::load_or_fallback(&table_path)
    } else {
        RoutingTable::load(&table_path).map_err(|err| StageError::new("routing", err))?
    };

    let policies = match &args.policies_file {
        Some(path) => load_policies(path).map_err(|err| StageError::new("routing", err))?,
        None => Vec::new(),
    };

    let health = HealthChecker::new(HealthCheckerConfig {
        check_interval: config.health.interval(),
        check_timeout: config.health.timeout(),
        fail_open: config.health.fail_open,
    });
    let router = Router::new(
        Arc::new(table),
        Arc::new(health),
        Arc::new(PolicyEngine::new(policies)),
    );

    let opts = RouteOptions {
        policies: args.policies.clone(),
    };
    let plan = router
        .route(graph, &args.target, &opts)
        .await
        .map_err(|err| StageError::new("routing", err))?;

    let rendered = serde_json::to_string_pretty(&plan)
        .map_err(|err| StageError::new("routing", err))?;
    println!("{rendered}");
    Ok(())
}
