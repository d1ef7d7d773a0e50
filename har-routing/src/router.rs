//! The router: compose table, health, and policy into a routing plan.
//!
//! Operations are processed in vertex order and decisions come back in the
//! same order, so a plan is a pure function of the table, health map,
//! policy list, and input graph (timestamps aside).

use crate::backend::Backend;
use crate::health::HealthChecker;
use crate::policy::PolicyEngine;
use crate::table::RoutingTable;
use har_core::{Graph, GraphError, Params, Value};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// The chosen backend for one operation.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub operation_id: String,
    pub backend: Backend,
    pub alternatives: Vec<Backend>,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A graph plus the parallel sequence of decisions.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingPlan {
    pub id: Uuid,
    #[serde(skip)]
    graph: Graph,
    pub decisions: Vec<RoutingDecision>,
    /// Target dialect the plan was built for.
    pub target: String,
    pub metadata: Params,
}

impl RoutingPlan {
    /// Transformers reduce a plan to its graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }
}

/// One operation that found no backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingFailure {
    pub operation_id: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("graph validation failed: {0}")]
    InvalidGraph(#[from] GraphError),
    #[error("routing failed for {} operation(s)", .0.len())]
    RoutingFailed(Vec<RoutingFailure>),
}

/// Per-request routing options.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Names of policies to apply; empty applies all.
    pub policies: Vec<String>,
}

/// Routing front door over the three control-plane services.
pub struct Router {
    table: Arc<RoutingTable>,
    health: Arc<HealthChecker>,
    policy: Arc<PolicyEngine>,
}

impl Router {
    pub fn new(
        table: Arc<RoutingTable>,
        health: Arc<HealthChecker>,
        policy: Arc<PolicyEngine>,
    ) -> Self {
        Self {
            table,
            health,
            policy,
        }
    }

    /// Build a routing plan for `graph` toward the named target dialect.
    pub async fn route(
        &self,
        graph: Graph,
        target: &str,
        opts: &RouteOptions,
    ) -> Result<RoutingPlan, RouteError> {
        graph.validate()?;

        let mut decisions = Vec::with_capacity(graph.operation_count());
        let mut failures = Vec::new();

        for op in graph.operations() {
            let candidates = self.table.match_backends(op).await;
            let candidates = self.health.filter_healthy(candidates).await;
            let mut candidates = self
                .policy
                .apply_policies(candidates, op, &opts.policies)
                .await;

            if candidates.is_empty() {
                failures.push(RoutingFailure {
                    operation_id: op.id.clone(),
                    reason: "no_backend_available".to_string(),
                });
                continue;
            }
            let backend = candidates.remove(0);
            debug!("routed {} -> {}", op.id, backend.key());
            decisions.push(RoutingDecision {
                operation_id: op.id.clone(),
                backend,
                alternatives: candidates,
                reason: "pattern_match".to_string(),
                timestamp: chrono::Utc::now(),
            });
        }

        if !failures.is_empty() {
            return Err(RouteError::RoutingFailed(failures));
        }

        let mut metadata = Params::new();
        metadata.insert(
            "routed_at".into(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        metadata.insert(
            "policies_applied".into(),
            Value::Array(opts.policies.iter().cloned().map(Value::String).collect()),
        );
        Ok(RoutingPlan {
            id: Uuid::new_v4(),
            graph,
            decisions,
            target: target.to_string(),
            metadata,
        })
    }

    /// Detect operations touching the same resource routed to different
    /// backends. Currently a no-op; plans are not required to be
    /// consistent in that sense yet.
    pub fn check_conflicts(&self, _plan: &RoutingPlan) -> Result<(), RouteError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendType, HealthStatus};
    use crate::health::HealthCheckerConfig;
    use crate::policy::{Policy, PolicyType};
    use crate::table::{Pattern, Route};
    use har_core::{OpType, Operation};

    fn route_for(op_pattern: &str, backends: Vec<Backend>) -> Route {
        Route {
            pattern: Pattern {
                operation: Some(op_pattern.to_string()),
                target: Params::new(),
            },
            backends,
        }
    }

    fn two_backend_router(policies: Vec<Policy>) -> Router {
        let a = Backend::new("a", BackendType::Remote).with_priority(100);
        let b = Backend::new("b", BackendType::Local).with_priority(50);
        Router::new(
            Arc::new(RoutingTable::from_routes(vec![route_for(
                "package_install",
                vec![a, b],
            )])),
            Arc::new(HealthChecker::new(HealthCheckerConfig::default())),
            Arc::new(PolicyEngine::new(policies)),
        )
    }

    fn install_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_operation(
            Operation::new("op_0", OpType::PackageInstall).with_param("package", "nginx"),
        );
        graph
    }

    #[tokio::test]
    async fn test_plan_head_and_alternatives() {
        let router = two_backend_router(vec![]);
        let plan = router
            .route(install_graph(), "salt", &RouteOptions::default())
            .await
            .unwrap();

        assert_eq!(plan.decisions.len(), 1);
        let decision = &plan.decisions[0];
        assert_eq!(decision.backend.name, "a");
        assert_eq!(decision.alternatives.len(), 1);
        assert_eq!(decision.alternatives[0].name, "b");
        assert_eq!(decision.reason, "pattern_match");
        assert_eq!(plan.target, "salt");
        assert!(plan.metadata.contains_key("routed_at"));
    }

    #[tokio::test]
    async fn test_policy_denial_falls_back_to_lower_priority() {
        // Scenario: A (priority 100, remote) denied; B (priority 50) wins
        // with no alternatives left.
        let router = two_backend_router(vec![
            Policy::new("no-remote", PolicyType::Deny)
                .with_priority(10)
                .with_condition("backend_type", "remote"),
        ]);
        let plan = router
            .route(install_graph(), "ansible", &RouteOptions::default())
            .await
            .unwrap();

        let decision = &plan.decisions[0];
        assert_eq!(decision.backend.name, "b");
        assert_eq!(decision.reason, "pattern_match");
        assert!(decision.alternatives.is_empty());
    }

    #[tokio::test]
    async fn test_no_backend_available_aggregates() {
        let router = Router::new(
            Arc::new(RoutingTable::from_routes(vec![])),
            Arc::new(HealthChecker::new(HealthCheckerConfig::default())),
            Arc::new(PolicyEngine::new(vec![])),
        );
        let err = router
            .route(install_graph(), "salt", &RouteOptions::default())
            .await
            .unwrap_err();
        match err {
            RouteError::RoutingFailed(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].operation_id, "op_0");
                assert_eq!(failures[0].reason, "no_backend_available");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_graph_aborts() {
        let mut graph = install_graph();
        graph.add_dependency(har_core::Dependency::new(
            "op_0",
            "ghost",
            har_core::DepKind::Requires,
        ));
        let router = two_backend_router(vec![]);
        assert!(matches!(
            router.route(graph, "salt", &RouteOptions::default()).await,
            Err(RouteError::InvalidGraph(_))
        ));
    }

    #[tokio::test]
    async fn test_unhealthy_backend_filtered() {
        let table = Arc::new(RoutingTable::from_routes(vec![route_for(
            "package_install",
            vec![
                Backend::new("a", BackendType::Remote).with_priority(100),
                Backend::new("b", BackendType::Local).with_priority(50),
            ],
        )]));
        let health = Arc::new(HealthChecker::new(HealthCheckerConfig::default()));
        health.set_health("remote:a", HealthStatus::Unhealthy).await;

        let router = Router::new(table, health, Arc::new(PolicyEngine::new(vec![])));
        let plan = router
            .route(install_graph(), "salt", &RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(plan.decisions[0].backend.name, "b");
    }

    #[tokio::test]
    async fn test_decisions_follow_vertex_order() {
        let mut graph = install_graph();
        graph.add_operation(
            Operation::new("op_1", OpType::PackageInstall).with_param("package", "curl"),
        );
        let router = two_backend_router(vec![]);
        let plan = router
            .route(graph, "salt", &RouteOptions::default())
            .await
            .unwrap();
        let ids: Vec<_> = plan
            .decisions
            .iter()
            .map(|d| d.operation_id.as_str())
            .collect();
        assert_eq!(ids, vec!["op_0", "op_1"]);
    }

    #[tokio::test]
    async fn test_check_conflicts_is_noop() {
        let router = two_backend_router(vec![]);
        let plan = router
            .route(install_graph(), "salt", &RouteOptions::default())
            .await
            .unwrap();
        assert!(router.check_conflicts(&plan).is_ok());
    }
}
