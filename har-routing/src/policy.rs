//! Policy engine: allow/deny/prefer rule evaluation over routing candidates.
//!
//! Policies are evaluated per backend in descending priority order; the
//! first matching deny short-circuits that backend, prefer boosts are
//! summed and re-rank the survivors. Running counters (evaluations,
//! denials) are kept for observability. Condition keys the engine does not
//! recognize are treated as vacuously satisfied, so newer policy files keep
//! working against older engines.

use crate::backend::Backend;
use har_core::{Operation, Params, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Allow,
    Deny,
    Require,
    Prefer,
}

/// A single routing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    #[serde(default)]
    pub priority: i64,
    /// Partial match over the {backend, operation} tuple. Empty matches
    /// everything.
    #[serde(default)]
    pub condition: Params,
    /// Action payload; `prefer` reads a numeric `boost` (default 10).
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub action: Params,
}

impl Policy {
    pub fn new(name: impl Into<String>, policy_type: PolicyType) -> Self {
        Self {
            name: name.into(),
            policy_type,
            priority: 0,
            condition: Params::new(),
            action: Params::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.condition.insert(key.into(), value.into());
        self
    }

    fn boost(&self) -> i64 {
        self.action
            .get("boost")
            .and_then(Value::as_i64)
            .unwrap_or(10)
    }

    /// Every specified condition key must match the tuple; unknown keys
    /// are vacuously satisfied.
    fn condition_matches(&self, backend: &Backend, op: &Operation) -> bool {
        for (key, expected) in &self.condition {
            let actual: Option<String> = match key.as_str() {
                "backend_type" => Some(backend.backend_type.to_string()),
                "backend_locality" => backend.locality.clone(),
                "operation_type" => Some(op.op_type.to_string()),
                "environment" => Some(op.target.environment().to_string()),
                "device_type" => op.target.device_type().map(str::to_string),
                _ => continue,
            };
            let expected = match expected {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if expected == "*" {
                continue;
            }
            if actual.as_deref() != Some(expected.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid policy file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml_ng::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<Policy>,
}

/// Load a policy set from a YAML file with a top-level `policies:` list.
pub fn load_policies(path: &Path) -> Result<Vec<Policy>, PolicyError> {
    let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file: PolicyFile = serde_yaml_ng::from_str(&text).map_err(|source| PolicyError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    info!("loaded {} policies from {}", file.policies.len(), path.display());
    Ok(file.policies)
}

/// Single-writer policy store with running counters.
pub struct PolicyEngine {
    policies: RwLock<Vec<Policy>>,
    evaluations: AtomicU64,
    denials: AtomicU64,
}

impl PolicyEngine {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self {
            policies: RwLock::new(policies),
            evaluations: AtomicU64::new(0),
            denials: AtomicU64::new(0),
        }
    }

    /// Replace the policy set.
    pub async fn replace(&self, policies: Vec<Policy>) {
        *self.policies.write().await = policies;
    }

    /// Evaluate `names`-selected policies (empty = all) against each
    /// candidate; survivors come back re-ranked by priority plus summed
    /// prefer boosts, descending and stable.
    pub async fn apply_policies(
        &self,
        backends: Vec<Backend>,
        op: &Operation,
        names: &[String],
    ) -> Vec<Backend> {
        let policies = self.policies.read().await;
        let mut selected: Vec<&Policy> = policies
            .iter()
            .filter(|policy| names.is_empty() || names.iter().any(|n| n == &policy.name))
            .collect();
        selected.sort_by_key(|policy| std::cmp::Reverse(policy.priority));

        let mut ranked: Vec<(i64, Backend)> = Vec::with_capacity(backends.len());
        'backends: for backend in backends {
            let mut boost = 0i64;
            for policy in &selected {
                self.evaluations.fetch_add(1, Ordering::Relaxed);
                if !policy.condition_matches(&backend, op) {
                    continue;
                }
                match policy.policy_type {
                    PolicyType::Deny => {
                        self.denials.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "policy {} denies backend {} for {}",
                            policy.name,
                            backend.key(),
                            op.id
                        );
                        continue 'backends;
                    }
                    PolicyType::Allow | PolicyType::Require => {}
                    PolicyType::Prefer => boost += policy.boost(),
                }
            }
            ranked.push((backend.priority + boost, backend));
        }

        ranked.sort_by_key(|(score, _)| std::cmp::Reverse(*score));
        ranked.into_iter().map(|(_, backend)| backend).collect()
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn denial_count(&self) -> u64 {
        self.denials.load(Ordering::Relaxed)
    }
}
