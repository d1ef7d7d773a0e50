//! Routing table: pattern-matched backend lookup, hot-reloadable.
//!
//! Rules live in a declarative YAML store with a single writer (the loader)
//! and many readers (routing calls). Reload parses into a fresh rule set
//! first and swaps it in only on success, so a failed reload leaves the
//! previous table live and requests see either the old table or the new
//! one, never a half-loaded mix.

use crate::backend::{Backend, BackendType};
use har_core::{Operation, Params, Value};
use notify::{RecursiveMode, Watcher};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A `{pattern, backends}` routing rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub pattern: Pattern,
    pub backends: Vec<Backend>,
}

/// Partial match criteria over an operation: the operation type and
/// subfields of its target. Absent fields and `"*"` always match; strings
/// containing `*` match as anchored wildcards with `.` literal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub target: Params,
}

impl Pattern {
    fn matches(&self, op: &Operation) -> bool {
        if let Some(operation) = &self.operation
            && !field_matches(operation, Some(&op.op_type.to_string()))
        {
            return false;
        }
        for (key, expected) in &self.target {
            let actual = op.target.get(key).map(value_text);
            let Some(expected) = value_as_text(expected) else {
                continue;
            };
            if !field_matches(&expected, actual.as_deref()) {
                return false;
            }
        }
        true
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(value_text(other)),
    }
}

/// Single-field matcher: `"*"` is a wildcard for the whole field, a string
/// containing `*` is an anchored glob (`.` stays literal), anything else is
/// direct equality.
fn field_matches(pattern: &str, actual: Option<&str>) -> bool {
    if pattern == "*" {
        return true;
    }
    let Some(actual) = actual else {
        return false;
    };
    if pattern.contains('*') {
        let regex = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));
        return Regex::new(&regex)
            .map(|re| re.is_match(actual))
            .unwrap_or(false);
    }
    pattern == actual
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read routing table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid routing table {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml_ng::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct TableFile {
    #[serde(default)]
    routes: Vec<Route>,
}

/// Process-wide routing rule store.
pub struct RoutingTable {
    routes: Arc<RwLock<Vec<Route>>>,
}

impl RoutingTable {
    pub fn from_routes(routes: Vec<Route>) -> Self {
        Self {
            routes: Arc::new(RwLock::new(routes)),
        }
    }

    /// The fallback installed when the file load fails: everything routes
    /// to a passthrough backend with priority 1.
    pub fn fallback() -> Self {
        let passthrough = Backend::new("passthrough", BackendType::Passthrough).with_priority(1);
        Self::from_routes(vec![Route {
            pattern: Pattern {
                operation: Some("*".to_string()),
                target: Params::new(),
            },
            backends: vec![passthrough],
        }])
    }

    fn parse_file(path: &Path) -> Result<Vec<Route>, TableError> {
        let text = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: TableFile =
            serde_yaml_ng::from_str(&text).map_err(|source| TableError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(file.routes)
    }

    /// Load a table from YAML.
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let routes = Self::parse_file(path)?;
        info!("loaded {} routing rules from {}", routes.len(), path.display());
        Ok(Self::from_routes(routes))
    }

    /// Load a table, installing the passthrough fallback on any failure.
    pub fn load_or_fallback(path: &Path) -> Self {
        match Self::load(path) {
            Ok(table) => table,
            Err(err) => {
                warn!("installing passthrough fallback route: {err}");
                Self::fallback()
            }
        }
    }

    /// Swap in a new rule set from `path`. On parse failure the previous
    /// table stays live and the error is returned.
    pub async fn reload(&self, path: &Path) -> Result<usize, TableError> {
        let routes = Self::parse_file(path)?;
        let count = routes.len();
        *self.routes.write().await = routes;
        info!("routing table reloaded: {count} rules");
        Ok(count)
    }

    /// All backends whose routes match `op`, highest priority first,
    /// deduplicated by name (first occurrence wins).
    pub async fn match_backends(&self, op: &Operation) -> Vec<Backend> {
        let routes = self.routes.read().await;
        let mut candidates: Vec<Backend> = routes
            .iter()
            .filter(|route| route.pattern.matches(op))
            .flat_map(|route| route.backends.iter().cloned())
            .collect();
        candidates.sort_by_key(|backend| std::cmp::Reverse(backend.priority));

        let mut seen = HashSet::new();
        candidates.retain(|backend| seen.insert(backend.name.clone()));
        debug!("{} candidate backend(s) for {}", candidates.len(), op.id);
        candidates
    }

    pub async fn route_count(&self) -> usize {
        self.routes.read().await.len()
    }
}

/// Watch the table file and reload on change. The returned watcher must be
/// kept alive; reload failures are logged, never fatal.
pub fn watch(
    table: Arc<RoutingTable>,
    path: PathBuf,
) -> notify::Result<notify::RecommendedWatcher> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        match result {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(err) => warn!("routing table watcher error: {err}"),
        }
    })?;
    watcher.watch(&path, RecursiveMode::NonRecursive)?;

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            if let Err(err) = table.reload(&path).await {
                warn!("hot reload failed, keeping previous table: {err}");
            }
        }
    });
    Ok(watcher)
}
