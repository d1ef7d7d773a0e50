//! Error taxonomy for the translation core.
//!
//! Every error is a tagged value; failures bubble up the pipeline unchanged
//! and no stage silently substitutes a value. Parse, transform, and routing
//! errors live in their own crates next to the code that raises them; this
//! module holds the errors shared through the IR.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A vertex that failed per-type validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidOperation {
    pub id: String,
    pub reason: String,
}

/// Graph invariant violations surfaced by `Graph::validate` and
/// `Graph::topological_sort`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// An edge endpoint refers to no extant vertex.
    #[error("dependencies reference unknown operation ids: {0:?}")]
    InvalidReferences(Vec<String>),
    /// The edge set contains a cycle.
    #[error("graph contains a circular dependency")]
    CircularDependency,
    /// Vertices violating id uniqueness or required-parameter rules.
    #[error("{} operation(s) failed validation", .0.len())]
    InvalidOperations(Vec<InvalidOperation>),
}

/// Failures of the JSON graph envelope.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("graph envelope decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("graph envelope is not a JSON object")]
    NotAnObject,
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
