//! Semantic graph IR for Hybrid Automation Router.
//!
//! The core crate owns the dialect-neutral intermediate representation:
//! [`Operation`] vertices, [`Dependency`] edges, and the [`Graph`] container
//! with its algorithms (validation, stable topological sort, partitioning,
//! merging). It also carries the JSON bridge used to persist graphs across
//! process boundaries and the process-wide configuration.
//!
//! Parsers produce graphs, the router annotates them with backend decisions,
//! and transformers consume them; none of those crates define IR types of
//! their own.

pub mod bridge;
pub mod config;
pub mod error;
pub mod graph;
pub mod op;
pub mod value;

pub use bridge::{decode_graph, encode_graph, graph_to_json_string};
pub use config::HarConfig;
pub use error::{BridgeError, ConfigError, GraphError, InvalidOperation};
pub use graph::Graph;
pub use op::{DepKind, Dependency, OpType, Operation};
pub use value::{Params, Target, Value};
