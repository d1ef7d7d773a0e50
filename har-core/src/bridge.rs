//! JSON envelope for persisting graphs across process boundaries.
//!
//! The wire shape is `{"vertices": [...], "edges": [...], "metadata": {...}}`
//! with vertices carrying `{id, type, params, target, metadata}` and edges
//! `{from, to, type, metadata}`. Encoding then decoding preserves vertex and
//! edge identity; metadata round-trips as-is.

use crate::error::BridgeError;
use crate::graph::Graph;
use crate::op::{Dependency, Operation};
use crate::value::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(default)]
    vertices: Vec<Operation>,
    #[serde(default)]
    edges: Vec<Dependency>,
    #[serde(default)]
    metadata: Params,
}

/// Encode a graph as the JSON envelope value.
pub fn encode_graph(graph: &Graph) -> Value {
    let envelope = Envelope {
        vertices: graph.operations().to_vec(),
        edges: graph.dependencies().to_vec(),
        metadata: graph.metadata.clone(),
    };
    // Serialization of plain vectors and maps cannot fail.
    serde_json::to_value(envelope).unwrap_or(Value::Null)
}

/// Encode a graph as a pretty-printed JSON string.
pub fn graph_to_json_string(graph: &Graph) -> String {
    serde_json::to_string_pretty(&encode_graph(graph)).unwrap_or_default()
}

/// Reconstruct a graph from envelope text.
pub fn decode_graph(text: &str) -> Result<Graph, BridgeError> {
    let probe: Value = serde_json::from_str(text)?;
    if !probe.is_object() {
        return Err(BridgeError::NotAnObject);
    }
    let envelope: Envelope = serde_json::from_value(probe)?;
    Ok(Graph::from_parts(
        envelope.vertices,
        envelope.edges,
        envelope.metadata,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{DepKind, OpType};
    use crate::value::Target;

    #[test]
    fn test_round_trip_preserves_vertices_and_edges() {
        let mut g = Graph::new().with_metadata("source_format", "ansible");
        g.add_operation(
            Operation::new("op_0", OpType::PackageInstall)
                .with_param("package", "nginx")
                .with_target(Target::new().with("os", "debian"))
                .with_meta("name", "Install nginx"),
        );
        g.add_operation(
            Operation::new("op_1", OpType::ServiceStart).with_param("service", "nginx"),
        );
        g.add_dependency(Dependency::new("op_0", "op_1", DepKind::Sequential));

        let decoded = decode_graph(&graph_to_json_string(&g)).unwrap();
        assert_eq!(decoded, g);
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert!(matches!(
            decode_graph("[1, 2, 3]").unwrap_err(),
            BridgeError::NotAnObject
        ));
        assert!(decode_graph("not json").is_err());
    }

    #[test]
    fn test_decode_defaults_missing_sections() {
        let g = decode_graph("{}").unwrap();
        assert!(g.is_empty());
        assert_eq!(g.dependency_count(), 0);
    }

    #[test]
    fn test_passthrough_type_round_trips() {
        let mut g = Graph::new();
        g.add_operation(
            Operation::new("op_0", OpType::Passthrough("debug".into()))
                .with_meta("raw", "debug: msg=hello"),
        );
        let decoded = decode_graph(&graph_to_json_string(&g)).unwrap();
        assert_eq!(
            decoded.operations()[0].op_type,
            OpType::Passthrough("debug".into())
        );
    }
}
