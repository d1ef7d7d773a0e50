//! Property tests for the graph laws: topological soundness, merge
//! commutativity, partition completeness, and bridge round-tripping.

use har_core::{decode_graph, graph_to_json_string, DepKind, Dependency, Graph, OpType, Operation};
use proptest::prelude::*;
use std::collections::HashSet;

fn op_type_strategy() -> impl Strategy<Value = OpType> {
    prop_oneof![
        Just(OpType::CommandRun),
        Just(OpType::PackageInstall),
        Just(OpType::ServiceStart),
        Just(OpType::FileWrite),
        Just(OpType::Passthrough("custom".to_string())),
    ]
}

fn operation(idx: usize, op_type: OpType) -> Operation {
    let op = Operation::new(format!("op_{idx}"), op_type.clone());
    match op_type {
        OpType::CommandRun => op.with_param("command", "true"),
        OpType::PackageInstall => op.with_param("package", format!("pkg{idx}")),
        OpType::ServiceStart => op.with_param("service", format!("svc{idx}")),
        OpType::FileWrite => op
            .with_param("path", format!("/tmp/f{idx}"))
            .with_param("content", "x"),
        other => Operation::new(format!("op_{idx}"), other),
    }
}

prop_compose! {
    /// An acyclic graph: edges only run from lower to higher insertion index.
    fn dag()(
        types in prop::collection::vec(op_type_strategy(), 1..12),
        edge_seeds in prop::collection::vec((any::<prop::sample::Index>(), any::<prop::sample::Index>()), 0..20),
    ) -> Graph {
        let mut graph = Graph::new();
        for (idx, op_type) in types.iter().enumerate() {
            graph.add_operation(operation(idx, op_type.clone()));
        }
        let n = types.len();
        for (a, b) in edge_seeds {
            let (a, b) = (a.index(n), b.index(n));
            if a < b {
                graph.add_dependency(Dependency::new(
                    format!("op_{a}"),
                    format!("op_{b}"),
                    DepKind::Requires,
                ));
            }
        }
        graph
    }
}

fn vertex_ids(graph: &Graph) -> HashSet<String> {
    graph.operations().iter().map(|op| op.id.clone()).collect()
}

fn edge_keys(graph: &Graph) -> HashSet<(String, String, DepKind)> {
    graph
        .dependencies()
        .iter()
        .map(|dep| (dep.from.clone(), dep.to.clone(), dep.kind))
        .collect()
}

proptest! {
    #[test]
    fn topological_sort_respects_every_edge(graph in dag()) {
        let sorted = graph.topological_sort().unwrap();
        let position: std::collections::HashMap<&str, usize> = sorted
            .iter()
            .enumerate()
            .map(|(pos, op)| (op.id.as_str(), pos))
            .collect();
        for dep in graph.dependencies() {
            prop_assert!(position[dep.from.as_str()] < position[dep.to.as_str()]);
        }
    }

    #[test]
    fn merge_is_commutative_on_sets(g1 in dag(), g2 in dag()) {
        let ab = Graph::merge([g1.clone(), g2.clone()]);
        let ba = Graph::merge([g2, g1]);
        prop_assert_eq!(vertex_ids(&ab), vertex_ids(&ba));
        prop_assert_eq!(edge_keys(&ab), edge_keys(&ba));
    }

    #[test]
    fn partition_covers_every_vertex_exactly_once(graph in dag()) {
        let parts = graph.partition_by(|op| op.op_type.to_string());
        let mut seen = HashSet::new();
        for (_, part) in &parts {
            for op in part.operations() {
                prop_assert!(seen.insert(op.id.clone()), "vertex appears twice");
            }
        }
        prop_assert_eq!(seen, vertex_ids(&graph));
    }

    #[test]
    fn bridge_round_trip_preserves_identity(graph in dag()) {
        let decoded = decode_graph(&graph_to_json_string(&graph)).unwrap();
        prop_assert_eq!(vertex_ids(&decoded), vertex_ids(&graph));
        prop_assert_eq!(edge_keys(&decoded), edge_keys(&graph));
        for (orig, back) in graph.operations().iter().zip(decoded.operations()) {
            prop_assert_eq!(&orig.op_type, &back.op_type);
            prop_assert_eq!(&orig.params, &back.params);
        }
    }

    #[test]
    fn validate_never_panics_on_arbitrary_edges(
        types in prop::collection::vec(op_type_strategy(), 0..8),
        edges in prop::collection::vec((0usize..10, 0usize..10), 0..16),
    ) {
        let mut graph = Graph::new();
        for (idx, op_type) in types.iter().enumerate() {
            graph.add_operation(operation(idx, op_type.clone()));
        }
        for (a, b) in edges {
            graph.add_dependency(Dependency::new(
                format!("op_{a}"),
                format!("op_{b}"),
                DepKind::Sequential,
            ));
        }
        let _ = graph.validate();
        let _ = graph.topological_sort();
    }
}
