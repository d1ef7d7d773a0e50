//! The semantic graph container and its algorithms.
//!
//! A graph is a flat, insertion-ordered list of operations plus a flat list
//! of dependency edges referencing operations by id. Lookup builds a small
//! id→index map on demand, so the structure stays a plain value type:
//! cheap to clone, trivially shareable between concurrent readers, and
//! mutated only while a parser is constructing it.

use crate::error::{GraphError, InvalidOperation};
use crate::op::{Dependency, OpType, Operation};
use crate::value::{Params, Value};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::hash::Hash;

/// Dialect-neutral IR: operations, dependencies, and advisory metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    operations: Vec<Operation>,
    dependencies: Vec<Dependency>,
    /// Source dialect, parse timestamp, and similar advisory data.
    pub metadata: Params,
}

impl Graph {
    /// Construct an empty graph. No validation happens here or in any
    /// builder; call [`Graph::validate`] before relying on the invariants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct from pre-built parts.
    pub fn from_parts(
        operations: Vec<Operation>,
        dependencies: Vec<Dependency>,
        metadata: Params,
    ) -> Self {
        Self {
            operations,
            dependencies,
            metadata,
        }
    }

    /// Append a vertex. Insertion order is significant: it is the stable
    /// tie-breaker for topological sorting.
    pub fn add_operation(&mut self, op: Operation) {
        self.operations.push(op);
    }

    /// Append an edge.
    pub fn add_dependency(&mut self, dep: Dependency) {
        self.dependencies.push(dep);
    }

    /// Set a metadata key, returning `self` for chained construction.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Mutable access to the vertices, for parsers that stamp fields onto
    /// every operation after construction. The vertex set itself cannot be
    /// changed through this.
    pub fn operations_mut(&mut self) -> &mut [Operation] {
        &mut self.operations
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Find a vertex by id.
    pub fn find_operation(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// All vertices of a given type, in insertion order.
    pub fn operations_by_type(&self, op_type: &OpType) -> Vec<&Operation> {
        self.operations
            .iter()
            .filter(|op| &op.op_type == op_type)
            .collect()
    }

    /// Incoming edges of a vertex.
    pub fn dependencies_for(&self, id: &str) -> Vec<&Dependency> {
        self.dependencies.iter().filter(|dep| dep.to == id).collect()
    }

    fn index_by_id(&self) -> HashMap<&str, usize> {
        self.operations
            .iter()
            .enumerate()
            .map(|(idx, op)| (op.id.as_str(), idx))
            .collect()
    }

    /// Kahn's algorithm with a stable tie-breaker: among vertices with no
    /// unresolved incoming edges, the one inserted earliest is emitted
    /// first. Edges whose endpoints are unknown do not constrain the order;
    /// [`Graph::validate`] reports them as invalid references.
    pub fn topological_sort(&self) -> Result<Vec<&Operation>, GraphError> {
        let index = self.index_by_id();
        let n = self.operations.len();
        let mut indegree = vec![0usize; n];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];

        for dep in &self.dependencies {
            if let (Some(&from), Some(&to)) =
                (index.get(dep.from.as_str()), index.get(dep.to.as_str()))
            {
                indegree[to] += 1;
                outgoing[from].push(to);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&idx| indegree[idx] == 0)
            .map(Reverse)
            .collect();

        let mut sorted = Vec::with_capacity(n);
        while let Some(Reverse(idx)) = ready.pop() {
            sorted.push(&self.operations[idx]);
            for &next in &outgoing[idx] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if sorted.len() < n {
            return Err(GraphError::CircularDependency);
        }
        Ok(sorted)
    }

    /// Check the graph invariants, first failure wins: orphan edge
    /// endpoints, then acyclicity, then id uniqueness and per-type
    /// required-parameter rules.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids = HashSet::new();
        let mut duplicates = Vec::new();
        for op in &self.operations {
            if !ids.insert(op.id.as_str()) {
                duplicates.push(InvalidOperation {
                    id: op.id.clone(),
                    reason: "duplicate operation id".to_string(),
                });
            }
        }

        let mut bad_refs = Vec::new();
        for dep in &self.dependencies {
            for endpoint in [&dep.from, &dep.to] {
                if !ids.contains(endpoint.as_str()) && !bad_refs.contains(endpoint) {
                    bad_refs.push(endpoint.clone());
                }
            }
        }
        if !bad_refs.is_empty() {
            return Err(GraphError::InvalidReferences(bad_refs));
        }

        self.topological_sort()?;

        let mut invalid = duplicates;
        invalid.extend(self.operations.iter().filter_map(|op| {
            op.check_params().err().map(|reason| InvalidOperation {
                id: op.id.clone(),
                reason,
            })
        }));
        if !invalid.is_empty() {
            return Err(GraphError::InvalidOperations(invalid));
        }
        Ok(())
    }

    /// Split into subgraphs keyed by `f` applied per vertex. An edge
    /// survives iff both endpoints land in the same part; cross-partition
    /// edges are dropped silently, so callers that need them must record
    /// them before partitioning. Parts appear in first-seen key order.
    pub fn partition_by<K, F>(&self, f: F) -> Vec<(K, Graph)>
    where
        K: Eq + Hash + Clone,
        F: Fn(&Operation) -> K,
    {
        let mut order: Vec<K> = Vec::new();
        let mut parts: HashMap<K, Graph> = HashMap::new();
        let mut key_of: HashMap<&str, K> = HashMap::new();

        for op in &self.operations {
            let key = f(op);
            key_of.insert(op.id.as_str(), key.clone());
            let part = parts.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                Graph::new().with_metadata("partitioned_from", self.metadata.clone())
            });
            part.add_operation(op.clone());
        }

        for dep in &self.dependencies {
            let (Some(from_key), Some(to_key)) =
                (key_of.get(dep.from.as_str()), key_of.get(dep.to.as_str()))
            else {
                continue;
            };
            if from_key == to_key
                && let Some(part) = parts.get_mut(from_key)
            {
                part.add_dependency(dep.clone());
            }
        }

        order
            .into_iter()
            .filter_map(|key| parts.remove(&key).map(|part| (key, part)))
            .collect()
    }

    /// Union of several graphs. Vertices are deduplicated by id, edges by
    /// `{from, to, kind}`; the first occurrence wins in both cases.
    /// Metadata maps are merged left to right.
    pub fn merge(graphs: impl IntoIterator<Item = Graph>) -> Graph {
        let mut merged = Graph::new();
        let mut seen_ops = HashSet::new();
        let mut seen_deps = HashSet::new();

        for graph in graphs {
            for op in graph.operations {
                if seen_ops.insert(op.id.clone()) {
                    merged.operations.push(op);
                }
            }
            for dep in graph.dependencies {
                let key = (dep.from.clone(), dep.to.clone(), dep.kind);
                if seen_deps.insert(key) {
                    merged.dependencies.push(dep);
                }
            }
            for (key, value) in graph.metadata {
                merged.metadata.entry(key).or_insert(value);
            }
        }
        merged
    }
}
