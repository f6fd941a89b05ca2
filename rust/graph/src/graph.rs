use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use crate::error::{GraphResult, GraphValidationError, ValidationRule};
use crate::fragment::ExecutionFragment;
use crate::node::{ExecutionNode, NodeId};

/// The final, validated DAG for one run.
///
/// Sealed from a fragment: entry and exit lists are recomputed, then
/// the six validation rules are checked. The engine refuses anything
/// else, so holding an `ExecutionGraph` is proof of validity.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    name: String,
    nodes: IndexMap<NodeId, ExecutionNode>,
    entry_nodes: Vec<NodeId>,
    exit_nodes: Vec<NodeId>,
}

impl ExecutionGraph {
    /// Seal a fragment into a validated graph.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphValidationError`] the graph fails.
    pub fn seal(name: impl Into<String>, mut fragment: ExecutionFragment) -> GraphResult<Self> {
        fragment.calculate_entry_and_exit_nodes();
        let (nodes, entry_nodes, exit_nodes) = fragment.parts();
        let graph = Self {
            name: name.into(),
            nodes,
            entry_nodes,
            exit_nodes,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// Graph name, usually the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All nodes in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &IndexMap<NodeId, ExecutionNode> {
        &self.nodes
    }

    /// The node under the id, if present.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&ExecutionNode> {
        self.nodes.get(id)
    }

    /// Declared entry nodes (in-degree zero).
    #[must_use]
    pub fn entry_nodes(&self) -> &[NodeId] {
        &self.entry_nodes
    }

    /// Declared exit nodes (out-degree zero).
    #[must_use]
    pub fn exit_nodes(&self) -> &[NodeId] {
        &self.exit_nodes
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forward adjacency: for each node, the nodes depending on it.
    #[must_use]
    pub fn children(&self) -> IndexMap<NodeId, Vec<NodeId>> {
        let mut children: IndexMap<NodeId, Vec<NodeId>> = self
            .nodes
            .keys()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        for (id, node) in &self.nodes {
            for dep in node.deps() {
                if let Some(slot) = children.get_mut(dep) {
                    slot.push(id.clone());
                }
            }
        }
        children
    }

    /// In-degree per node.
    #[must_use]
    pub fn in_degrees(&self) -> IndexMap<NodeId, usize> {
        self.nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.deps().len()))
            .collect()
    }

    /// A total topological order of the graph.
    ///
    /// Deterministic: ready nodes are processed in insertion order.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphValidationError`] naming the cycle participants
    /// when no total order exists.
    pub fn topo_sort(&self) -> Result<Vec<NodeId>, GraphValidationError> {
        let children = self.children();
        let mut remaining = self.in_degrees();
        let mut queue: VecDeque<NodeId> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            for child in children.get(&id).into_iter().flatten() {
                let degree = remaining.get_mut(child).map(|d| {
                    *d -= 1;
                    *d
                });
                if degree == Some(0) {
                    queue.push_back(child.clone());
                }
            }
            order.push(id);
        }

        if order.len() < self.nodes.len() {
            let stuck: Vec<NodeId> = self
                .nodes
                .keys()
                .filter(|id| !order.contains(id))
                .cloned()
                .collect();
            return Err(GraphValidationError::new(ValidationRule::Cycle, stuck));
        }
        Ok(order)
    }

    /// Check the six structural rules, in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphValidationError`] found.
    pub fn validate(&self) -> Result<(), GraphValidationError> {
        // 1. Every node must be runnable: a step over at least one host.
        for (id, node) in &self.nodes {
            if node.hosts().is_empty() {
                return Err(GraphValidationError::new(
                    ValidationRule::NodeWithoutHosts,
                    [id.clone()],
                ));
            }
        }

        // 2. Every dependency refers to an existing node.
        for (id, node) in &self.nodes {
            for dep in node.deps() {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphValidationError::new(
                        ValidationRule::UnknownDependency,
                        [id.clone(), dep.clone()],
                    ));
                }
            }
        }

        // 3. No cycles. Self-loops surface here as one-node cycles.
        self.topo_sort()?;

        // 4. Declared entries have no in-graph dependencies.
        for entry in &self.entry_nodes {
            let Some(node) = self.nodes.get(entry) else {
                return Err(GraphValidationError::new(
                    ValidationRule::UnknownEntry,
                    [entry.clone()],
                ));
            };
            if node.deps().iter().any(|dep| self.nodes.contains_key(dep)) {
                return Err(GraphValidationError::new(
                    ValidationRule::EntryHasDependencies,
                    [entry.clone()],
                ));
            }
        }

        // 5. Declared exits exist.
        for exit in &self.exit_nodes {
            if !self.nodes.contains_key(exit) {
                return Err(GraphValidationError::new(
                    ValidationRule::UnknownExit,
                    [exit.clone()],
                ));
            }
        }

        // 6. Entry and exit lists are unique.
        let mut seen = IndexSet::new();
        for entry in &self.entry_nodes {
            if !seen.insert(entry) {
                return Err(GraphValidationError::new(
                    ValidationRule::DuplicateEntry,
                    [entry.clone()],
                ));
            }
        }
        seen.clear();
        for exit in &self.exit_nodes {
            if !seen.insert(exit) {
                return Err(GraphValidationError::new(
                    ValidationRule::DuplicateExit,
                    [exit.clone()],
                ));
            }
        }

        Ok(())
    }
}
