use indexmap::IndexMap;

use crate::error::{GraphError, GraphResult};
use crate::node::{ExecutionNode, NodeId};

/// A mergeable sub-DAG with declared entry and exit nodes.
///
/// Tasks and modules accumulate nodes and wire dependencies here
/// without knowing the final graph's shape. A fragment is owned
/// exclusively by its producer until merged; merging transfers the
/// nodes to the parent.
///
/// All mutators fail fast and leave the fragment untouched on error.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFragment {
    name: String,
    nodes: IndexMap<NodeId, ExecutionNode>,
    entry_nodes: Vec<NodeId>,
    exit_nodes: Vec<NodeId>,
}

impl ExecutionFragment {
    /// An empty fragment with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Fragment name (diagnostic only; never part of node identity).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a node under an id derived from its name.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateNode`] when the id is taken.
    pub fn add_node(&mut self, node: ExecutionNode) -> GraphResult<NodeId> {
        let id = NodeId::new(node.name());
        self.add_node_with_id(node, id.clone())?;
        Ok(id)
    }

    /// Add a node under an explicit id.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateNode`] when the id is taken.
    pub fn add_node_with_id(&mut self, node: ExecutionNode, id: NodeId) -> GraphResult<()> {
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode { id });
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Declare that `to` depends on `from` (edge `from → to`).
    ///
    /// Duplicate edges are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::SelfLoop`] when both ends are the same
    /// node and [`GraphError::UnknownNode`] when either end is absent.
    pub fn add_dependency(&mut self, from: &NodeId, to: &NodeId) -> GraphResult<()> {
        if from == to {
            return Err(GraphError::SelfLoop { id: from.clone() });
        }
        if !self.nodes.contains_key(from) {
            return Err(GraphError::UnknownNode { id: from.clone() });
        }
        let Some(node) = self.nodes.get_mut(to) else {
            return Err(GraphError::UnknownNode { id: to.clone() });
        };
        node.add_dep(from.clone());
        Ok(())
    }

    /// Take all nodes of `other` into this fragment.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Collision`] on the first shared id;
    /// nothing is merged in that case.
    pub fn merge_fragment(&mut self, other: ExecutionFragment) -> GraphResult<()> {
        if let Some(id) = other.nodes.keys().find(|id| self.nodes.contains_key(*id)) {
            return Err(GraphError::Collision { id: id.clone() });
        }
        for (id, node) in other.nodes {
            self.nodes.insert(id, node);
        }
        Ok(())
    }

    /// Add the cross-product of edges from `exits` to `entries`.
    ///
    /// A no-op when either list is empty.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] when an endpoint is absent.
    pub fn link(&mut self, exits: &[NodeId], entries: &[NodeId]) -> GraphResult<()> {
        if exits.is_empty() || entries.is_empty() {
            return Ok(());
        }
        for exit in exits {
            for entry in entries {
                self.add_dependency(exit, entry)?;
            }
        }
        Ok(())
    }

    /// Stamp every node in the fragment with the given scope.
    pub fn apply_scope(&mut self, scope: &kubexm_context::NodeScope) {
        for node in self.nodes.values_mut() {
            node.set_scope(scope.clone());
        }
    }

    /// Recompute the declared entry and exit lists from in- and
    /// out-degree within the fragment.
    ///
    /// Only edges with both endpoints present count; dangling external
    /// references are ignored. Results are deduplicated and sorted.
    pub fn calculate_entry_and_exit_nodes(&mut self) {
        let mut has_internal_dep: IndexMap<&NodeId, bool> = IndexMap::new();
        let mut has_internal_child: IndexMap<&NodeId, bool> = IndexMap::new();
        for id in self.nodes.keys() {
            has_internal_dep.insert(id, false);
            has_internal_child.insert(id, false);
        }

        for (id, node) in &self.nodes {
            for dep in node.deps() {
                if self.nodes.contains_key(dep) {
                    has_internal_dep.insert(id, true);
                    has_internal_child.insert(dep, true);
                }
            }
        }

        let mut entries: Vec<NodeId> = has_internal_dep
            .iter()
            .filter(|(_, has_dep)| !**has_dep)
            .map(|(id, _)| (*id).clone())
            .collect();
        let mut exits: Vec<NodeId> = has_internal_child
            .iter()
            .filter(|(_, has_child)| !**has_child)
            .map(|(id, _)| (*id).clone())
            .collect();

        entries.sort();
        entries.dedup();
        exits.sort();
        exits.dedup();

        self.entry_nodes = entries;
        self.exit_nodes = exits;
    }

    /// Declared entry nodes.
    #[must_use]
    pub fn entry_nodes(&self) -> &[NodeId] {
        &self.entry_nodes
    }

    /// Declared exit nodes.
    #[must_use]
    pub fn exit_nodes(&self) -> &[NodeId] {
        &self.exit_nodes
    }

    /// Whether the fragment has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the fragment contains the id.
    #[must_use]
    pub fn has_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// The node under the id, if present.
    #[must_use]
    pub fn get_node(&self, id: &NodeId) -> Option<&ExecutionNode> {
        self.nodes.get(id)
    }

    /// All node ids in insertion order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut ExecutionNode> {
        self.nodes.get_mut(id)
    }

    pub(crate) fn parts(self) -> (IndexMap<NodeId, ExecutionNode>, Vec<NodeId>, Vec<NodeId>) {
        (self.nodes, self.entry_nodes, self.exit_nodes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use kubexm_context::StepContext;
    use kubexm_host::Host;
    use kubexm_step::{Step, StepMeta, StepOutput, StepResult};

    use super::*;

    #[derive(Debug)]
    struct NoopStep;

    #[async_trait]
    impl Step for NoopStep {
        fn meta(&self) -> StepMeta {
            StepMeta::new("noop", "does nothing")
        }

        async fn run(&self, _ctx: &StepContext, _host: &Host) -> StepResult<StepOutput> {
            Ok(StepOutput::default())
        }
    }

    fn node(name: &str) -> ExecutionNode {
        ExecutionNode::new(name, Arc::new(NoopStep), vec![Arc::new(Host::control_node())])
    }

    fn ids(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|id| NodeId::from(*id)).collect()
    }

    #[test]
    fn add_node_rejects_duplicates() {
        let mut fragment = ExecutionFragment::new("f");
        fragment.add_node(node("a")).expect("first add");
        assert_eq!(
            fragment.add_node(node("a")),
            Err(GraphError::DuplicateNode {
                id: NodeId::from("a")
            })
        );
    }

    #[test]
    fn add_dependency_rejects_self_loops_and_unknown_endpoints() {
        let mut fragment = ExecutionFragment::new("f");
        let a = fragment.add_node(node("a")).expect("add");

        assert_eq!(
            fragment.add_dependency(&a, &a),
            Err(GraphError::SelfLoop { id: a.clone() })
        );
        assert_eq!(
            fragment.add_dependency(&a, &NodeId::from("missing")),
            Err(GraphError::UnknownNode {
                id: NodeId::from("missing")
            })
        );
    }

    #[test]
    fn duplicate_edges_are_a_noop() {
        let mut fragment = ExecutionFragment::new("f");
        let a = fragment.add_node(node("a")).expect("add");
        let b = fragment.add_node(node("b")).expect("add");
        fragment.add_dependency(&a, &b).expect("edge");
        fragment.add_dependency(&a, &b).expect("edge again");
        assert_eq!(fragment.get_node(&b).expect("b").deps(), &[a]);
    }

    #[test]
    fn merge_rejects_collisions_without_partial_application() {
        let mut left = ExecutionFragment::new("left");
        left.add_node(node("a")).expect("add");

        let mut right = ExecutionFragment::new("right");
        right.add_node(node("fresh")).expect("add");
        right.add_node(node("a")).expect("add");

        assert_eq!(
            left.merge_fragment(right),
            Err(GraphError::Collision {
                id: NodeId::from("a")
            })
        );
        assert!(!left.has_node(&NodeId::from("fresh")));
    }

    #[test]
    fn merge_is_associative_on_disjoint_sets() {
        let build = |names: &[&str]| {
            let mut fragment = ExecutionFragment::new("f");
            for name in names {
                fragment.add_node(node(name)).expect("add");
            }
            fragment
        };

        let mut left_first = build(&["a"]);
        left_first.merge_fragment(build(&["b"])).expect("merge");
        left_first.merge_fragment(build(&["c"])).expect("merge");

        let mut right_first = build(&["a"]);
        let mut bc = build(&["b"]);
        bc.merge_fragment(build(&["c"])).expect("merge");
        right_first.merge_fragment(bc).expect("merge");

        assert_eq!(left_first.node_ids(), right_first.node_ids());
    }

    #[test]
    fn link_is_a_noop_on_empty_lists() {
        let mut fragment = ExecutionFragment::new("f");
        let a = fragment.add_node(node("a")).expect("add");
        fragment.link(&[], &[a.clone()]).expect("empty exits");
        fragment.link(&[a.clone()], &[]).expect("empty entries");
        assert!(fragment.get_node(&a).expect("a").deps().is_empty());
    }

    #[test]
    fn entry_and_exit_computation_ignores_external_references() {
        let mut fragment = ExecutionFragment::new("f");
        let a = fragment.add_node(node("a")).expect("add");
        let b = fragment.add_node(node("b")).expect("add");
        let c = fragment.add_node(node("c")).expect("add");
        fragment.add_dependency(&a, &b).expect("edge");
        fragment.add_dependency(&b, &c).expect("edge");

        // A dangling reference to a node outside the fragment must not
        // change in-degree accounting.
        fragment
            .nodes
            .get_mut(&a)
            .expect("a")
            .add_dep(NodeId::from("external"));

        fragment.calculate_entry_and_exit_nodes();
        assert_eq!(fragment.entry_nodes(), ids(&["a"]).as_slice());
        assert_eq!(fragment.exit_nodes(), ids(&["c"]).as_slice());
    }

    #[test]
    fn diamond_has_single_entry_and_exit() {
        let mut fragment = ExecutionFragment::new("f");
        let a = fragment.add_node(node("a")).expect("add");
        let b = fragment.add_node(node("b")).expect("add");
        let c = fragment.add_node(node("c")).expect("add");
        let d = fragment.add_node(node("d")).expect("add");
        fragment.add_dependency(&a, &b).expect("edge");
        fragment.add_dependency(&a, &c).expect("edge");
        fragment.add_dependency(&b, &d).expect("edge");
        fragment.add_dependency(&c, &d).expect("edge");
        fragment.calculate_entry_and_exit_nodes();

        assert_eq!(fragment.entry_nodes(), ids(&["a"]).as_slice());
        assert_eq!(fragment.exit_nodes(), ids(&["d"]).as_slice());
    }

    #[test]
    fn empty_fragment_is_safely_mergeable() {
        let mut fragment = ExecutionFragment::new("f");
        assert!(fragment.is_empty());
        fragment
            .merge_fragment(ExecutionFragment::new("empty"))
            .expect("merge empty");
        fragment.calculate_entry_and_exit_nodes();
        assert!(fragment.entry_nodes().is_empty());
        assert!(fragment.exit_nodes().is_empty());
    }
}
