use std::fmt;

use crate::node::NodeId;

/// The structural rule a graph failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    /// A node targets no hosts.
    NodeWithoutHosts,
    /// A dependency references a node that does not exist.
    UnknownDependency,
    /// The graph contains a cycle.
    Cycle,
    /// A declared entry node has in-graph dependencies.
    EntryHasDependencies,
    /// A declared entry node does not exist.
    UnknownEntry,
    /// A declared exit node does not exist.
    UnknownExit,
    /// The entry list contains a node twice.
    DuplicateEntry,
    /// The exit list contains a node twice.
    DuplicateExit,
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NodeWithoutHosts => "node targets no hosts",
            Self::UnknownDependency => "dependency on unknown node",
            Self::Cycle => "dependency cycle",
            Self::EntryHasDependencies => "entry node has dependencies",
            Self::UnknownEntry => "entry node does not exist",
            Self::UnknownExit => "exit node does not exist",
            Self::DuplicateEntry => "duplicate entry node",
            Self::DuplicateExit => "duplicate exit node",
        })
    }
}

/// The single failure kind of graph validation: which rule was violated
/// and by which node(s).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("graph validation failed: {rule} ({})", nodes.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", "))]
pub struct GraphValidationError {
    /// The rule that was violated.
    pub rule: ValidationRule,
    /// The offending node id(s).
    pub nodes: Vec<NodeId>,
}

impl GraphValidationError {
    pub(crate) fn new(rule: ValidationRule, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            rule,
            nodes: nodes.into_iter().collect(),
        }
    }
}

/// Errors raised while building or validating the execution DAG.
///
/// Mutator errors are programming bugs in plan authors, not runtime
/// conditions; nothing is partially applied when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// An id was added twice to one fragment.
    #[error("duplicate node id: {id}")]
    DuplicateNode { id: NodeId },

    /// A dependency endpoint is not in the fragment.
    #[error("unknown node id: {id}")]
    UnknownNode { id: NodeId },

    /// A node cannot depend on itself.
    #[error("self-loop on node: {id}")]
    SelfLoop { id: NodeId },

    /// Two merged fragments carry the same id.
    #[error("node id collision while merging: {id}")]
    Collision { id: NodeId },

    /// The sealed graph failed validation.
    #[error(transparent)]
    Validation(#[from] GraphValidationError),
}

/// A `Result` type alias using [`GraphError`].
pub type GraphResult<T> = Result<T, GraphError>;
