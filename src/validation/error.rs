//! Defines the error types for the validation module.
use crate::graph::NodeId;

/// The specific category of a validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorType {
    /// An output is missing from the producer index, or mapped to another node.
    ProducerIndex,
    /// A node has no outputs left.
    EmptyNode,
    /// The cached root set disagrees with the consumers present in the graph.
    RootSet,
    /// A terminal output has no producer, or the producer does not flag it.
    Terminal,
    /// The execution order is not a valid topological order.
    Ordering,
}

/// A structured report of one broken graph invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The node where the problem was detected, if it is node-local.
    pub node_id: Option<NodeId>,
    /// The category of the error.
    pub error_type: ValidationErrorType,
    /// A human-readable message explaining the error.
    pub message: String,
}

impl ValidationError {
    pub(crate) fn at_node(node_id: NodeId, error_type: ValidationErrorType, message: String) -> Self {
        Self { node_id: Some(node_id), error_type, message }
    }

    pub(crate) fn graph_wide(error_type: ValidationErrorType, message: String) -> Self {
        Self { node_id: None, error_type, message }
    }
}
