//! Validation rule for the root set.

use crate::graph::{DependencyGraph, DependencyNode, NodeId};
use crate::validation::error::{ValidationError, ValidationErrorType};

/// A node is a root iff no node present in the graph consumes any of its outputs.
///
/// The expectation is re-derived from the nodes' input sets rather than the
/// stored edges, so a stale edge shows up as a disagreement.
pub(crate) fn validate_root(
    graph: &DependencyGraph,
    node_id: NodeId,
    node: &DependencyNode,
) -> Option<ValidationError> {
    let consumed = graph
        .nodes()
        .any(|(other, candidate)| other != node_id && node.outputs().any(|o| candidate.has_input(o)));

    if consumed == graph.is_root(node_id) {
        let message = if consumed {
            format!("Node {:?} is marked root but has consumers", node_id)
        } else {
            format!("Node {:?} has no consumers but is not marked root", node_id)
        };
        return Some(ValidationError::at_node(node_id, ValidationErrorType::RootSet, message));
    }
    None
}
