//! Validation rule for the output index.

use crate::graph::{DependencyGraph, DependencyNode, NodeId};
use crate::validation::error::{ValidationError, ValidationErrorType};

/// Every output of a node must map back to that node, and a node must keep
/// at least one output.
pub(crate) fn validate_producers(
    graph: &DependencyGraph,
    node_id: NodeId,
    node: &DependencyNode,
) -> Option<ValidationError> {
    if node.output_count() == 0 {
        return Some(ValidationError::at_node(
            node_id,
            ValidationErrorType::EmptyNode,
            format!("Node {:?} ({}) has no outputs", node_id, node.function()),
        ));
    }
    for output in node.outputs() {
        match graph.node_producing(output) {
            Some(producer) if producer == node_id => {}
            Some(other) => {
                return Some(ValidationError::at_node(
                    node_id,
                    ValidationErrorType::ProducerIndex,
                    format!("{} is produced by {:?} but indexed to {:?}", output, node_id, other),
                ));
            }
            None => {
                return Some(ValidationError::at_node(
                    node_id,
                    ValidationErrorType::ProducerIndex,
                    format!("{} produced by {:?} is missing from the index", output, node_id),
                ));
            }
        }
    }
    None
}
