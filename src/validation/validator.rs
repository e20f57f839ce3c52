//! The central validator that orchestrates the execution of all validation rules.
use super::error::{ValidationError, ValidationErrorType};
use super::rules::{producers, roots};
use crate::graph::{DependencyGraph, NodeId};
use std::collections::HashMap;

/// Checks the structural invariants of a `DependencyGraph`.
///
/// Runs the node-local rules over every node, then the graph-wide checks on
/// terminal outputs and ordering. Used after compilation when
/// `CompilerConfig::validate_graphs` is set, and by the test-suite.
pub struct Validator<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> Validator<'a> {
    /// Creates a new validator for the given dependency graph.
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// Executes all registered validation rules against the graph.
    ///
    /// # Returns
    /// - `Ok(())` if no validation errors are found.
    /// - `Err(Vec<ValidationError>)` containing all errors discovered in the graph.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (node_id, node) in self.graph.nodes() {
            if let Some(err) = producers::validate_producers(self.graph, node_id, node) {
                errors.push(err);
            }
            if let Some(err) = roots::validate_root(self.graph, node_id, node) {
                errors.push(err);
            }
        }

        for spec in self.graph.terminal_outputs().keys() {
            let flagged = self
                .graph
                .node_producing(spec)
                .and_then(|id| self.graph.node(id))
                .is_some_and(|node| node.is_terminal(spec));
            if !flagged {
                errors.push(ValidationError::graph_wide(
                    ValidationErrorType::Terminal,
                    format!("Terminal output {} has no flagged producer", spec),
                ));
            }
        }

        self.validate_order(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_order(&self, errors: &mut Vec<ValidationError>) {
        let order = match self.graph.execution_order() {
            Ok(order) => order,
            Err(e) => {
                errors.push(ValidationError::graph_wide(ValidationErrorType::Ordering, e.to_string()));
                return;
            }
        };
        if order.len() != self.graph.size() {
            errors.push(ValidationError::graph_wide(
                ValidationErrorType::Ordering,
                format!("Execution order covers {} of {} nodes", order.len(), self.graph.size()),
            ));
        }
        let position: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        for (&id, &pos) in &position {
            for producer in self.graph.input_nodes(id) {
                if position.get(&producer).map_or(true, |&p| p > pos) {
                    errors.push(ValidationError::at_node(
                        id,
                        ValidationErrorType::Ordering,
                        format!("Node {:?} is ordered before its input {:?}", id, producer),
                    ));
                }
            }
        }
    }
}
