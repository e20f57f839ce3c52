use crate::execution::ledger::{ExecutionLedger, NodeExecutionState};
use crate::graph::{DependencyGraph, NodeId};
use crate::resolver::ResolutionFailure;
use crate::value::ValueSpecification;
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the production tree of `spec`: its producer, then the producers
/// of that node's inputs, recursively. A node already printed is shown as a
/// back-reference to the level where it first appeared. With a ledger, each
/// node is annotated with its execution state.
pub fn format_trace(graph: &DependencyGraph, spec: &ValueSpecification, ledger: Option<&ExecutionLedger>) -> String {
    let mut tracer = Tracer { graph, ledger, visited_at_level: HashMap::new(), output: String::new() };

    let _ = writeln!(tracer.output, "PRODUCTION TRACE for {}:", spec);
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    match graph.node_producing(spec) {
        Some(node) => tracer.trace_node(node, spec, 1, ""),
        None => {
            let _ = writeln!(tracer.output, "No node produces {}", spec);
        }
    }
    tracer.output
}

/// Renders a resolution failure and its causes as an indented chain.
pub fn format_failure(failure: &ResolutionFailure) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "RESOLUTION FAILURE for {} ({}):", failure.requirement, failure.richest_kind());
    let _ = writeln!(output, "--------------------------------------------------");
    output.push_str(&failure.describe());
    output
}

struct Tracer<'a> {
    graph: &'a DependencyGraph,
    ledger: Option<&'a ExecutionLedger>,
    visited_at_level: HashMap<NodeId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, node_id: NodeId, spec: &ValueSpecification, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&node_id) {
            let _ = writeln!(self.output, "{}{} -> (Ref to L{})", prefix, spec, first_seen);
            return;
        }
        self.visited_at_level.insert(node_id, level);

        let graph = self.graph;
        let Some(node) = graph.node(node_id) else { return };
        let terminal = if node.is_terminal(spec) { " [TERMINAL]" } else { "" };
        let state = self.format_state(node_id);
        let _ = writeln!(self.output, "{}[L{}] {} <- {}{}{}", prefix, level, spec, node.function(), terminal, state);

        let inputs: Vec<ValueSpecification> = node.inputs().cloned().collect();
        let stem = build_child_stem(prefix);
        for (i, input) in inputs.iter().enumerate() {
            let connector = if i == inputs.len() - 1 { "`--" } else { "|--" };
            let child_prefix = format!("{}{}", stem, connector);
            match graph.node_producing(input) {
                Some(producer) => self.trace_node(producer, input, level + 1, &child_prefix),
                None => {
                    let _ = writeln!(self.output, "{}{} (produced outside this graph)", child_prefix, input);
                }
            }
        }
    }

    fn format_state(&self, node_id: NodeId) -> String {
        let Some(ledger) = self.ledger else { return String::new() };
        match ledger.get(self.graph.calculation_configuration(), node_id) {
            Some(NodeExecutionState::Executed) => " [OK]".to_string(),
            Some(NodeExecutionState::Failed(reason)) => format!(" [Err: {}]", reason),
            None => " [?]".to_string(),
        }
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}
