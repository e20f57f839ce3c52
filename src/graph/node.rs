//! Defines the `DependencyNode`, a single bound function invocation.

use crate::value::{FunctionKind, TargetSpecification, ValueSpecification};
use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A stable identifier for a node within one `DependencyGraph`.
///
/// Backed by a `StableGraph` index, so ids survive removal of other nodes.
pub type NodeId = NodeIndex;

/// A computation unit bound to one target.
///
/// The node records what it consumes and produces by `ValueSpecification`.
/// Edges between nodes are derived by the owning graph from those sets, so a
/// node carries no references to other nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    function: FunctionKind,
    target: TargetSpecification,
    inputs: BTreeSet<ValueSpecification>,
    outputs: BTreeSet<ValueSpecification>,
    /// Subset of `outputs` directly backing a requirement.
    terminal: BTreeSet<ValueSpecification>,
}

impl DependencyNode {
    pub fn new(function: FunctionKind, target: TargetSpecification) -> Self {
        Self {
            function,
            target,
            inputs: BTreeSet::new(),
            outputs: BTreeSet::new(),
            terminal: BTreeSet::new(),
        }
    }

    pub fn with_input(mut self, spec: ValueSpecification) -> Self {
        self.inputs.insert(spec);
        self
    }

    pub fn with_output(mut self, spec: ValueSpecification) -> Self {
        self.outputs.insert(spec);
        self
    }

    pub fn add_input(&mut self, spec: ValueSpecification) { self.inputs.insert(spec); }
    pub fn add_output(&mut self, spec: ValueSpecification) { self.outputs.insert(spec); }

    pub fn function(&self) -> &FunctionKind { &self.function }
    pub fn target(&self) -> &TargetSpecification { &self.target }
    pub fn inputs(&self) -> impl Iterator<Item = &ValueSpecification> { self.inputs.iter() }
    pub fn outputs(&self) -> impl Iterator<Item = &ValueSpecification> { self.outputs.iter() }
    pub fn input_count(&self) -> usize { self.inputs.len() }
    pub fn output_count(&self) -> usize { self.outputs.len() }
    pub fn has_input(&self, spec: &ValueSpecification) -> bool { self.inputs.contains(spec) }
    pub fn produces(&self, spec: &ValueSpecification) -> bool { self.outputs.contains(spec) }

    pub fn is_terminal(&self, spec: &ValueSpecification) -> bool { self.terminal.contains(spec) }
    pub fn terminal_outputs(&self) -> impl Iterator<Item = &ValueSpecification> { self.terminal.iter() }

    pub(crate) fn set_terminal(&mut self, spec: &ValueSpecification) {
        if self.outputs.contains(spec) {
            self.terminal.insert(spec.clone());
        }
    }

    pub(crate) fn clear_terminal(&mut self, spec: &ValueSpecification) {
        self.terminal.remove(spec);
    }

    pub(crate) fn remove_output(&mut self, spec: &ValueSpecification) -> bool {
        self.terminal.remove(spec);
        self.outputs.remove(spec)
    }

    pub(crate) fn replace_input(&mut self, old: &ValueSpecification, new: ValueSpecification) {
        if self.inputs.remove(old) {
            self.inputs.insert(new);
        }
    }
}
