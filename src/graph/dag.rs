//! dag.rs
//! The mutable dependency graph: nodes, producer index, terminal outputs, roots.

use super::error::GraphError;
use super::node::{DependencyNode, NodeId};
use crate::analysis::topology;
use crate::value::{TargetSpecification, ValueProperties, ValueRequirement, ValueSpecification};
use petgraph::stable_graph::StableDiGraph;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

type ValueKey = (String, TargetSpecification);

/// A DAG of `DependencyNode`s for one calculation configuration.
///
/// Edges run from producer to consumer and carry the specification that
/// flows along them. They are derived from the nodes' input and output sets
/// whenever both ends are present, so a graph may legitimately hold nodes
/// whose producers live elsewhere (see `sub_graph`).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    calculation_configuration: String,
    pub(crate) graph: StableDiGraph<DependencyNode, ValueSpecification>,
    producers: HashMap<ValueSpecification, NodeId>,
    /// Input spec -> every present node consuming it, whether or not the producer is present.
    consumers: HashMap<ValueSpecification, BTreeSet<NodeId>>,
    /// (value name, target) -> produced specs. Lets resolution reuse values by constraint.
    by_value: HashMap<ValueKey, BTreeSet<ValueSpecification>>,
    terminal_outputs: HashMap<ValueSpecification, BTreeSet<ValueRequirement>>,
    roots: BTreeSet<NodeId>,
    market_data: HashSet<ValueSpecification>,
    targets: HashMap<TargetSpecification, usize>,
    /// Outputs read by nodes that are not part of this graph.
    externally_consumed: HashSet<ValueSpecification>,
}

impl DependencyGraph {
    pub fn new(calculation_configuration: impl Into<String>) -> Self {
        Self { calculation_configuration: calculation_configuration.into(), ..Self::default() }
    }

    pub fn calculation_configuration(&self) -> &str { &self.calculation_configuration }

    // --- Mutation ---

    /// Adds a node, failing if any of its outputs already has a producer.
    pub fn add_node(&mut self, node: DependencyNode) -> Result<NodeId, GraphError> {
        for output in node.outputs() {
            if let Some(&existing) = self.producers.get(output) {
                return Err(GraphError::DuplicateProducer { spec: output.clone(), existing });
            }
        }
        Ok(self.link_node(node))
    }

    /// Inserts a node whose outputs are known to be unclaimed.
    fn link_node(&mut self, node: DependencyNode) -> NodeId {
        let is_market_data = node.function().is_market_data();
        let outputs: Vec<ValueSpecification> = node.outputs().cloned().collect();
        let inputs: Vec<ValueSpecification> = node.inputs().cloned().collect();
        *self.targets.entry(node.target().clone()).or_insert(0) += 1;

        let id = self.graph.add_node(node);

        for output in outputs {
            if let Some(consumers) = self.consumers.get(&output) {
                for &consumer in consumers {
                    self.graph.add_edge(id, consumer, output.clone());
                }
            }
            if is_market_data {
                self.market_data.insert(output.clone());
            }
            self.by_value
                .entry((output.value_name.clone(), output.target.clone()))
                .or_default()
                .insert(output.clone());
            self.producers.insert(output, id);
        }

        for input in inputs {
            self.consumers.entry(input.clone()).or_default().insert(id);
            if let Some(&producer) = self.producers.get(&input) {
                self.graph.add_edge(producer, id, input);
                self.roots.remove(&producer);
            }
        }

        self.refresh_root(id);
        id
    }

    /// Removes a node and every index entry for its outputs.
    ///
    /// Producers of its inputs are re-examined, since losing this consumer
    /// may leave them with none.
    pub fn remove_node(&mut self, id: NodeId) -> Result<DependencyNode, GraphError> {
        self.detach_node(id).ok_or(GraphError::UnknownNode(id))
    }

    fn detach_node(&mut self, id: NodeId) -> Option<DependencyNode> {
        let upstream: Vec<NodeId> = self.graph.neighbors_directed(id, Direction::Incoming).collect();
        let node = self.graph.remove_node(id)?;

        for output in node.outputs() {
            self.unindex_output(output);
            self.terminal_outputs.remove(output);
        }
        for input in node.inputs() {
            if let Some(consumers) = self.consumers.get_mut(input) {
                consumers.remove(&id);
                if consumers.is_empty() {
                    self.consumers.remove(input);
                }
            }
        }
        if let Some(count) = self.targets.get_mut(node.target()) {
            *count -= 1;
            if *count == 0 {
                self.targets.remove(node.target());
            }
        }
        self.roots.remove(&id);
        for producer in upstream {
            self.refresh_root(producer);
        }
        Some(node)
    }

    fn unindex_output(&mut self, output: &ValueSpecification) {
        self.producers.remove(output);
        self.market_data.remove(output);
        self.externally_consumed.remove(output);
        let key = (output.value_name.clone(), output.target.clone());
        if let Some(specs) = self.by_value.get_mut(&key) {
            specs.remove(output);
            if specs.is_empty() {
                self.by_value.remove(&key);
            }
        }
    }

    /// Swaps the node at `id` for `replacement`.
    ///
    /// Old outputs are matched to new ones by value name and properties. For
    /// every match, consumers are re-pointed at the new specification and
    /// terminal requirements carry over. Used when a target is re-resolved to
    /// a new specification.
    pub fn replace_node(&mut self, id: NodeId, replacement: DependencyNode) -> Result<NodeId, GraphError> {
        let old = self.graph.node_weight(id).ok_or(GraphError::ReplaceUnknownNode(id))?;
        for output in replacement.outputs() {
            match self.producers.get(output) {
                Some(&existing) if existing != id => {
                    return Err(GraphError::DuplicateProducer { spec: output.clone(), existing });
                }
                _ => {}
            }
        }

        let mapping: Vec<(ValueSpecification, ValueSpecification, Option<BTreeSet<ValueRequirement>>)> = old
            .outputs()
            .filter_map(|o| {
                replacement
                    .outputs()
                    .find(|n| n.value_name == o.value_name && n.properties == o.properties)
                    .map(|n| (o.clone(), n.clone(), self.terminal_outputs.get(o).cloned()))
            })
            .collect();

        self.detach_node(id).ok_or(GraphError::ReplaceUnknownNode(id))?;
        let new_id = self.link_node(replacement);

        for (old_spec, new_spec, terminal) in mapping {
            if old_spec != new_spec {
                if let Some(consumers) = self.consumers.remove(&old_spec) {
                    for &consumer in &consumers {
                        self.graph[consumer].replace_input(&old_spec, new_spec.clone());
                        self.graph.add_edge(new_id, consumer, new_spec.clone());
                    }
                    self.consumers.entry(new_spec.clone()).or_default().extend(consumers);
                }
            }
            if let Some(requirements) = terminal {
                self.graph[new_id].set_terminal(&new_spec);
                self.terminal_outputs.entry(new_spec).or_default().extend(requirements);
            }
        }

        self.refresh_root(new_id);
        Ok(new_id)
    }

    /// Records that `spec` backs `requirement`.
    pub fn mark_terminal(&mut self, requirement: ValueRequirement, spec: &ValueSpecification) -> Result<(), GraphError> {
        let &id = self.producers.get(spec).ok_or_else(|| GraphError::NoProducer(spec.clone()))?;
        self.terminal_outputs.entry(spec.clone()).or_default().insert(requirement);
        self.graph[id].set_terminal(spec);
        Ok(())
    }

    /// Drops the given requirements from the backing set of `spec`.
    /// Terminal status is cleared only once nothing backs it any more.
    pub fn unmark_terminal<'a, I>(&mut self, requirements: I, spec: &ValueSpecification)
    where
        I: IntoIterator<Item = &'a ValueRequirement>,
    {
        let Some(backing) = self.terminal_outputs.get_mut(spec) else { return };
        for requirement in requirements {
            backing.remove(requirement);
        }
        if backing.is_empty() {
            self.terminal_outputs.remove(spec);
            if let Some(&id) = self.producers.get(spec) {
                self.graph[id].clear_terminal(spec);
            }
        }
    }

    pub(crate) fn mark_externally_consumed(&mut self, spec: ValueSpecification) {
        self.externally_consumed.insert(spec);
    }

    /// Prunes outputs that are neither terminal nor consumed, and nodes left
    /// with no outputs, until nothing changes. Returns the number of nodes removed.
    pub fn remove_unnecessary_outputs(&mut self) -> usize {
        let mut removed_nodes = 0;
        loop {
            let mut changed = false;
            let ids: Vec<NodeId> = self.graph.node_indices().collect();
            for id in ids {
                let node = &self.graph[id];
                let unnecessary: Vec<ValueSpecification> =
                    node.outputs().filter(|o| !self.is_output_needed(o)).cloned().collect();

                if unnecessary.len() == node.output_count() {
                    self.detach_node(id);
                    removed_nodes += 1;
                    changed = true;
                } else if !unnecessary.is_empty() {
                    for spec in &unnecessary {
                        self.graph[id].remove_output(spec);
                        self.unindex_output(spec);
                    }
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        removed_nodes
    }

    fn is_output_needed(&self, spec: &ValueSpecification) -> bool {
        self.terminal_outputs.contains_key(spec)
            || self.externally_consumed.contains(spec)
            || self.consumers.get(spec).is_some_and(|c| !c.is_empty())
    }

    fn refresh_root(&mut self, id: NodeId) {
        if !self.graph.contains_node(id) {
            return;
        }
        if self.graph.neighbors_directed(id, Direction::Outgoing).next().is_none() {
            self.roots.insert(id);
        } else {
            self.roots.remove(&id);
        }
    }

    // --- Views ---

    /// A valid dependency order for the whole graph.
    pub fn execution_order(&self) -> Result<Vec<NodeId>, GraphError> {
        topology::execution_order(self, None)
    }

    /// A new graph containing only the nodes accepted by `include`.
    pub fn sub_graph<F>(&self, include: F) -> DependencyGraph
    where
        F: Fn(NodeId, &DependencyNode) -> bool,
    {
        let selected: HashSet<NodeId> =
            self.graph.node_indices().filter(|&id| include(id, &self.graph[id])).collect();
        self.sub_graph_of(&selected)
    }

    /// A new graph containing the given nodes under the same `NodeId`s as
    /// here, so execution state recorded against a sub-graph lines up with
    /// this graph. Terminal metadata is kept for outputs still produced;
    /// outputs read by excluded nodes are remembered as externally consumed.
    pub fn sub_graph_of(&self, nodes: &HashSet<NodeId>) -> DependencyGraph {
        let read_outside: Vec<ValueSpecification> = self
            .graph
            .node_indices()
            .filter(|id| nodes.contains(id))
            .flat_map(|id| self.graph[id].outputs())
            .filter(|output| {
                self.consumers
                    .get(*output)
                    .is_some_and(|c| c.iter().any(|consumer| !nodes.contains(consumer)))
            })
            .cloned()
            .collect();

        let mut sub = self.clone();
        let excluded: Vec<NodeId> = self.graph.node_indices().filter(|id| !nodes.contains(id)).collect();
        for id in excluded {
            sub.detach_node(id);
        }
        sub.externally_consumed.extend(read_outside);
        sub
    }

    // --- Accessors ---

    pub fn size(&self) -> usize { self.graph.node_count() }
    pub fn is_empty(&self) -> bool { self.graph.node_count() == 0 }
    pub fn contains(&self, id: NodeId) -> bool { self.graph.contains_node(id) }
    pub fn node(&self, id: NodeId) -> Option<&DependencyNode> { self.graph.node_weight(id) }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &DependencyNode)> {
        self.graph.node_indices().map(move |id| (id, &self.graph[id]))
    }

    pub fn node_producing(&self, spec: &ValueSpecification) -> Option<NodeId> {
        self.producers.get(spec).copied()
    }

    pub fn output_specifications(&self) -> impl Iterator<Item = &ValueSpecification> {
        self.producers.keys()
    }

    /// The lowest-ordered produced spec for `value_name` on `target` meeting `constraints`.
    pub fn find_satisfying(
        &self,
        value_name: &str,
        target: &TargetSpecification,
        constraints: &ValueProperties,
    ) -> Option<&ValueSpecification> {
        self.by_value
            .get(&(value_name.to_string(), target.clone()))?
            .iter()
            .find(|spec| constraints.is_satisfied_by(&spec.properties))
    }

    pub fn root_nodes(&self) -> &BTreeSet<NodeId> { &self.roots }
    pub fn is_root(&self, id: NodeId) -> bool { self.roots.contains(&id) }

    /// Consumers of `id` present in this graph.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self.graph.neighbors_directed(id, Direction::Outgoing).collect();
        out.sort();
        out.dedup();
        out
    }

    /// Producers of `id`'s inputs present in this graph.
    pub fn input_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self.graph.neighbors_directed(id, Direction::Incoming).collect();
        out.sort();
        out.dedup();
        out
    }

    /// Present nodes reading `spec`.
    pub fn consumers_of(&self, spec: &ValueSpecification) -> impl Iterator<Item = NodeId> + '_ {
        self.consumers.get(spec).into_iter().flatten().copied()
    }

    pub fn terminal_outputs(&self) -> &HashMap<ValueSpecification, BTreeSet<ValueRequirement>> {
        &self.terminal_outputs
    }

    pub fn terminal_output_specifications(&self) -> BTreeSet<ValueSpecification> {
        self.terminal_outputs.keys().cloned().collect()
    }

    pub fn is_terminal_output(&self, spec: &ValueSpecification) -> bool {
        self.terminal_outputs.contains_key(spec)
    }

    pub fn is_externally_consumed(&self, spec: &ValueSpecification) -> bool {
        self.externally_consumed.contains(spec)
    }

    pub fn all_required_market_data(&self) -> &HashSet<ValueSpecification> { &self.market_data }

    pub fn all_computation_targets(&self) -> BTreeSet<TargetSpecification> {
        self.targets.keys().cloned().collect()
    }

    pub fn nodes_for_target(&self, target: &TargetSpecification) -> Vec<NodeId> {
        self.graph.node_indices().filter(|&id| self.graph[id].target() == target).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FunctionKind, TargetSpecification};

    fn spec(name: &str) -> ValueSpecification {
        ValueSpecification::new(name, TargetSpecification::security("Bond7"), ValueProperties::new())
    }

    fn node(function: &str, inputs: &[&str], outputs: &[&str]) -> DependencyNode {
        let mut n = DependencyNode::new(FunctionKind::computation(function), TargetSpecification::security("Bond7"));
        for i in inputs { n.add_input(spec(i)); }
        for o in outputs { n.add_output(spec(o)); }
        n
    }

    fn requirement(name: &str) -> ValueRequirement {
        ValueRequirement::new(name, TargetSpecification::security("Bond7"))
    }

    #[test]
    fn test_duplicate_producer_is_rejected() {
        let mut g = DependencyGraph::new("Default");
        let first = g.add_node(node("F", &[], &["A"])).unwrap();
        let err = g.add_node(node("G", &[], &["A", "B"])).unwrap_err();
        assert_eq!(err, GraphError::DuplicateProducer { spec: spec("A"), existing: first });
        assert_eq!(g.size(), 1);
        assert!(g.node_producing(&spec("B")).is_none());
    }

    #[test]
    fn test_roots_follow_consumers() {
        let mut g = DependencyGraph::new("Default");
        let a = g.add_node(node("F", &[], &["A"])).unwrap();
        assert!(g.is_root(a));

        let b = g.add_node(node("G", &["A"], &["B"])).unwrap();
        assert!(!g.is_root(a));
        assert!(g.is_root(b));

        g.remove_node(b).unwrap();
        assert!(g.is_root(a), "producer becomes root once its only consumer is removed");
    }

    #[test]
    fn test_remove_unknown_node() {
        let mut g = DependencyGraph::new("Default");
        let a = g.add_node(node("F", &[], &["A"])).unwrap();
        g.remove_node(a).unwrap();
        assert_eq!(g.remove_node(a).unwrap_err(), GraphError::UnknownNode(a));
    }

    #[test]
    fn test_mark_terminal_requires_producer() {
        let mut g = DependencyGraph::new("Default");
        let err = g.mark_terminal(requirement("A"), &spec("A")).unwrap_err();
        assert_eq!(err, GraphError::NoProducer(spec("A")));
    }

    #[test]
    fn test_terminal_backing_is_multi_valued() {
        let mut g = DependencyGraph::new("Default");
        let a = g.add_node(node("F", &[], &["A"])).unwrap();
        let r1 = requirement("A");
        let r2 = requirement("A").with_constraints(ValueProperties::new().with_any("Ccy"));
        g.mark_terminal(r1.clone(), &spec("A")).unwrap();
        g.mark_terminal(r2.clone(), &spec("A")).unwrap();

        g.unmark_terminal([&r1], &spec("A"));
        assert!(g.is_terminal_output(&spec("A")));
        assert!(g.node(a).unwrap().is_terminal(&spec("A")));

        g.unmark_terminal([&r2], &spec("A"));
        assert!(!g.is_terminal_output(&spec("A")));
        assert!(!g.node(a).unwrap().is_terminal(&spec("A")));
    }

    #[test]
    fn test_prune_cascades_to_fixed_point() {
        // A -> B -> C, plus A -> D (terminal). C is not terminal.
        let mut g = DependencyGraph::new("Default");
        g.add_node(node("FA", &[], &["A", "A2"])).unwrap();
        g.add_node(node("FB", &["A2"], &["B"])).unwrap();
        g.add_node(node("FC", &["B"], &["C"])).unwrap();
        g.add_node(node("FD", &["A"], &["D"])).unwrap();
        g.mark_terminal(requirement("D"), &spec("D")).unwrap();

        let removed = g.remove_unnecessary_outputs();
        assert_eq!(removed, 2);
        assert_eq!(g.size(), 2);
        let a = g.node_producing(&spec("A")).unwrap();
        assert_eq!(g.node(a).unwrap().output_count(), 1, "unused A2 output is dropped");
        assert!(g.node_producing(&spec("A2")).is_none());

        assert_eq!(g.remove_unnecessary_outputs(), 0);
        assert_eq!(g.size(), 2);
    }

    #[test]
    fn test_sub_graph_keeps_external_consumers() {
        let mut g = DependencyGraph::new("Default");
        let a = g.add_node(node("FA", &[], &["A"])).unwrap();
        let b = g.add_node(node("FB", &["A"], &["B"])).unwrap();
        g.mark_terminal(requirement("B"), &spec("B")).unwrap();

        let mut sub = g.sub_graph(|id, _| id == a);
        assert_eq!(sub.size(), 1);
        assert!(sub.is_externally_consumed(&spec("A")));
        assert!(sub.terminal_output_specifications().is_empty());
        assert_eq!(sub.node_producing(&spec("A")), Some(a));
        assert!(sub.is_root(a));
        assert_eq!(sub.remove_unnecessary_outputs(), 0);

        let only_b = g.sub_graph(|id, _| id == b);
        assert_eq!(only_b.node_producing(&spec("B")), Some(b));
        assert!(!only_b.contains(a));
        assert!(only_b.input_nodes(b).is_empty());
        assert!(only_b.is_root(b));
        assert!(only_b.is_terminal_output(&spec("B")));
    }

    #[test]
    fn test_replace_node_repoints_consumers() {
        let mut g = DependencyGraph::new("Default");
        let new_target = TargetSpecification::security("Bond7v2");
        let a = g.add_node(node("FA", &[], &["A"])).unwrap();
        let b = g.add_node(node("FB", &["A"], &["B"])).unwrap();
        g.mark_terminal(requirement("A"), &spec("A")).unwrap();

        let moved = ValueSpecification::new("A", new_target.clone(), ValueProperties::new());
        let replacement = DependencyNode::new(FunctionKind::computation("FA"), new_target).with_output(moved.clone());
        let new_a = g.replace_node(a, replacement).unwrap();

        assert!(!g.contains(a) || a == new_a);
        assert_eq!(g.node_producing(&moved), Some(new_a));
        assert!(g.node(b).unwrap().has_input(&moved));
        assert_eq!(g.input_nodes(b), vec![new_a]);
        assert!(g.is_terminal_output(&moved));
        assert!(!g.is_root(new_a));
        assert_eq!(g.all_computation_targets().len(), 2);
    }

    #[test]
    fn test_replace_unknown_node() {
        let mut g = DependencyGraph::new("Default");
        let a = g.add_node(node("FA", &[], &["A"])).unwrap();
        g.remove_node(a).unwrap();
        let err = g.replace_node(a, node("FA", &[], &["A"])).unwrap_err();
        assert_eq!(err, GraphError::ReplaceUnknownNode(a));
    }

    #[test]
    fn test_market_data_and_targets_are_tracked() {
        let mut g = DependencyGraph::new("Default");
        let md = DependencyNode::new(FunctionKind::MarketDataSource, TargetSpecification::security("Bond7"))
            .with_output(spec("CURVE"));
        let id = g.add_node(md).unwrap();
        assert!(g.all_required_market_data().contains(&spec("CURVE")));
        g.remove_node(id).unwrap();
        assert!(g.all_required_market_data().is_empty());
        assert!(g.all_computation_targets().is_empty());
    }
}
