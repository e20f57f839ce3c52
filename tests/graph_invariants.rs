//! Randomised checks of the graph model's structural invariants.

use calcgraph_core::graph::{DependencyGraph, DependencyNode, NodeId};
use calcgraph_core::validation::Validator;
use calcgraph_core::value::{FunctionKind, TargetSpecification, ValueProperties, ValueRequirement, ValueSpecification};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};

fn spec(i: usize) -> ValueSpecification {
    ValueSpecification::new(format!("V{}", i), TargetSpecification::primitive("T"), ValueProperties::new())
}

/// Node `i` produces V_i and reads a random subset of V_0..V_{i-1}, so the
/// blueprint is acyclic whatever order nodes are inserted in.
fn blueprint(rng: &mut StdRng, size: usize) -> Vec<DependencyNode> {
    (0..size)
        .map(|i| {
            let mut node = DependencyNode::new(FunctionKind::computation(format!("F{}", i)), TargetSpecification::primitive("T"));
            node.add_output(spec(i));
            for j in 0..i {
                if rng.gen_bool(0.25) {
                    node.add_input(spec(j));
                }
            }
            node
        })
        .collect()
}

fn assert_invariants(graph: &DependencyGraph) {
    if let Err(errors) = Validator::new(graph).validate() {
        panic!("invariants broken: {:?}", errors);
    }
    for (id, node) in graph.nodes() {
        for output in node.outputs() {
            assert_eq!(graph.node_producing(output), Some(id));
        }
        assert_eq!(graph.is_root(id), graph.dependents(id).is_empty());
    }
}

fn assert_order_valid(graph: &DependencyGraph) {
    let order = graph.execution_order().unwrap();
    assert_eq!(order.len(), graph.size());
    let position: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    for (&id, &pos) in &position {
        for producer in graph.input_nodes(id) {
            assert!(position[&producer] < pos, "{:?} ordered before its input {:?}", id, producer);
        }
    }
}

#[test]
fn test_random_insert_and_remove_keeps_invariants() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut nodes = blueprint(&mut rng, 24);
        nodes.shuffle(&mut rng);

        let mut graph = DependencyGraph::new("Default");
        let mut present = Vec::new();
        for node in nodes {
            present.push(graph.add_node(node).unwrap());
            assert_invariants(&graph);
        }
        assert_order_valid(&graph);

        present.shuffle(&mut rng);
        for id in present.drain(..12) {
            graph.remove_node(id).unwrap();
            assert_invariants(&graph);
        }
        assert_eq!(graph.size(), 12);
        assert_order_valid(&graph);
    }
}

#[test]
fn test_duplicate_outputs_never_enter_the_index() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut graph = DependencyGraph::new("Default");
    for node in blueprint(&mut rng, 10) {
        graph.add_node(node).unwrap();
    }
    for i in 0..10 {
        let clash = DependencyNode::new(FunctionKind::computation("Clash"), TargetSpecification::primitive("T"))
            .with_output(spec(i));
        assert!(graph.add_node(clash).is_err());
    }
    assert_eq!(graph.size(), 10);
    assert_invariants(&graph);
}

#[test]
fn test_pruning_is_idempotent() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut graph = DependencyGraph::new("Default");
        let ids: Vec<NodeId> = blueprint(&mut rng, 30).into_iter().map(|n| graph.add_node(n).unwrap()).collect();

        let terminal: HashSet<usize> = (0..30).filter(|_| rng.gen_bool(0.2)).collect();
        for &i in &terminal {
            let requirement = ValueRequirement::new(format!("V{}", i), TargetSpecification::primitive("T"));
            graph.mark_terminal(requirement, &spec(i)).unwrap();
        }

        graph.remove_unnecessary_outputs();
        let after_first = graph.size();
        assert_eq!(graph.remove_unnecessary_outputs(), 0);
        assert_eq!(graph.size(), after_first);
        assert!(graph.nodes().all(|(_, n)| n.output_count() > 0));
        assert_invariants(&graph);

        // Every terminal survives pruning on its original node.
        for &i in &terminal {
            assert_eq!(graph.node_producing(&spec(i)), Some(ids[i]));
        }
        assert_order_valid(&graph);
    }
}

#[test]
fn test_sub_graph_orders_partial_views() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut graph = DependencyGraph::new("Default");
    let ids: Vec<NodeId> = blueprint(&mut rng, 20).into_iter().map(|n| graph.add_node(n).unwrap()).collect();

    let keep: HashSet<NodeId> = ids.iter().copied().filter(|_| rng.gen_bool(0.5)).collect();
    let sub = graph.sub_graph_of(&keep);
    assert_eq!(sub.size(), keep.len());
    assert_invariants(&sub);
    assert_order_valid(&sub);

    // Anything read by a node left outside is remembered as externally consumed.
    for (_, node) in sub.nodes() {
        for output in node.outputs() {
            let read_outside = graph
                .consumers_of(output)
                .any(|consumer| !keep.contains(&consumer));
            assert_eq!(sub.is_externally_consumed(output), read_outside);
        }
    }
}
