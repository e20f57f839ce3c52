use crate::graph::{DependencyGraph, GraphError, NodeId};
use std::collections::{HashMap, HashSet};

/// Orders nodes so that every producer appears before its consumers.
///
/// Performs a post-order Depth-First Search from each root, following edges
/// from consumer back to producer. When `view` is given, only nodes inside it
/// are ordered; roots are then the view's nodes with no consumer in the view.
///
/// Nodes reachable from several roots are emitted once. Every node in scope is
/// visited even if no root reaches it, which is also how a cycle is surfaced.
pub fn execution_order(
    graph: &DependencyGraph,
    view: Option<&HashSet<NodeId>>,
) -> Result<Vec<NodeId>, GraphError> {
    let in_scope = |id: &NodeId| graph.contains(*id) && view.map_or(true, |v| v.contains(id));

    let mut scope: Vec<NodeId> = match view {
        Some(v) => v.iter().copied().filter(|id| in_scope(id)).collect(),
        None => graph.nodes().map(|(id, _)| id).collect(),
    };
    scope.sort();

    let roots: Vec<NodeId> = match view {
        None => graph.root_nodes().iter().copied().collect(),
        Some(_) => scope
            .iter()
            .copied()
            .filter(|&id| !graph.dependents(id).iter().any(|d| in_scope(d)))
            .collect(),
    };

    let mut order = Vec::with_capacity(scope.len());
    let mut state = HashMap::with_capacity(scope.len());

    for node in roots.into_iter().chain(scope.iter().copied()) {
        if !state.contains_key(&node) {
            visit(node, graph, &in_scope, &mut state, &mut order)?;
        }
    }

    Ok(order)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting, // Used for cycle detection
    Visited,
}

fn visit<F>(
    node: NodeId,
    graph: &DependencyGraph,
    in_scope: &F,
    state: &mut HashMap<NodeId, VisitState>,
    order: &mut Vec<NodeId>,
) -> Result<(), GraphError>
where
    F: Fn(&NodeId) -> bool,
{
    match state.get(&node) {
        Some(VisitState::Visited) => return Ok(()),
        Some(VisitState::Visiting) => return Err(GraphError::CycleDetected(node)),
        None => {
            state.insert(node, VisitState::Visiting);
        }
    }

    // Recurse on producers of this node's inputs.
    for producer in graph.input_nodes(node) {
        if in_scope(&producer) {
            visit(producer, graph, in_scope, state, order)?;
        }
    }

    state.insert(node, VisitState::Visited);
    order.push(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyNode;
    use crate::value::{FunctionKind, TargetSpecification, ValueProperties, ValueSpecification};

    fn spec(name: &str) -> ValueSpecification {
        ValueSpecification::new(name, TargetSpecification::primitive("X"), ValueProperties::new())
    }

    fn add(g: &mut DependencyGraph, inputs: &[&str], output: &str) -> NodeId {
        let mut n = DependencyNode::new(FunctionKind::computation(output), TargetSpecification::primitive("X"));
        for i in inputs { n.add_input(spec(i)); }
        n.add_output(spec(output));
        g.add_node(n).expect("add failed")
    }

    #[test]
    fn test_sort_diamond_dependency() {
        // Shape: A -> B, A -> C, B+C -> D
        let mut g = DependencyGraph::new("Default");
        let a = add(&mut g, &[], "A");
        let b = add(&mut g, &["A"], "B");
        let c = add(&mut g, &["A"], "C");
        let d = add(&mut g, &["B", "C"], "D");

        let res = execution_order(&g, None).expect("Sort failed");
        assert_eq!(res.len(), 4, "shared producer appears once");

        let pos = |id: NodeId| res.iter().position(|&x| x == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));
    }

    #[test]
    fn test_disjoint_roots() {
        let mut g = DependencyGraph::new("Default");
        let a = add(&mut g, &[], "A");
        let b = add(&mut g, &["A"], "B");
        let x = add(&mut g, &[], "X");
        let y = add(&mut g, &["X"], "Y");

        let res = execution_order(&g, None).unwrap();
        let pos = |id: NodeId| res.iter().position(|&n| n == id).unwrap();
        assert_eq!(res.len(), 4);
        assert!(pos(a) < pos(b));
        assert!(pos(x) < pos(y));
    }

    #[test]
    fn test_view_skips_excluded_nodes() {
        let mut g = DependencyGraph::new("Default");
        let a = add(&mut g, &[], "A");
        let b = add(&mut g, &["A"], "B");
        let c = add(&mut g, &["B"], "C");

        let view: HashSet<NodeId> = [b, c].into_iter().collect();
        let res = execution_order(&g, Some(&view)).unwrap();
        assert_eq!(res, vec![b, c]);
        assert!(!res.contains(&a));
    }
}
