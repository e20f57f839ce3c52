//! ledger.rs
//! Records which nodes of which configuration have executed or failed.

use crate::graph::NodeId;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeExecutionState {
    Executed,
    Failed(String),
}

/// Receives per-node execution outcomes as job results are applied.
pub trait ExecutionTracker: Send + Sync {
    fn mark_executed(&self, configuration: &str, node: NodeId);
    fn mark_failed(&self, configuration: &str, node: NodeId, reason: &str);
}

/// In-memory `ExecutionTracker`. Dense per configuration, indexed by node.
#[derive(Debug, Default)]
pub struct ExecutionLedger {
    states: Mutex<HashMap<String, Vec<Option<NodeExecutionState>>>>,
}

impl ExecutionLedger {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, configuration: &str, node: NodeId) -> Option<NodeExecutionState> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(configuration)?.get(node.index())?.clone()
    }

    fn insert(&self, configuration: &str, node: NodeId, state: NodeExecutionState) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let slots = states.entry(configuration.to_string()).or_default();
        let idx = node.index();
        if idx >= slots.len() {
            slots.resize(idx + 1, None);
        }
        slots[idx] = Some(state);
    }

    /// Forgets the state of the given nodes, e.g. before re-executing them.
    pub fn invalidate(&self, configuration: &str, nodes: impl IntoIterator<Item = NodeId>) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slots) = states.get_mut(configuration) {
            for node in nodes {
                if let Some(slot) = slots.get_mut(node.index()) {
                    *slot = None;
                }
            }
        }
    }

    pub fn executed_count(&self, configuration: &str) -> usize {
        self.count(configuration, |s| matches!(s, NodeExecutionState::Executed))
    }

    pub fn failed_count(&self, configuration: &str) -> usize {
        self.count(configuration, |s| matches!(s, NodeExecutionState::Failed(_)))
    }

    fn count(&self, configuration: &str, predicate: impl Fn(&NodeExecutionState) -> bool) -> usize {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states
            .get(configuration)
            .map_or(0, |slots| slots.iter().flatten().filter(|s| predicate(s)).count())
    }
}

impl ExecutionTracker for ExecutionLedger {
    fn mark_executed(&self, configuration: &str, node: NodeId) {
        self.insert(configuration, node, NodeExecutionState::Executed);
    }

    fn mark_failed(&self, configuration: &str, node: NodeId, reason: &str) {
        self.insert(configuration, node, NodeExecutionState::Failed(reason.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_kept_per_configuration() {
        let ledger = ExecutionLedger::new();
        let n0 = NodeId::new(0);
        let n5 = NodeId::new(5);
        ledger.mark_executed("Default", n0);
        ledger.mark_failed("Default", n5, "boom");
        ledger.mark_executed("Stress", n5);

        assert_eq!(ledger.get("Default", n0), Some(NodeExecutionState::Executed));
        assert_eq!(ledger.get("Default", n5), Some(NodeExecutionState::Failed("boom".into())));
        assert_eq!(ledger.get("Stress", n0), None);
        assert_eq!(ledger.executed_count("Default"), 1);
        assert_eq!(ledger.failed_count("Default"), 1);
    }

    #[test]
    fn test_invalidate_clears_slots() {
        let ledger = ExecutionLedger::new();
        let n1 = NodeId::new(1);
        ledger.mark_executed("Default", n1);
        ledger.invalidate("Default", [n1, NodeId::new(40)]);
        assert_eq!(ledger.get("Default", n1), None);
        assert_eq!(ledger.executed_count("Default"), 0);
    }
}
