//! job.rs
//! The ordered job sent to a dispatcher for one graph, and the results it returns.

use crate::graph::{DependencyGraph, GraphError, NodeId};
use crate::value::{FunctionKind, TargetSpecification, ValueSpecification};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// One node's invocation within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobItem {
    pub node: NodeId,
    pub function: FunctionKind,
    pub target: TargetSpecification,
    pub inputs: Vec<ValueSpecification>,
    pub outputs: Vec<ValueSpecification>,
}

/// Which produced values go to the shared cache.
///
/// Only the smaller of the two sets is sent; the other is implied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheSelection {
    /// These values are shared; every other output is private.
    Shared(BTreeSet<ValueSpecification>),
    /// These values are private; every other output is shared.
    Private(BTreeSet<ValueSpecification>),
}

impl CacheSelection {
    pub fn is_shared(&self, spec: &ValueSpecification) -> bool {
        match self {
            CacheSelection::Shared(shared) => shared.contains(spec),
            CacheSelection::Private(private) => !private.contains(spec),
        }
    }

    /// Number of values listed explicitly.
    pub fn declared_len(&self) -> usize {
        match self {
            CacheSelection::Shared(set) | CacheSelection::Private(set) => set.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationJob {
    pub id: JobId,
    pub calculation_configuration: String,
    /// Items in execution order.
    pub items: Vec<JobItem>,
    pub cache_selection: CacheSelection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub node: NodeId,
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub fn success(node: NodeId) -> Self { Self { node, status: ItemStatus::Success } }

    pub fn failure(node: NodeId, reason: impl Into<String>) -> Self {
        Self { node, status: ItemStatus::Failure(reason.into()) }
    }
}

/// Per-node outcomes for a whole job, delivered once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job: JobId,
    pub items: Vec<ItemOutcome>,
}

/// A value is private when it is not terminal, not read outside this graph,
/// and read by at least one node inside it. Anything else counts as shared.
fn is_private(graph: &DependencyGraph, spec: &ValueSpecification) -> bool {
    !graph.is_terminal_output(spec)
        && !graph.is_externally_consumed(spec)
        && graph.consumers_of(spec).next().is_some()
}

/// Splits the graph's outputs and declares whichever side is smaller.
pub fn select_cache(graph: &DependencyGraph) -> CacheSelection {
    let (private, shared): (BTreeSet<ValueSpecification>, BTreeSet<ValueSpecification>) =
        graph.output_specifications().cloned().partition(|spec| is_private(graph, spec));
    if private.len() > shared.len() {
        CacheSelection::Shared(shared)
    } else {
        CacheSelection::Private(private)
    }
}

/// Builds the job for `graph`, items ordered so producers precede consumers.
pub fn build_job(id: JobId, graph: &DependencyGraph) -> Result<CalculationJob, GraphError> {
    let order = graph.execution_order()?;
    let items = order
        .into_iter()
        .map(|node_id| {
            let node = graph.node(node_id).ok_or(GraphError::UnknownNode(node_id))?;
            Ok(JobItem {
                node: node_id,
                function: node.function().clone(),
                target: node.target().clone(),
                inputs: node.inputs().cloned().collect(),
                outputs: node.outputs().cloned().collect(),
            })
        })
        .collect::<Result<Vec<_>, GraphError>>()?;

    Ok(CalculationJob {
        id,
        calculation_configuration: graph.calculation_configuration().to_string(),
        items,
        cache_selection: select_cache(graph),
    })
}
