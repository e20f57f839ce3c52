//! GraphExecutor against scripted dispatchers.

use calcgraph_core::execution::{
    CacheSelection, CalculationJob, Cancelable, DispatchError, ExecutionError, ExecutionLedger, GraphExecutor,
    ItemOutcome, JobDispatcher, JobId, JobResult, JobResultReceiver, NodeExecutionState,
};
use calcgraph_core::graph::{DependencyGraph, DependencyNode, NodeId};
use calcgraph_core::value::{FunctionKind, TargetSpecification, ValueProperties, ValueRequirement, ValueSpecification};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

fn spec(name: &str) -> ValueSpecification {
    ValueSpecification::new(name, TargetSpecification::security("S"), ValueProperties::new())
}

/// CURVE -> A -> B -> PV, with PV terminal.
fn chain() -> (DependencyGraph, Vec<NodeId>) {
    let mut g = DependencyGraph::new("Default");
    let mut ids = Vec::new();
    let mut previous: Option<&str> = None;
    for name in ["CURVE", "A", "B", "PV"] {
        let mut node = DependencyNode::new(FunctionKind::computation(format!("F{}", name)), TargetSpecification::security("S"));
        if let Some(input) = previous {
            node.add_input(spec(input));
        }
        node.add_output(spec(name));
        ids.push(g.add_node(node).unwrap());
        previous = Some(name);
    }
    g.mark_terminal(ValueRequirement::new("PV", TargetSpecification::security("S")), &spec("PV")).unwrap();
    (g, ids)
}

struct Handle {
    cancels: bool,
    cancelled: Arc<AtomicBool>,
}

impl Cancelable for Handle {
    fn cancel(&self) -> bool {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancels
    }
}

/// Records jobs and replies synchronously, failing the listed function ids.
#[derive(Default)]
struct ScriptedDispatcher {
    fail: HashSet<String>,
    reply: bool,
    cancels: bool,
    jobs: Mutex<Vec<CalculationJob>>,
    receivers: Mutex<Vec<Arc<dyn JobResultReceiver>>>,
    cancelled: Arc<AtomicBool>,
}

impl JobDispatcher for ScriptedDispatcher {
    fn dispatch(&self, job: CalculationJob, receiver: Arc<dyn JobResultReceiver>) -> Result<Box<dyn Cancelable>, DispatchError> {
        let result = JobResult {
            job: job.id,
            items: job
                .items
                .iter()
                .map(|item| {
                    if self.fail.contains(item.function.function_id()) {
                        ItemOutcome::failure(item.node, "function threw")
                    } else {
                        ItemOutcome::success(item.node)
                    }
                })
                .collect(),
        };
        self.jobs.lock().unwrap().push(job);
        self.receivers.lock().unwrap().push(Arc::clone(&receiver));
        if self.reply {
            receiver.on_result(result);
        }
        Ok(Box::new(Handle { cancels: self.cancels, cancelled: Arc::clone(&self.cancelled) }))
    }
}

struct RefusingDispatcher;

impl JobDispatcher for RefusingDispatcher {
    fn dispatch(&self, _job: CalculationJob, _receiver: Arc<dyn JobResultReceiver>) -> Result<Box<dyn Cancelable>, DispatchError> {
        Err(DispatchError::Unavailable)
    }
}

#[test]
fn test_successful_job_marks_every_node() {
    let (graph, ids) = chain();
    let dispatcher = Arc::new(ScriptedDispatcher { reply: true, ..Default::default() });
    let ledger = Arc::new(ExecutionLedger::new());
    let executor = GraphExecutor::new(dispatcher.clone(), ledger.clone());

    let handle = executor.execute(&graph).unwrap();
    assert!(handle.is_done());
    let result = handle.wait().unwrap();

    assert!(result.is_success());
    assert_eq!(result.executed, ids);
    for id in &ids {
        assert_eq!(ledger.get("Default", *id), Some(NodeExecutionState::Executed));
    }

    let jobs = dispatcher.jobs.lock().unwrap();
    let order: Vec<NodeId> = jobs[0].items.iter().map(|i| i.node).collect();
    assert_eq!(order, ids);
    // Three private intermediates against one terminal: declare the shared side.
    assert_eq!(jobs[0].cache_selection, CacheSelection::Shared([spec("PV")].into_iter().collect()));

    let stats = executor.statistics().snapshot();
    assert_eq!(stats.graphs_processed, 1);
    assert_eq!(stats.nodes_executed, 4);
    assert_eq!(executor.pending_jobs(), 0);
}

#[test]
fn test_partial_failure_is_reported_per_node() {
    let (graph, ids) = chain();
    let dispatcher = Arc::new(ScriptedDispatcher {
        reply: true,
        fail: HashSet::from(["FB".to_string()]),
        ..Default::default()
    });
    let ledger = Arc::new(ExecutionLedger::new());
    let executor = GraphExecutor::new(dispatcher, ledger.clone());

    let result = futures::executor::block_on(executor.execute(&graph).unwrap()).unwrap();

    assert!(!result.is_success());
    assert_eq!(result.node_count(), 4);
    assert_eq!(result.failed, vec![(ids[2], "function threw".to_string())]);
    assert_eq!(ledger.get("Default", ids[3]), Some(NodeExecutionState::Executed));
    assert_eq!(ledger.failed_count("Default"), 1);
    assert_eq!(executor.statistics().snapshot().nodes_failed, 1);
}

#[test]
fn test_sub_graph_execution_marks_parent_nodes() {
    let (graph, ids) = chain();
    let tail: HashSet<NodeId> = [ids[2], ids[3]].into_iter().collect();
    let sub = graph.sub_graph_of(&tail);

    let dispatcher = Arc::new(ScriptedDispatcher { reply: true, ..Default::default() });
    let ledger = Arc::new(ExecutionLedger::new());
    let executor = GraphExecutor::new(dispatcher.clone(), ledger.clone());
    let result = executor.execute(&sub).unwrap().wait().unwrap();

    assert_eq!(result.executed, vec![ids[2], ids[3]]);
    assert_eq!(ledger.get("Default", ids[0]), None);
    assert_eq!(ledger.get("Default", ids[1]), None);
    assert_eq!(ledger.get("Default", ids[2]), Some(NodeExecutionState::Executed));
    assert_eq!(ledger.get("Default", ids[3]), Some(NodeExecutionState::Executed));

    let jobs = dispatcher.jobs.lock().unwrap();
    let functions: Vec<&str> = jobs[0].items.iter().map(|i| i.function.function_id()).collect();
    assert_eq!(functions, vec!["FB", "FPV"]);
}

#[test]
fn test_result_for_unknown_job_is_dropped() {
    let (graph, _) = chain();
    let dispatcher = Arc::new(ScriptedDispatcher { reply: true, ..Default::default() });
    let executor = GraphExecutor::new(dispatcher.clone(), Arc::new(ExecutionLedger::new()));
    executor.execute(&graph).unwrap().wait().unwrap();

    // A late duplicate and a stranger both arrive after completion.
    let receiver = Arc::clone(&dispatcher.receivers.lock().unwrap()[0]);
    receiver.on_result(JobResult { job: JobId(1), items: Vec::new() });
    receiver.on_result(JobResult { job: JobId(999), items: Vec::new() });

    assert_eq!(executor.statistics().snapshot().graphs_processed, 1);
}

#[test]
fn test_job_ids_are_unique() {
    let (graph, _) = chain();
    let dispatcher = Arc::new(ScriptedDispatcher { reply: true, ..Default::default() });
    let executor = GraphExecutor::new(dispatcher.clone(), Arc::new(ExecutionLedger::new()));
    let first = executor.execute(&graph).unwrap();
    let second = executor.execute(&graph).unwrap();
    assert_ne!(first.job(), second.job());
}

#[test]
fn test_cancel_forwards_to_dispatcher() {
    let (graph, _) = chain();
    let dispatcher = Arc::new(ScriptedDispatcher { cancels: true, ..Default::default() });
    let executor = GraphExecutor::new(dispatcher.clone(), Arc::new(ExecutionLedger::new()));

    let handle = executor.execute(&graph).unwrap();
    assert!(!handle.is_done());
    assert_eq!(executor.pending_jobs(), 1);
    assert!(handle.cancel());
    assert!(dispatcher.cancelled.load(Ordering::SeqCst));
    assert!(handle.is_cancelled());
    assert_eq!(executor.pending_jobs(), 0);
    assert_eq!(handle.wait(), Err(ExecutionError::Cancelled));
}

#[test]
fn test_cancel_fails_when_dispatcher_refuses() {
    let (graph, _) = chain();
    let dispatcher = Arc::new(ScriptedDispatcher { cancels: false, ..Default::default() });
    let executor = GraphExecutor::new(dispatcher.clone(), Arc::new(ExecutionLedger::new()));

    let handle = executor.execute(&graph).unwrap();
    assert!(!handle.cancel());
    assert!(!handle.is_cancelled());

    // The job is still live; its result completes the handle.
    let job = handle.job();
    let receiver = Arc::clone(&dispatcher.receivers.lock().unwrap()[0]);
    receiver.on_result(JobResult { job, items: Vec::new() });
    assert!(handle.wait().unwrap().is_success());
}

#[test]
fn test_dispatch_error_is_returned() {
    let (graph, _) = chain();
    let executor = GraphExecutor::new(Arc::new(RefusingDispatcher), Arc::new(ExecutionLedger::new()));
    assert!(matches!(executor.execute(&graph), Err(ExecutionError::Dispatch(DispatchError::Unavailable))));
    assert_eq!(executor.pending_jobs(), 0);
}
