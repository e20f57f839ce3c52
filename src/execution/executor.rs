//! executor.rs
//! Submits graphs to a dispatcher and applies the results back.

use super::dispatch::{Cancelable, DispatchError, JobDispatcher, JobResultReceiver};
use super::job::{build_job, ItemStatus, JobId, JobResult};
use super::ledger::ExecutionTracker;
use crate::analysis::telemetry::ExecutionStatistics;
use crate::graph::{DependencyGraph, GraphError, NodeId};
use futures::channel::oneshot;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Cannot build job: {0}")]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("Execution was cancelled")]
    Cancelled,
    #[error("Execution ended without a result")]
    Abandoned,
}

/// Outcome of one executed graph. Partial failure is not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub job: JobId,
    pub calculation_configuration: String,
    pub executed: Vec<NodeId>,
    pub failed: Vec<(NodeId, String)>,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool { self.failed.is_empty() }
    pub fn node_count(&self) -> usize { self.executed.len() + self.failed.len() }
}

type Completion = oneshot::Sender<Result<ExecutionResult, ExecutionError>>;

struct PendingJob {
    configuration: String,
    nodes: HashSet<NodeId>,
    started: Instant,
    done: Arc<AtomicBool>,
    completion: Completion,
}

/// Routes job results back to the handles waiting on them.
struct ResultRouter {
    pending: Mutex<HashMap<JobId, PendingJob>>,
    tracker: Arc<dyn ExecutionTracker>,
    statistics: Arc<ExecutionStatistics>,
}

impl ResultRouter {
    fn take(&self, job: JobId) -> Option<PendingJob> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&job)
    }
}

impl JobResultReceiver for ResultRouter {
    fn on_result(&self, result: JobResult) {
        let Some(job) = self.take(result.job) else {
            warn!(job = %result.job, "dropping result for unknown or completed job");
            return;
        };

        let mut executed = Vec::new();
        let mut failed = Vec::new();
        for item in result.items {
            if !job.nodes.contains(&item.node) {
                warn!(job = %result.job, node = item.node.index(), "dropping outcome for node outside the job");
                continue;
            }
            match item.status {
                ItemStatus::Success => {
                    self.tracker.mark_executed(&job.configuration, item.node);
                    executed.push(item.node);
                }
                ItemStatus::Failure(reason) => {
                    self.tracker.mark_failed(&job.configuration, item.node, &reason);
                    failed.push((item.node, reason));
                }
            }
        }

        let duration = job.started.elapsed();
        self.statistics.record(executed.len(), failed.len(), duration);
        info!(
            job = %result.job,
            configuration = %job.configuration,
            executed = executed.len(),
            failed = failed.len(),
            ?duration,
            "job complete"
        );

        job.done.store(true, Ordering::Release);
        let outcome = ExecutionResult {
            job: result.job,
            calculation_configuration: job.configuration,
            executed,
            failed,
            duration,
        };
        let _ = job.completion.send(Ok(outcome));
    }
}

/// Converts graphs into jobs and tracks them until their results arrive.
pub struct GraphExecutor {
    dispatcher: Arc<dyn JobDispatcher>,
    router: Arc<ResultRouter>,
    next_job: AtomicU64,
}

impl GraphExecutor {
    pub fn new(dispatcher: Arc<dyn JobDispatcher>, tracker: Arc<dyn ExecutionTracker>) -> Self {
        Self::with_statistics(dispatcher, tracker, Arc::new(ExecutionStatistics::new()))
    }

    pub fn with_statistics(
        dispatcher: Arc<dyn JobDispatcher>,
        tracker: Arc<dyn ExecutionTracker>,
        statistics: Arc<ExecutionStatistics>,
    ) -> Self {
        let router = ResultRouter { pending: Mutex::new(HashMap::new()), tracker, statistics };
        Self { dispatcher, router: Arc::new(router), next_job: AtomicU64::new(1) }
    }

    pub fn statistics(&self) -> &Arc<ExecutionStatistics> { &self.router.statistics }

    /// Number of dispatched jobs still waiting for a result.
    pub fn pending_jobs(&self) -> usize {
        self.router.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Dispatches `graph` as one job.
    pub fn execute(&self, graph: &DependencyGraph) -> Result<ExecutionHandle, ExecutionError> {
        let id = JobId(self.next_job.fetch_add(1, Ordering::Relaxed));
        let job = build_job(id, graph)?;
        debug!(
            job = %id,
            items = job.items.len(),
            declared_cache = job.cache_selection.declared_len(),
            "dispatching job"
        );

        let (completion, receiver) = oneshot::channel();
        let done = Arc::new(AtomicBool::new(false));
        let pending = PendingJob {
            configuration: job.calculation_configuration.clone(),
            nodes: job.items.iter().map(|item| item.node).collect(),
            started: Instant::now(),
            done: Arc::clone(&done),
            completion,
        };
        // Registered first: a dispatcher may report before `dispatch` returns.
        self.router.pending.lock().unwrap_or_else(PoisonError::into_inner).insert(id, pending);

        let receiver_handle: Arc<dyn JobResultReceiver> = self.router.clone();
        match self.dispatcher.dispatch(job, receiver_handle) {
            Ok(cancelable) => Ok(ExecutionHandle {
                job: id,
                receiver,
                cancelable,
                router: Arc::clone(&self.router),
                done,
                cancelled: AtomicBool::new(false),
            }),
            Err(e) => {
                self.router.take(id);
                Err(e.into())
            }
        }
    }
}

/// A dispatched job. Resolves when its result has been applied.
pub struct ExecutionHandle {
    job: JobId,
    receiver: oneshot::Receiver<Result<ExecutionResult, ExecutionError>>,
    cancelable: Box<dyn Cancelable>,
    router: Arc<ResultRouter>,
    done: Arc<AtomicBool>,
    cancelled: AtomicBool,
}

impl ExecutionHandle {
    pub fn job(&self) -> JobId { self.job }

    /// Forwards cancellation to the dispatcher. Succeeds only if the
    /// dispatcher cancels and no result has been applied yet.
    pub fn cancel(&self) -> bool {
        if self.is_done() || self.is_cancelled() {
            return false;
        }
        if !self.cancelable.cancel() {
            return false;
        }
        self.cancelled.store(true, Ordering::Release);
        if let Some(pending) = self.router.take(self.job) {
            pending.done.store(true, Ordering::Release);
            let _ = pending.completion.send(Err(ExecutionError::Cancelled));
        }
        true
    }

    pub fn is_done(&self) -> bool { self.done.load(Ordering::Acquire) }
    pub fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }

    pub fn wait(self) -> Result<ExecutionResult, ExecutionError> {
        futures::executor::block_on(self)
    }
}

impl Future for ExecutionHandle {
    type Output = Result<ExecutionResult, ExecutionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(ExecutionError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
