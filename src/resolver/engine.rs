//! engine.rs
//! Drives resolve tasks to completion against one dependency graph.
//!
//! Tasks live in an arena and are advanced one step at a time from a ready
//! queue. A task that needs another requirement resolved either finds it in
//! the claim map (resolved, failed or in flight) or claims it by spawning a
//! new task, then parks until the outcome is delivered. A lookup answering
//! `WouldBlock` parks the task on the suspended list until the caller resumes
//! it, so no thread ever blocks inside the resolver.

use super::failure::{FailureKind, ResolutionFailure};
use super::task::{PendingCandidate, ResolveTask, TaskId, TaskState, Waiter};
use crate::graph::{DependencyGraph, DependencyNode, GraphError};
use crate::provider::{Availability, CandidateFunction, ResolutionServices, TargetLookup};
use crate::value::{ComputationTarget, FunctionKind, ValueRequirement, ValueSpecification};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

pub type RequirementOutcome = Result<ValueSpecification, ResolutionFailure>;

/// Result of one `pump` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// Every task has finished.
    Finished,
    /// Nothing is ready, but suspended tasks remain.
    Blocked,
    Cancelled,
}

/// Counts of tasks started and finished, readable from other threads.
#[derive(Debug, Default)]
pub struct ResolutionProgress {
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl ResolutionProgress {
    pub fn new() -> Self { Self::default() }
    pub fn started(&self) -> usize { self.started.load(Ordering::Relaxed) }
    pub fn finished(&self) -> usize { self.finished.load(Ordering::Relaxed) }

    /// Fraction of started tasks that have finished. Diagnostic only.
    pub fn fraction(&self) -> f64 {
        let started = self.started();
        if started == 0 {
            return 0.0;
        }
        (self.finished() as f64 / started as f64).min(1.0)
    }
}

#[derive(Debug, Clone)]
enum Claim {
    Pending(TaskId),
    Resolved(ValueSpecification),
    Failed(ResolutionFailure),
}

enum Attach {
    Ready(ValueSpecification),
    Failed(ResolutionFailure),
    Waiting(TaskId),
}

enum Step {
    Continue,
    Waiting,
    Blocked,
    Done,
}

#[derive(Clone, Copy)]
enum Phase {
    ResolveTarget,
    CheckLiveData,
    EnumerateFunctions,
    NextCandidate,
    Commit,
    Waiting,
    Finished,
}

#[derive(Debug)]
struct RootRequest {
    requirement: ValueRequirement,
    outcome: Option<RequirementOutcome>,
}

/// Resolves requirements into nodes of one graph.
///
/// The resolver has a single writer: the claim map and the graph are only
/// touched through `&mut self`, which is what makes claim-or-attach atomic.
pub struct Resolver {
    services: ResolutionServices,
    max_depth: usize,
    tasks: Vec<ResolveTask>,
    claims: HashMap<ValueRequirement, Claim>,
    ready: VecDeque<TaskId>,
    suspended: Vec<TaskId>,
    roots: Vec<RootRequest>,
    progress: Arc<ResolutionProgress>,
}

impl Resolver {
    pub fn new(services: ResolutionServices, max_depth: usize) -> Self {
        Self {
            services,
            max_depth,
            tasks: Vec::new(),
            claims: HashMap::new(),
            ready: VecDeque::new(),
            suspended: Vec::new(),
            roots: Vec::new(),
            progress: Arc::new(ResolutionProgress::new()),
        }
    }

    /// Reports task counts into `progress` instead of a private counter.
    pub fn with_progress(mut self, progress: Arc<ResolutionProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &Arc<ResolutionProgress> { &self.progress }

    /// Submits a requirement. Requirements already resolved in this
    /// resolver complete immediately; equal requirements share one task.
    pub fn add_requirement(&mut self, graph: &mut DependencyGraph, requirement: ValueRequirement) -> Result<(), GraphError> {
        let index = self.roots.len();
        self.roots.push(RootRequest { requirement: requirement.clone(), outcome: None });
        match self.claim_or_attach(requirement, Waiter::Root(index), 0) {
            Attach::Ready(spec) => self.finish_root(graph, index, Ok(spec)),
            Attach::Failed(failure) => self.finish_root(graph, index, Err(failure)),
            Attach::Waiting(_) => Ok(()),
        }
    }

    /// Advances ready tasks until none is left or cancellation is observed.
    pub fn pump(&mut self, graph: &mut DependencyGraph, cancelled: &AtomicBool) -> Result<PumpStatus, GraphError> {
        while let Some(id) = self.ready.pop_front() {
            if cancelled.load(Ordering::Acquire) {
                self.ready.push_front(id);
                self.cancel();
                return Ok(PumpStatus::Cancelled);
            }
            match self.step(graph, id)? {
                Step::Continue => self.ready.push_front(id),
                Step::Blocked => self.suspended.push(id),
                Step::Waiting | Step::Done => {}
            }
        }
        if cancelled.load(Ordering::Acquire) && !self.suspended.is_empty() {
            self.cancel();
            return Ok(PumpStatus::Cancelled);
        }
        Ok(if self.suspended.is_empty() { PumpStatus::Finished } else { PumpStatus::Blocked })
    }

    /// Makes every suspended task ready again.
    pub fn resume_suspended(&mut self) {
        self.ready.extend(self.suspended.drain(..));
    }

    /// Fails every unfinished task and root with `Cancelled`.
    pub fn cancel(&mut self) {
        for task in self.tasks.iter_mut().filter(|t| !t.state.is_finished()) {
            let failure = ResolutionFailure::new(task.requirement.clone(), FailureKind::Cancelled);
            task.state = TaskState::Failed(failure);
            task.waiters.clear();
            task.waiting_on.clear();
        }
        self.ready.clear();
        self.suspended.clear();
        self.claims.retain(|_, claim| !matches!(claim, Claim::Pending(_)));
        for root in self.roots.iter_mut().filter(|r| r.outcome.is_none()) {
            root.outcome = Some(Err(ResolutionFailure::new(root.requirement.clone(), FailureKind::Cancelled)));
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ready.is_empty() && self.suspended.is_empty()
    }

    pub fn task_count(&self) -> usize { self.tasks.len() }

    pub fn suspended_count(&self) -> usize { self.suspended.len() }

    /// Every submitted requirement with its outcome, if known.
    pub fn outcomes(&self) -> impl Iterator<Item = (&ValueRequirement, Option<&RequirementOutcome>)> {
        self.roots.iter().map(|r| (&r.requirement, r.outcome.as_ref()))
    }

    pub fn outcome_of(&self, requirement: &ValueRequirement) -> Option<&RequirementOutcome> {
        self.roots.iter().find(|r| &r.requirement == requirement).and_then(|r| r.outcome.as_ref())
    }

    // --- Claim map ---

    fn claim_or_attach(&mut self, requirement: ValueRequirement, waiter: Waiter, depth: usize) -> Attach {
        match self.claims.get(&requirement) {
            Some(Claim::Resolved(spec)) => return Attach::Ready(spec.clone()),
            Some(Claim::Failed(failure)) => return Attach::Failed(failure.clone()),
            Some(Claim::Pending(other)) => {
                let other = *other;
                if let Waiter::Input { task, .. } = waiter {
                    if other == task || self.waits_on(other, task) {
                        trace!(%requirement, "recursion detected");
                        return Attach::Failed(ResolutionFailure::new(requirement, FailureKind::RecursionDetected));
                    }
                }
                self.tasks[other.0].waiters.push(waiter);
                return Attach::Waiting(other);
            }
            None => {}
        }

        if depth > self.max_depth {
            let failure = ResolutionFailure::new(requirement, FailureKind::RecursionDetected)
                .with_detail(format!("resolution depth exceeds {}", self.max_depth));
            return Attach::Failed(failure);
        }

        let id = TaskId(self.tasks.len());
        let mut task = ResolveTask::new(requirement.clone(), depth);
        task.waiters.push(waiter);
        self.tasks.push(task);
        self.claims.insert(requirement, Claim::Pending(id));
        self.ready.push_back(id);
        self.progress.started.fetch_add(1, Ordering::Relaxed);
        Attach::Waiting(id)
    }

    /// True if `from` is waiting, directly or transitively, for `target`.
    fn waits_on(&self, from: TaskId, target: TaskId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            for &next in &self.tasks[id.0].waiting_on {
                if next == target {
                    return true;
                }
                stack.push(next);
            }
        }
        false
    }

    // --- State machine ---

    fn step(&mut self, graph: &mut DependencyGraph, id: TaskId) -> Result<Step, GraphError> {
        let phase = match &self.tasks[id.0].state {
            TaskState::ResolveTarget => Phase::ResolveTarget,
            TaskState::CheckLiveData => Phase::CheckLiveData,
            TaskState::EnumerateFunctions => Phase::EnumerateFunctions,
            TaskState::NextCandidate => Phase::NextCandidate,
            TaskState::ResolveInputs(pending) if pending.outstanding == 0 => Phase::Commit,
            TaskState::ResolveInputs(_) => Phase::Waiting,
            TaskState::Committed(_) | TaskState::Failed(_) => Phase::Finished,
        };
        trace!(task = %id, state = self.tasks[id.0].state.name(), "step");

        match phase {
            Phase::ResolveTarget => self.resolve_target(graph, id),
            Phase::CheckLiveData => self.check_live_data(graph, id),
            Phase::EnumerateFunctions => self.enumerate_functions(graph, id),
            Phase::NextCandidate => self.next_candidate(graph, id),
            Phase::Commit => self.commit(graph, id),
            Phase::Waiting => Ok(Step::Waiting),
            Phase::Finished => Ok(Step::Done),
        }
    }

    fn resolve_target(&mut self, graph: &mut DependencyGraph, id: TaskId) -> Result<Step, GraphError> {
        let reference = self.tasks[id.0].requirement.target.clone();
        match self.services.targets.resolve(&reference) {
            TargetLookup::Resolved(target) => {
                let digest = self.services.digests.as_ref().and_then(|d| d.digest(&target));
                let task = &mut self.tasks[id.0];
                task.target = Some(target);
                task.digest = digest;
                task.state = TaskState::CheckLiveData;
                Ok(Step::Continue)
            }
            TargetLookup::NotFound => {
                let failure = ResolutionFailure::new(self.tasks[id.0].requirement.clone(), FailureKind::UnresolvedTarget)
                    .with_detail(format!("no target for {}", reference));
                self.complete(graph, id, Err(failure))
            }
            TargetLookup::WouldBlock => Ok(Step::Blocked),
        }
    }

    fn check_live_data(&mut self, graph: &mut DependencyGraph, id: TaskId) -> Result<Step, GraphError> {
        let Some(target) = self.tasks[id.0].target.clone() else {
            self.tasks[id.0].state = TaskState::ResolveTarget;
            return Ok(Step::Continue);
        };
        let requirement = self.tasks[id.0].requirement.clone();

        if let Some(existing) =
            graph.find_satisfying(&requirement.value_name, &target.specification, &requirement.constraints)
        {
            let spec = existing.clone();
            debug!(%requirement, %spec, "reusing resolved value");
            return self.complete(graph, id, Ok(spec));
        }

        match self.services.market_data.lookup(&target, &requirement) {
            Availability::Available(available) => {
                let spec = self.source_market_data(graph, &requirement, &target, available)?;
                self.complete(graph, id, Ok(spec))
            }
            Availability::Missing => {
                let failure = ResolutionFailure::new(requirement, FailureKind::MissingMarketData);
                self.complete(graph, id, Err(failure))
            }
            Availability::WouldBlock => Ok(Step::Blocked),
            Availability::NotAvailable => {
                self.tasks[id.0].state = TaskState::EnumerateFunctions;
                Ok(Step::Continue)
            }
        }
    }

    /// Adds a market data node for `available`, wrapped in a relabeling node
    /// when `available` does not itself satisfy the requirement.
    fn source_market_data(
        &self,
        graph: &mut DependencyGraph,
        requirement: &ValueRequirement,
        target: &ComputationTarget,
        available: ValueSpecification,
    ) -> Result<ValueSpecification, GraphError> {
        if graph.node_producing(&available).is_none() {
            let node = DependencyNode::new(FunctionKind::MarketDataSource, available.target.clone())
                .with_output(available.clone());
            let node_id = graph.add_node(node)?;
            debug!(node = node_id.index(), spec = %available, "sourced market data");
        }
        if requirement.is_satisfied_by(&target.specification, &available) {
            return Ok(available);
        }

        let properties = self.services.policy.reconcile(requirement, &available);
        let relabeled = ValueSpecification::new(requirement.value_name.clone(), target.specification.clone(), properties);
        if graph.node_producing(&relabeled).is_none() {
            let node = DependencyNode::new(FunctionKind::Relabel, target.specification.clone())
                .with_input(available)
                .with_output(relabeled.clone());
            let node_id = graph.add_node(node)?;
            debug!(node = node_id.index(), spec = %relabeled, "relabeled market data");
        }
        Ok(relabeled)
    }

    /// Fills the candidate queue. Functions remembered for this target's
    /// digest are tried first, without querying the catalog; the full query
    /// runs only once those are used up, skipping the ones already tried.
    fn enumerate_functions(&mut self, graph: &mut DependencyGraph, id: TaskId) -> Result<Step, GraphError> {
        let Some(target) = self.tasks[id.0].target.clone() else {
            self.tasks[id.0].state = TaskState::ResolveTarget;
            return Ok(Step::Continue);
        };
        let requirement = self.tasks[id.0].requirement.clone();

        let tried = match self.tasks[id.0].remembered.take() {
            Some(tried) => tried,
            None => {
                let remembered = self.remembered_candidates(id, &requirement, &target);
                if !remembered.is_empty() {
                    trace!(%requirement, count = remembered.len(), "trying remembered functions");
                    let task = &mut self.tasks[id.0];
                    task.remembered = Some(remembered.iter().map(|c| c.function.function_id().to_string()).collect());
                    task.candidates = remembered.into();
                    task.state = TaskState::NextCandidate;
                    return Ok(Step::Continue);
                }
                HashSet::new()
            }
        };

        let candidates: VecDeque<CandidateFunction> = self
            .services
            .functions
            .resolve(&requirement.value_name, &target, &requirement.constraints)
            .into_iter()
            .filter(|c| !tried.contains(c.function.function_id()))
            .collect();

        if candidates.is_empty() && tried.is_empty() {
            let failure = ResolutionFailure::new(requirement, FailureKind::NoFunctions);
            return self.complete(graph, id, Err(failure));
        }

        let task = &mut self.tasks[id.0];
        task.candidates = candidates;
        task.state = TaskState::NextCandidate;
        Ok(Step::Continue)
    }

    /// Catalog candidates for functions that resolved the same value name
    /// under the same constraints on a target with this task's digest.
    fn remembered_candidates(
        &self,
        id: TaskId,
        requirement: &ValueRequirement,
        target: &ComputationTarget,
    ) -> Vec<CandidateFunction> {
        let (Some(digests), Some(digest)) = (&self.services.digests, &self.tasks[id.0].digest) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        digests
            .prior_resolutions(digest, &requirement.value_name)
            .into_iter()
            .filter(|(constraints, _)| constraints == &requirement.constraints)
            .filter(|(_, function_id)| seen.insert(function_id.clone()))
            .filter_map(|(_, function_id)| {
                self.services.functions.resolve_function(
                    &function_id,
                    &requirement.value_name,
                    target,
                    &requirement.constraints,
                )
            })
            .collect()
    }

    fn next_candidate(&mut self, graph: &mut DependencyGraph, id: TaskId) -> Result<Step, GraphError> {
        let Some(candidate) = self.tasks[id.0].candidates.pop_front() else {
            let task = &mut self.tasks[id.0];
            if task.remembered.is_some() {
                task.state = TaskState::EnumerateFunctions;
                return Ok(Step::Continue);
            }
            let failure = ResolutionFailure::exhausted(task.requirement.clone(), std::mem::take(&mut task.failures));
            return self.complete(graph, id, Err(failure));
        };
        let Some(target) = self.tasks[id.0].target.clone() else {
            self.tasks[id.0].state = TaskState::ResolveTarget;
            return Ok(Step::Continue);
        };
        let task = &self.tasks[id.0];
        let requirement = task.requirement.clone();
        let (depth, generation) = (task.depth, task.generation);
        let function_id = candidate.function.function_id().to_string();

        if !requirement.is_satisfied_by(&target.specification, &candidate.output) {
            let failure = ResolutionFailure::new(requirement, FailureKind::CouldNotResolve)
                .with_function(function_id)
                .with_detail(format!("output {} does not satisfy the requirement", candidate.output));
            self.tasks[id.0].failures.push(failure);
            return Ok(Step::Continue);
        }
        if graph.node_producing(&candidate.output).is_some() {
            return self.complete(graph, id, Ok(candidate.output));
        }

        let inputs = candidate.inputs.clone();
        let mut pending = PendingCandidate::new(candidate);
        for (slot, input) in inputs.into_iter().enumerate() {
            let waiter = Waiter::Input { task: id, slot, generation };
            match self.claim_or_attach(input, waiter, depth + 1) {
                Attach::Ready(spec) => pending.resolved[slot] = Some(spec),
                Attach::Waiting(other) => {
                    pending.outstanding += 1;
                    self.tasks[id.0].waiting_on.insert(other);
                }
                Attach::Failed(cause) => {
                    let failure = ResolutionFailure::new(requirement, FailureKind::CouldNotResolve)
                        .with_function(function_id)
                        .with_cause(cause);
                    self.tasks[id.0].abandon_candidate(failure);
                    return Ok(Step::Continue);
                }
            }
        }

        let waiting = pending.outstanding > 0;
        self.tasks[id.0].state = TaskState::ResolveInputs(pending);
        Ok(if waiting { Step::Waiting } else { Step::Continue })
    }

    fn commit(&mut self, graph: &mut DependencyGraph, id: TaskId) -> Result<Step, GraphError> {
        let task = &mut self.tasks[id.0];
        let TaskState::ResolveInputs(pending) = std::mem::replace(&mut task.state, TaskState::NextCandidate) else {
            return Ok(Step::Continue);
        };
        let Some(target) = task.target.clone() else {
            task.state = TaskState::ResolveTarget;
            return Ok(Step::Continue);
        };
        let PendingCandidate { candidate, resolved, .. } = pending;
        let output = candidate.output.clone();

        // Another task may have committed the same function meanwhile.
        if graph.node_producing(&output).is_some() {
            return self.complete(graph, id, Ok(output));
        }

        let mut node = DependencyNode::new(candidate.function.clone(), target.specification.clone());
        for spec in resolved.into_iter().flatten() {
            node.add_input(spec);
        }
        node.add_output(output.clone());
        for extra in candidate.additional_outputs {
            if graph.node_producing(&extra).is_none() {
                node.add_output(extra);
            }
        }
        let node_id = graph.add_node(node)?;
        debug!(node = node_id.index(), function = %candidate.function, spec = %output, "committed node");

        if let (Some(digests), Some(digest)) = (&self.services.digests, &self.tasks[id.0].digest) {
            if let FunctionKind::Computation { id: function_id, .. } = &candidate.function {
                let requirement = &self.tasks[id.0].requirement;
                digests.record(digest, &requirement.value_name, &requirement.constraints, function_id);
            }
        }
        self.complete(graph, id, Ok(output))
    }

    // --- Completion ---

    fn complete(&mut self, graph: &mut DependencyGraph, id: TaskId, outcome: RequirementOutcome) -> Result<Step, GraphError> {
        let task = &mut self.tasks[id.0];
        let waiters = std::mem::take(&mut task.waiters);
        task.waiting_on.clear();
        task.candidates.clear();
        task.remembered = None;
        let requirement = task.requirement.clone();

        match &outcome {
            Ok(spec) => {
                debug!(%requirement, %spec, "resolved");
                task.state = TaskState::Committed(spec.clone());
                self.claims.insert(requirement, Claim::Resolved(spec.clone()));
            }
            Err(failure) => {
                debug!(%requirement, kind = %failure.kind, "failed");
                task.state = TaskState::Failed(failure.clone());
                // Recursion depends on what else was in flight; let a later request retry.
                if failure.involves_recursion() {
                    self.claims.remove(&requirement);
                } else {
                    self.claims.insert(requirement, Claim::Failed(failure.clone()));
                }
            }
        }
        self.progress.finished.fetch_add(1, Ordering::Relaxed);

        for waiter in waiters {
            self.deliver(graph, id, waiter, &outcome)?;
        }
        Ok(Step::Done)
    }

    fn deliver(&mut self, graph: &mut DependencyGraph, from: TaskId, waiter: Waiter, outcome: &RequirementOutcome) -> Result<(), GraphError> {
        let (task, slot, generation) = match waiter {
            Waiter::Root(index) => return self.finish_root(graph, index, outcome.clone()),
            Waiter::Input { task, slot, generation } => (task, slot, generation),
        };

        let waiting = &mut self.tasks[task.0];
        if waiting.generation != generation {
            return Ok(());
        }
        let TaskState::ResolveInputs(pending) = &mut waiting.state else {
            return Ok(());
        };
        waiting.waiting_on.remove(&from);

        match outcome {
            Ok(spec) => {
                if pending.resolved[slot].is_none() {
                    pending.resolved[slot] = Some(spec.clone());
                    pending.outstanding = pending.outstanding.saturating_sub(1);
                }
                if pending.outstanding == 0 {
                    self.ready.push_back(task);
                }
            }
            Err(cause) => {
                let function_id = pending.candidate.function.function_id().to_string();
                let failure = ResolutionFailure::new(waiting.requirement.clone(), FailureKind::CouldNotResolve)
                    .with_function(function_id)
                    .with_cause(cause.clone());
                waiting.abandon_candidate(failure);
                self.ready.push_back(task);
            }
        }
        Ok(())
    }

    fn finish_root(&mut self, graph: &mut DependencyGraph, index: usize, outcome: RequirementOutcome) -> Result<(), GraphError> {
        if let Ok(spec) = &outcome {
            graph.mark_terminal(self.roots[index].requirement.clone(), spec)?;
        }
        self.roots[index].outcome = Some(outcome);
        Ok(())
    }
}
