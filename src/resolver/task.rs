//! task.rs
//! The resumable unit of resolution: one task per distinct requirement.

use super::failure::ResolutionFailure;
use crate::provider::{CandidateFunction, TargetDigest};
use crate::value::{ComputationTarget, ValueRequirement, ValueSpecification};
use smallvec::SmallVec;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Index of a task in the resolver's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Someone interested in a task's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Waiter {
    /// A requirement submitted by the caller, by submission index.
    Root(usize),
    /// Input `slot` of the candidate `task` was working on at `generation`.
    Input { task: TaskId, slot: usize, generation: u64 },
}

/// A candidate whose inputs are being resolved.
#[derive(Debug, Clone)]
pub(crate) struct PendingCandidate {
    pub candidate: CandidateFunction,
    pub resolved: SmallVec<[Option<ValueSpecification>; 4]>,
    pub outstanding: usize,
}

impl PendingCandidate {
    pub fn new(candidate: CandidateFunction) -> Self {
        let slots = candidate.inputs.len();
        Self { candidate, resolved: SmallVec::from_elem(None, slots), outstanding: 0 }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum TaskState {
    ResolveTarget,
    CheckLiveData,
    EnumerateFunctions,
    NextCandidate,
    ResolveInputs(PendingCandidate),
    Committed(ValueSpecification),
    Failed(ResolutionFailure),
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Committed(_) | TaskState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskState::ResolveTarget => "ResolveTarget",
            TaskState::CheckLiveData => "CheckLiveData",
            TaskState::EnumerateFunctions => "EnumerateFunctions",
            TaskState::NextCandidate => "NextCandidate",
            TaskState::ResolveInputs(_) => "ResolveInputs",
            TaskState::Committed(_) => "Committed",
            TaskState::Failed(_) => "Failed",
        }
    }
}

#[derive(Debug)]
pub(crate) struct ResolveTask {
    pub requirement: ValueRequirement,
    pub depth: usize,
    pub state: TaskState,
    pub target: Option<ComputationTarget>,
    pub digest: Option<TargetDigest>,
    pub candidates: VecDeque<CandidateFunction>,
    /// Remembered functions being tried ahead of the full catalog query.
    pub remembered: Option<HashSet<String>>,
    /// Why each rejected candidate was rejected.
    pub failures: Vec<ResolutionFailure>,
    pub waiters: Vec<Waiter>,
    /// Tasks the current candidate is waiting for.
    pub waiting_on: HashSet<TaskId>,
    /// Bumped whenever the current candidate is abandoned, invalidating its waiters.
    pub generation: u64,
}

impl ResolveTask {
    pub fn new(requirement: ValueRequirement, depth: usize) -> Self {
        Self {
            requirement,
            depth,
            state: TaskState::ResolveTarget,
            target: None,
            digest: None,
            candidates: VecDeque::new(),
            remembered: None,
            failures: Vec::new(),
            waiters: Vec::new(),
            waiting_on: HashSet::new(),
            generation: 0,
        }
    }

    /// Drops the current candidate and moves on to the next one.
    pub fn abandon_candidate(&mut self, failure: ResolutionFailure) {
        self.failures.push(failure);
        self.generation += 1;
        self.waiting_on.clear();
        self.state = TaskState::NextCandidate;
    }
}
