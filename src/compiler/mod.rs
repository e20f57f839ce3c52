//! Compiles requirements into one dependency graph per calculation configuration.
pub mod builder;
pub mod config;
pub mod error;
pub mod report;

pub use builder::{BuildStatus, GraphBuilder};
pub use config::{CompilerConfig, ConfigError};
pub use error::CompileError;
pub use report::{FailureGroup, FailureReport};

use crate::graph::DependencyGraph;
use crate::provider::{ResolutionServices, TargetLookup};
use crate::resolver::ResolutionProgress;
use crate::value::{TargetReference, TargetSpecification, ValueRequirement};
use chrono::{DateTime, Utc};
use futures::channel::oneshot;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{info, info_span, warn};

/// What to compile.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Requirements keyed by calculation configuration name.
    pub requirements: BTreeMap<String, Vec<ValueRequirement>>,
    pub valuation_time: DateTime<Utc>,
    pub portfolio: Option<TargetReference>,
}

impl CompileRequest {
    pub fn new(valuation_time: DateTime<Utc>) -> Self {
        Self { requirements: BTreeMap::new(), valuation_time, portfolio: None }
    }

    pub fn with_requirement(mut self, configuration: impl Into<String>, requirement: ValueRequirement) -> Self {
        self.requirements.entry(configuration.into()).or_default().push(requirement);
        self
    }

    pub fn with_portfolio(mut self, portfolio: impl Into<TargetReference>) -> Self {
        self.portfolio = Some(portfolio.into());
        self
    }
}

/// The result of one compile: a pruned graph and a failure report per configuration.
#[derive(Debug, Clone)]
pub struct CompiledGraphSet {
    pub initialization_id: u64,
    pub valuation_time: DateTime<Utc>,
    pub portfolio: Option<TargetSpecification>,
    graphs: BTreeMap<String, DependencyGraph>,
    failures: BTreeMap<String, FailureReport>,
}

impl CompiledGraphSet {
    pub fn graph(&self, configuration: &str) -> Option<&DependencyGraph> { self.graphs.get(configuration) }
    pub fn graphs(&self) -> impl Iterator<Item = (&str, &DependencyGraph)> {
        self.graphs.iter().map(|(k, v)| (k.as_str(), v))
    }
    pub fn failures(&self, configuration: &str) -> Option<&FailureReport> { self.failures.get(configuration) }
    pub fn configurations(&self) -> impl Iterator<Item = &str> { self.graphs.keys().map(String::as_str) }

    /// Total number of unsatisfied requirements across configurations.
    pub fn failure_count(&self) -> usize { self.failures.values().map(FailureReport::len).sum() }
}

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const COMPLETED: u8 = 2;

/// Shared between a handle and its compile. `phase` decides, exactly once,
/// whether cancellation or completion came first.
#[derive(Debug, Default)]
struct CompileState {
    phase: AtomicU8,
    /// Raised once cancellation wins; read by the resolvers.
    cancelled: AtomicBool,
    done: AtomicBool,
    progress: Arc<ResolutionProgress>,
}

impl CompileState {
    fn request_cancel(&self) -> bool {
        let won = self
            .phase
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.cancelled.store(true, Ordering::Release);
        }
        won
    }

    /// The result the handle reports: a compile cancelled before it
    /// completed reports `Cancelled` even if every graph was built.
    fn settle(&self, result: Result<CompiledGraphSet, CompileError>) -> Result<CompiledGraphSet, CompileError> {
        let settled = match self.phase.compare_exchange(RUNNING, COMPLETED, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => result,
            Err(_) => Err(CompileError::Cancelled),
        };
        self.done.store(true, Ordering::Release);
        settled
    }

    fn is_cancelled(&self) -> bool { self.phase.load(Ordering::Acquire) == CANCELLED }
}

/// A compile running on the rayon pool.
///
/// Await it, or call `wait` from synchronous code.
pub struct CompilationHandle {
    receiver: oneshot::Receiver<Result<CompiledGraphSet, CompileError>>,
    state: Arc<CompileState>,
}

impl CompilationHandle {
    /// Requests cancellation. Returns false if the compile already finished
    /// or was already cancelled. Once this returns true the handle resolves
    /// to `CompileError::Cancelled`.
    pub fn cancel(&self) -> bool { self.state.request_cancel() }

    pub fn is_done(&self) -> bool { self.state.done.load(Ordering::Acquire) }
    pub fn is_cancelled(&self) -> bool { self.state.is_cancelled() }

    /// Fraction of resolve tasks finished so far.
    pub fn estimated_completion(&self) -> f64 {
        if self.is_done() {
            1.0
        } else {
            self.state.progress.fraction()
        }
    }

    /// Blocks the calling thread until the compile ends.
    pub fn wait(self) -> Result<CompiledGraphSet, CompileError> {
        futures::executor::block_on(self)
    }
}

impl Future for CompilationHandle {
    type Output = Result<CompiledGraphSet, CompileError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(CompileError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub struct GraphCompiler {
    services: ResolutionServices,
    config: CompilerConfig,
    next_initialization: AtomicU64,
}

impl GraphCompiler {
    pub fn new(services: ResolutionServices, config: CompilerConfig) -> Self {
        Self { services, config, next_initialization: AtomicU64::new(1) }
    }

    pub fn config(&self) -> &CompilerConfig { &self.config }

    /// Starts a compile in the background.
    pub fn compile(&self, request: CompileRequest) -> CompilationHandle {
        let (sender, receiver) = oneshot::channel();
        let state = Arc::new(CompileState::default());
        let job = CompileJob {
            services: self.services.clone(),
            config: self.config.clone(),
            initialization_id: self.next_initialization.fetch_add(1, Ordering::Relaxed),
            state: Arc::clone(&state),
        };
        rayon::spawn(move || {
            let result = job.state.settle(job.run(request));
            // The handle may have been dropped.
            let _ = sender.send(result);
        });
        CompilationHandle { receiver, state }
    }

    /// Compiles on the calling thread.
    pub fn compile_now(&self, request: CompileRequest) -> Result<CompiledGraphSet, CompileError> {
        let job = CompileJob {
            services: self.services.clone(),
            config: self.config.clone(),
            initialization_id: self.next_initialization.fetch_add(1, Ordering::Relaxed),
            state: Arc::new(CompileState::default()),
        };
        job.run(request)
    }
}

struct ConfigurationBuild {
    name: String,
    span: tracing::Span,
    builder: GraphBuilder,
    complete: bool,
}

struct CompileJob {
    services: ResolutionServices,
    config: CompilerConfig,
    initialization_id: u64,
    state: Arc<CompileState>,
}

impl CompileJob {
    fn run(&self, request: CompileRequest) -> Result<CompiledGraphSet, CompileError> {
        let CompileRequest { requirements, valuation_time, portfolio } = request;
        let portfolio = match portfolio {
            Some(reference) => self.resolve_portfolio(&reference)?,
            None => None,
        };

        let mut builds = requirements
            .into_iter()
            .map(|(name, reqs)| self.start_configuration(name, reqs))
            .collect::<Result<Vec<_>, CompileError>>()?;

        // Every configuration is advanced each round, so one waiting on
        // blocked lookups never holds a worker that another could use.
        loop {
            let advance = |build: &mut ConfigurationBuild| -> Result<(), CompileError> {
                if !build.complete {
                    let _guard = build.span.enter();
                    build.complete = build.builder.advance(&self.state.cancelled)? == BuildStatus::Complete;
                }
                Ok(())
            };
            if self.config.parallel_configurations {
                builds.par_iter_mut().try_for_each(advance)?;
            } else {
                builds.iter_mut().try_for_each(advance)?;
            }
            if builds.iter().all(|build| build.complete) {
                break;
            }
            builder::back_off(self.config.blocked_retry_backoff());
        }

        let finish = |build: ConfigurationBuild| -> Result<(String, DependencyGraph, FailureReport), CompileError> {
            let _guard = build.span.enter();
            let (graph, report) = build.builder.finish()?;
            Ok((build.name, graph, report))
        };
        let built: Vec<Result<(String, DependencyGraph, FailureReport), CompileError>> =
            if self.config.parallel_configurations {
                builds.into_par_iter().map(finish).collect()
            } else {
                builds.into_iter().map(finish).collect()
            };

        let mut graphs = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for entry in built {
            let (name, graph, report) = entry?;
            graphs.insert(name.clone(), graph);
            failures.insert(name, report);
        }

        let set = CompiledGraphSet {
            initialization_id: self.initialization_id,
            valuation_time,
            portfolio,
            graphs,
            failures,
        };
        info!(
            initialization_id = set.initialization_id,
            configurations = set.graphs.len(),
            failures = set.failure_count(),
            "compile complete"
        );
        Ok(set)
    }

    fn start_configuration(&self, name: String, requirements: Vec<ValueRequirement>) -> Result<ConfigurationBuild, CompileError> {
        let span = info_span!("build", configuration = %name);
        let builder = {
            let _guard = span.enter();
            let mut builder = GraphBuilder::new(name.clone(), self.services.clone(), &self.config)
                .with_progress(Arc::clone(&self.state.progress));
            for requirement in requirements {
                builder.add_requirement(requirement)?;
            }
            builder
        };
        Ok(ConfigurationBuild { name, span, builder, complete: false })
    }

    fn resolve_portfolio(&self, reference: &TargetReference) -> Result<Option<TargetSpecification>, CompileError> {
        loop {
            if self.state.cancelled.load(Ordering::Acquire) {
                return Err(CompileError::Cancelled);
            }
            match self.services.targets.resolve(reference) {
                TargetLookup::Resolved(target) => return Ok(Some(target.specification)),
                TargetLookup::NotFound => {
                    warn!(portfolio = %reference, "portfolio could not be resolved");
                    return Ok(None);
                }
                TargetLookup::WouldBlock => builder::back_off(self.config.blocked_retry_backoff()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn empty_set() -> CompiledGraphSet {
        CompiledGraphSet {
            initialization_id: 1,
            valuation_time: Utc.with_ymd_and_hms(2024, 3, 28, 17, 0, 0).unwrap(),
            portfolio: None,
            graphs: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }

    #[test]
    fn test_cancel_before_completion_wins() {
        let state = CompileState::default();
        assert!(state.request_cancel());
        assert!(state.cancelled.load(Ordering::Acquire));

        // The build finished anyway; the accepted cancel still decides the result.
        assert!(matches!(state.settle(Ok(empty_set())), Err(CompileError::Cancelled)));
        assert!(state.is_cancelled());
        assert!(state.done.load(Ordering::Acquire));
    }

    #[test]
    fn test_cancel_after_completion_is_refused() {
        let state = CompileState::default();
        assert!(state.settle(Ok(empty_set())).is_ok());
        assert!(!state.request_cancel());
        assert!(!state.is_cancelled());
        assert!(!state.cancelled.load(Ordering::Acquire));
    }
}
