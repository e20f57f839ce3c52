//! builder.rs
//! Builds the graph of a single calculation configuration.

use super::config::CompilerConfig;
use super::error::CompileError;
use super::report::FailureReport;
use crate::graph::{DependencyGraph, GraphError};
use crate::provider::ResolutionServices;
use crate::resolver::{PumpStatus, ResolutionProgress, Resolver};
use crate::validation::Validator;
use crate::value::ValueRequirement;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Every requirement has an outcome.
    Complete,
    /// Only suspended lookups remain.
    Blocked,
}

/// Waits before blocked lookups are retried. Other queued pool work is run
/// first; the thread only sleeps when there is none.
pub(crate) fn back_off(duration: Duration) {
    match rayon::yield_now() {
        Some(rayon::Yield::Executed) => {}
        Some(rayon::Yield::Idle) | None => thread::sleep(duration),
    }
}

/// Owns one graph and the resolver writing into it.
pub struct GraphBuilder {
    graph: DependencyGraph,
    resolver: Resolver,
    validate: bool,
    log_failures: bool,
}

impl GraphBuilder {
    pub fn new(calculation_configuration: impl Into<String>, services: ResolutionServices, config: &CompilerConfig) -> Self {
        Self {
            graph: DependencyGraph::new(calculation_configuration),
            resolver: Resolver::new(services, config.max_resolution_depth),
            validate: config.validate_graphs,
            log_failures: config.log_failures,
        }
    }

    pub fn with_progress(mut self, progress: Arc<ResolutionProgress>) -> Self {
        self.resolver = self.resolver.with_progress(progress);
        self
    }

    pub fn add_requirement(&mut self, requirement: ValueRequirement) -> Result<(), CompileError> {
        self.resolver
            .add_requirement(&mut self.graph, requirement)
            .map_err(|e| invariant(&self.graph, e))
    }

    pub fn graph(&self) -> &DependencyGraph { &self.graph }

    /// Pumps until no task is ready. A `Blocked` build has requeued its
    /// suspended lookups and should be advanced again after a back-off.
    pub fn advance(&mut self, cancelled: &AtomicBool) -> Result<BuildStatus, CompileError> {
        let status = self.resolver.pump(&mut self.graph, cancelled).map_err(|e| invariant(&self.graph, e))?;
        match status {
            PumpStatus::Finished => Ok(BuildStatus::Complete),
            PumpStatus::Cancelled => Err(CompileError::Cancelled),
            PumpStatus::Blocked => {
                trace!(
                    configuration = self.graph.calculation_configuration(),
                    suspended = self.resolver.suspended_count(),
                    "waiting on blocked lookups"
                );
                self.resolver.resume_suspended();
                Ok(BuildStatus::Blocked)
            }
        }
    }

    /// Prunes the graph and collects the failures of a completed build.
    pub fn finish(mut self) -> Result<(DependencyGraph, FailureReport), CompileError> {
        let configuration = self.graph.calculation_configuration().to_string();
        let mut report = FailureReport::new(configuration.clone());
        for (requirement, outcome) in self.resolver.outcomes() {
            if let Some(Err(failure)) = outcome {
                report.record(requirement.clone(), failure.clone());
            }
        }

        let pruned = self.graph.remove_unnecessary_outputs();
        if self.validate {
            Validator::new(&self.graph)
                .validate()
                .map_err(|errors| CompileError::Validation { configuration: configuration.clone(), errors })?;
        }
        if self.log_failures {
            report.log();
        }
        info!(
            configuration = %configuration,
            nodes = self.graph.size(),
            pruned,
            failures = report.len(),
            "graph built"
        );
        Ok((self.graph, report))
    }
}

fn invariant(graph: &DependencyGraph, source: GraphError) -> CompileError {
    CompileError::Graph { configuration: graph.calculation_configuration().to_string(), source }
}
