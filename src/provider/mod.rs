//! Collaborators consumed during graph construction.
//!
//! Everything here is opaque to the resolver: it asks questions and acts on
//! the answers. Any lookup that would need blocking I/O answers `WouldBlock`
//! instead, and the asking task is retried later.

pub mod memory;

use crate::resolver::policy::{DefaultPropertyPolicy, PropertyPolicy};
use crate::value::{ComputationTarget, FunctionKind, TargetReference, ValueProperties, ValueRequirement, ValueSpecification};
use std::sync::Arc;

/// Answer from a `TargetResolver`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetLookup {
    Resolved(ComputationTarget),
    NotFound,
    WouldBlock,
}

pub trait TargetResolver: Send + Sync {
    fn resolve(&self, reference: &TargetReference) -> TargetLookup;
}

/// Answer from a `MarketDataAvailability` provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Live data exists and is described by this specification.
    Available(ValueSpecification),
    /// Not market data; resolve through the function catalog.
    NotAvailable,
    /// Declared as market data that is missing. Not retryable.
    Missing,
    WouldBlock,
}

pub trait MarketDataAvailability: Send + Sync {
    fn lookup(&self, target: &ComputationTarget, requirement: &ValueRequirement) -> Availability;
}

/// A function able to produce a requested value, with the inputs it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFunction {
    pub function: FunctionKind,
    pub output: ValueSpecification,
    /// Other values the same invocation produces.
    pub additional_outputs: Vec<ValueSpecification>,
    pub inputs: Vec<ValueRequirement>,
}

impl CandidateFunction {
    pub fn new(function: FunctionKind, output: ValueSpecification) -> Self {
        Self { function, output, additional_outputs: Vec::new(), inputs: Vec::new() }
    }

    pub fn with_input(mut self, requirement: ValueRequirement) -> Self {
        self.inputs.push(requirement);
        self
    }

    pub fn with_additional_output(mut self, spec: ValueSpecification) -> Self {
        self.additional_outputs.push(spec);
        self
    }
}

pub trait FunctionCatalog: Send + Sync {
    /// Candidates for `value_name` on `target`, most preferred first.
    fn resolve(
        &self,
        value_name: &str,
        target: &ComputationTarget,
        constraints: &ValueProperties,
    ) -> Vec<CandidateFunction>;

    /// The candidate `function_id` offers for `value_name`, if any. Used to
    /// retry remembered functions without a full `resolve`; catalogs that can
    /// look a function up directly should override it.
    fn resolve_function(
        &self,
        function_id: &str,
        value_name: &str,
        target: &ComputationTarget,
        constraints: &ValueProperties,
    ) -> Option<CandidateFunction> {
        self.resolve(value_name, target, constraints)
            .into_iter()
            .find(|c| c.function.function_id() == function_id)
    }
}

/// A cheap structural key for a target; targets sharing a digest tend to
/// resolve the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetDigest(pub String);

/// Optional memory of past resolutions, used to try likely functions first.
pub trait TargetDigests: Send + Sync {
    fn digest(&self, target: &ComputationTarget) -> Option<TargetDigest>;

    /// Previously successful (constraints, function id) pairs for this digest.
    fn prior_resolutions(&self, digest: &TargetDigest, value_name: &str) -> Vec<(ValueProperties, String)>;

    fn record(&self, _digest: &TargetDigest, _value_name: &str, _constraints: &ValueProperties, _function_id: &str) {}
}

/// The collaborators a compilation needs, shared across worker threads.
#[derive(Clone)]
pub struct ResolutionServices {
    pub targets: Arc<dyn TargetResolver>,
    pub market_data: Arc<dyn MarketDataAvailability>,
    pub functions: Arc<dyn FunctionCatalog>,
    pub digests: Option<Arc<dyn TargetDigests>>,
    pub policy: Arc<dyn PropertyPolicy>,
}

impl ResolutionServices {
    pub fn new(
        targets: Arc<dyn TargetResolver>,
        market_data: Arc<dyn MarketDataAvailability>,
        functions: Arc<dyn FunctionCatalog>,
    ) -> Self {
        Self { targets, market_data, functions, digests: None, policy: Arc::new(DefaultPropertyPolicy) }
    }

    pub fn with_digests(mut self, digests: Arc<dyn TargetDigests>) -> Self {
        self.digests = Some(digests);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PropertyPolicy>) -> Self {
        self.policy = policy;
        self
    }
}
