//! In-memory collaborators, for embedding callers with static data and for tests.

use super::{
    Availability, CandidateFunction, FunctionCatalog, MarketDataAvailability, TargetDigest, TargetDigests,
    TargetLookup, TargetResolver,
};
use crate::value::{
    ComputationTarget, FunctionKind, PropertyValues, TargetReference, TargetSpecification, TargetType,
    ValueProperties, ValueRequirement, ValueSpecification, FUNCTION_PROPERTY,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

/// Resolves canonical references to themselves and external ids through a table.
#[derive(Debug, Default)]
pub struct InMemoryTargets {
    external: HashMap<(TargetType, String), ComputationTarget>,
}

impl InMemoryTargets {
    pub fn new() -> Self { Self::default() }

    pub fn with_external(mut self, external_id: impl Into<String>, target: ComputationTarget) -> Self {
        self.external.insert((target.specification.kind, external_id.into()), target);
        self
    }
}

impl TargetResolver for InMemoryTargets {
    fn resolve(&self, reference: &TargetReference) -> TargetLookup {
        match reference {
            TargetReference::Specification(spec) => TargetLookup::Resolved(ComputationTarget::new(spec.clone())),
            TargetReference::External { kind, external_id } => self
                .external
                .get(&(*kind, external_id.clone()))
                .cloned()
                .map_or(TargetLookup::NotFound, TargetLookup::Resolved),
        }
    }
}

/// Market data keyed by (value name, target).
#[derive(Debug, Default)]
pub struct InMemoryMarketData {
    available: HashMap<(String, TargetSpecification), ValueSpecification>,
    missing: HashSet<(String, TargetSpecification)>,
}

impl InMemoryMarketData {
    pub fn new() -> Self { Self::default() }

    /// Requests for `value_name` on `target` are served by `spec`.
    pub fn with_available(mut self, value_name: impl Into<String>, target: TargetSpecification, spec: ValueSpecification) -> Self {
        self.available.insert((value_name.into(), target), spec);
        self
    }

    /// Declares `value_name` on `target` as market data that cannot be sourced.
    pub fn with_missing(mut self, value_name: impl Into<String>, target: TargetSpecification) -> Self {
        self.missing.insert((value_name.into(), target));
        self
    }
}

impl MarketDataAvailability for InMemoryMarketData {
    fn lookup(&self, target: &ComputationTarget, requirement: &ValueRequirement) -> Availability {
        let key = (requirement.value_name.clone(), target.specification.clone());
        if let Some(spec) = self.available.get(&key) {
            Availability::Available(spec.clone())
        } else if self.missing.contains(&key) {
            Availability::Missing
        } else {
            Availability::NotAvailable
        }
    }
}

/// A catalog entry: a function producing one value name from inputs on the same target.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub function: FunctionKind,
    pub value_name: String,
    pub target_type: Option<TargetType>,
    pub properties: ValueProperties,
    /// (value name, constraints) of each input, requested on the same target.
    pub inputs: Vec<(String, ValueProperties)>,
    pub additional_outputs: Vec<(String, ValueProperties)>,
    pub priority: i32,
}

impl CatalogEntry {
    pub fn new(function_id: impl Into<String>, value_name: impl Into<String>) -> Self {
        Self {
            function: FunctionKind::computation(function_id),
            value_name: value_name.into(),
            target_type: None,
            properties: ValueProperties::new(),
            inputs: Vec::new(),
            additional_outputs: Vec::new(),
            priority: 0,
        }
    }

    pub fn with_properties(mut self, properties: ValueProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_input(mut self, value_name: impl Into<String>) -> Self {
        self.inputs.push((value_name.into(), ValueProperties::new()));
        self
    }

    pub fn with_constrained_input(mut self, value_name: impl Into<String>, constraints: ValueProperties) -> Self {
        self.inputs.push((value_name.into(), constraints));
        self
    }

    pub fn with_additional_output(mut self, value_name: impl Into<String>) -> Self {
        self.additional_outputs.push((value_name.into(), ValueProperties::new()));
        self
    }

    pub fn for_target_type(mut self, target_type: TargetType) -> Self {
        self.target_type = Some(target_type);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn candidate(&self, target: &ComputationTarget) -> CandidateFunction {
        let spec = &target.specification;
        let mut properties = self.properties.clone();
        properties.set(FUNCTION_PROPERTY, PropertyValues::single(self.function.function_id()));
        let mut candidate = CandidateFunction::new(
            self.function.clone(),
            ValueSpecification::new(self.value_name.clone(), spec.clone(), properties),
        );
        for (name, constraints) in &self.inputs {
            candidate = candidate.with_input(
                ValueRequirement::new(name.clone(), spec.clone()).with_constraints(constraints.clone()),
            );
        }
        for (name, props) in &self.additional_outputs {
            let mut props = props.clone();
            props.set(FUNCTION_PROPERTY, PropertyValues::single(self.function.function_id()));
            candidate = candidate.with_additional_output(ValueSpecification::new(name.clone(), spec.clone(), props));
        }
        candidate
    }
}

/// Candidates are returned by descending priority, then registration order.
#[derive(Debug, Default)]
pub struct InMemoryFunctionCatalog {
    entries: Vec<CatalogEntry>,
}

impl InMemoryFunctionCatalog {
    pub fn new() -> Self { Self::default() }

    pub fn with_entry(mut self, entry: CatalogEntry) -> Self {
        self.entries.push(entry);
        self
    }
}

impl FunctionCatalog for InMemoryFunctionCatalog {
    fn resolve(&self, value_name: &str, target: &ComputationTarget, constraints: &ValueProperties) -> Vec<CandidateFunction> {
        let mut matching: Vec<&CatalogEntry> = self
            .entries
            .iter()
            .filter(|e| e.value_name == value_name)
            .filter(|e| e.target_type.map_or(true, |t| t == target.specification.kind))
            .collect();
        // Stable sort keeps registration order within a priority.
        matching.sort_by_key(|e| std::cmp::Reverse(e.priority));
        matching
            .into_iter()
            .map(|e| e.candidate(target))
            .filter(|c| constraints.is_satisfied_by(&c.output.properties))
            .collect()
    }

    fn resolve_function(
        &self,
        function_id: &str,
        value_name: &str,
        target: &ComputationTarget,
        constraints: &ValueProperties,
    ) -> Option<CandidateFunction> {
        self.entries
            .iter()
            .filter(|e| e.function.function_id() == function_id && e.value_name == value_name)
            .filter(|e| e.target_type.map_or(true, |t| t == target.specification.kind))
            .map(|e| e.candidate(target))
            .find(|c| constraints.is_satisfied_by(&c.output.properties))
    }
}

/// Digests targets by type and remembers what resolved for each digest.
#[derive(Debug, Default)]
pub struct InMemoryDigests {
    resolutions: Mutex<HashMap<(TargetDigest, String), Vec<(ValueProperties, String)>>>,
}

impl InMemoryDigests {
    pub fn new() -> Self { Self::default() }
}

impl TargetDigests for InMemoryDigests {
    fn digest(&self, target: &ComputationTarget) -> Option<TargetDigest> {
        Some(TargetDigest(format!("{:?}", target.specification.kind)))
    }

    fn prior_resolutions(&self, digest: &TargetDigest, value_name: &str) -> Vec<(ValueProperties, String)> {
        let map = self.resolutions.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(&(digest.clone(), value_name.to_string())).cloned().unwrap_or_default()
    }

    fn record(&self, digest: &TargetDigest, value_name: &str, constraints: &ValueProperties, function_id: &str) {
        let mut map = self.resolutions.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = map.entry((digest.clone(), value_name.to_string())).or_default();
        let pair = (constraints.clone(), function_id.to_string());
        if !entry.contains(&pair) {
            entry.push(pair);
        }
    }
}
