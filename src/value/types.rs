use super::properties::ValueProperties;
use super::target::{TargetReference, TargetSpecification};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A request for a named output on a target under property constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueRequirement {
    pub value_name: String,
    pub target: TargetReference,
    pub constraints: ValueProperties,
}

impl ValueRequirement {
    pub fn new(value_name: impl Into<String>, target: impl Into<TargetReference>) -> Self {
        Self {
            value_name: value_name.into(),
            target: target.into(),
            constraints: ValueProperties::new(),
        }
    }

    pub fn with_constraints(mut self, constraints: ValueProperties) -> Self {
        self.constraints = constraints;
        self
    }

    /// True if `spec` names the same value on `target` and meets the constraints.
    pub fn is_satisfied_by(&self, target: &TargetSpecification, spec: &ValueSpecification) -> bool {
        self.value_name == spec.value_name
            && &spec.target == target
            && self.constraints.is_satisfied_by(&spec.properties)
    }
}

impl fmt::Display for ValueRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]{}", self.value_name, self.target, self.constraints)
    }
}

/// A fully resolved description of a value some node produces.
///
/// Equality is by content; this is the key for graph edges and caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueSpecification {
    pub value_name: String,
    pub target: TargetSpecification,
    pub properties: ValueProperties,
}

impl ValueSpecification {
    pub fn new(
        value_name: impl Into<String>,
        target: TargetSpecification,
        properties: ValueProperties,
    ) -> Self {
        Self { value_name: value_name.into(), target, properties }
    }
}

impl fmt::Display for ValueSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]{}", self.value_name, self.target, self.properties)
    }
}
