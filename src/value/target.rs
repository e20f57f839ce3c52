//! Computation targets: the domain entities computations run against.
//!
//! The engine treats targets as opaque. It only needs a canonical identity
//! (`TargetSpecification`) to key nodes and values, and a way to refer to a
//! target before it has been resolved (`TargetReference`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetType {
    PortfolioNode,
    Position,
    Trade,
    Security,
    Primitive,
}

/// The canonical, resolved identity of a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetSpecification {
    pub kind: TargetType,
    pub id: String,
}

impl TargetSpecification {
    pub fn new(kind: TargetType, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn security(id: impl Into<String>) -> Self { Self::new(TargetType::Security, id) }
    pub fn primitive(id: impl Into<String>) -> Self { Self::new(TargetType::Primitive, id) }
    pub fn position(id: impl Into<String>) -> Self { Self::new(TargetType::Position, id) }
}

impl fmt::Display for TargetSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}~{}", self.kind, self.id)
    }
}

/// How a requirement names its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetReference {
    /// Already canonical.
    Specification(TargetSpecification),
    /// An external identifier which a `TargetResolver` must look up.
    External { kind: TargetType, external_id: String },
}

impl TargetReference {
    pub fn kind(&self) -> TargetType {
        match self {
            TargetReference::Specification(spec) => spec.kind,
            TargetReference::External { kind, .. } => *kind,
        }
    }
}

impl From<TargetSpecification> for TargetReference {
    fn from(spec: TargetSpecification) -> Self { TargetReference::Specification(spec) }
}

impl fmt::Display for TargetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetReference::Specification(spec) => spec.fmt(f),
            TargetReference::External { kind, external_id } => {
                write!(f, "{:?}?{}", kind, external_id)
            }
        }
    }
}

/// A resolved target as handed back by a `TargetResolver`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputationTarget {
    pub specification: TargetSpecification,
    /// Human readable label, used only for diagnostics.
    pub name: Option<String>,
}

impl ComputationTarget {
    pub fn new(specification: TargetSpecification) -> Self {
        Self { specification, name: None }
    }

    pub fn named(specification: TargetSpecification, name: impl Into<String>) -> Self {
        Self { specification, name: Some(name.into()) }
    }
}
