//! Why a requirement could not be satisfied.
//!
//! Failures are data, not errors: they are recorded per requirement, chained
//! through the candidates that were tried, and reported at the end of a
//! compile without stopping sibling resolutions.

use crate::value::ValueRequirement;
use serde::Serialize;
use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FailureKind {
    /// The catalog offered no function for the value.
    NoFunctions,
    /// The value is market data that is declared missing.
    MissingMarketData,
    /// The target reference could not be resolved.
    UnresolvedTarget,
    /// Resolving would have required the requirement itself, directly or transitively.
    RecursionDetected,
    /// Every candidate was tried and none could be satisfied.
    CouldNotResolve,
    Cancelled,
}

impl FailureKind {
    /// Higher ranks carry more diagnostic value when several are recorded.
    fn rank(self) -> u8 {
        match self {
            FailureKind::NoFunctions => 5,
            FailureKind::MissingMarketData => 4,
            FailureKind::UnresolvedTarget => 3,
            FailureKind::RecursionDetected => 2,
            FailureKind::CouldNotResolve => 1,
            FailureKind::Cancelled => 0,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NoFunctions => "no functions",
            FailureKind::MissingMarketData => "missing market data",
            FailureKind::UnresolvedTarget => "unresolved target",
            FailureKind::RecursionDetected => "recursion detected",
            FailureKind::CouldNotResolve => "could not resolve",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionFailure {
    pub requirement: ValueRequirement,
    pub kind: FailureKind,
    /// The candidate function this failure rejected, if any.
    pub function: Option<String>,
    pub detail: Option<String>,
    pub causes: Vec<ResolutionFailure>,
}

impl ResolutionFailure {
    pub fn new(requirement: ValueRequirement, kind: FailureKind) -> Self {
        Self { requirement, kind, function: None, detail: None, causes: Vec::new() }
    }

    /// A requirement that ran out of candidates. The reported kind is the most
    /// informative one found among the recorded sub-failures.
    pub fn exhausted(requirement: ValueRequirement, causes: Vec<ResolutionFailure>) -> Self {
        let kind = causes
            .iter()
            .map(ResolutionFailure::richest_kind)
            .max_by_key(|k| k.rank())
            .unwrap_or(FailureKind::CouldNotResolve);
        Self { requirement, kind, function: None, detail: None, causes }
    }

    pub fn with_function(mut self, function_id: impl Into<String>) -> Self {
        self.function = Some(function_id.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_cause(mut self, cause: ResolutionFailure) -> Self {
        self.causes.push(cause);
        self
    }

    pub fn richest_kind(&self) -> FailureKind {
        self.causes
            .iter()
            .map(ResolutionFailure::richest_kind)
            .chain(std::iter::once(self.kind))
            .max_by_key(|k| k.rank())
            .unwrap_or(self.kind)
    }

    /// True if recursion contributed anywhere in the chain. Such failures
    /// depend on which tasks were in flight and are not cached.
    pub fn involves_recursion(&self) -> bool {
        self.kind == FailureKind::RecursionDetected || self.causes.iter().any(ResolutionFailure::involves_recursion)
    }

    /// Key used to group identical failures in reports.
    pub fn identity(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {}", self.kind, detail),
            None => format!("{} for {}", self.kind, self.requirement.value_name),
        }
    }

    /// Renders the chain, one failure per line, indented by depth.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out, 0);
        out
    }

    fn describe_into(&self, out: &mut String, depth: usize) {
        let _ = write!(out, "{:indent$}{}: {}", "", self.requirement, self.kind, indent = depth * 2);
        if let Some(function) = &self.function {
            let _ = write!(out, " (via {})", function);
        }
        if let Some(detail) = &self.detail {
            let _ = write!(out, " - {}", detail);
        }
        out.push('\n');
        for cause in &self.causes {
            cause.describe_into(out, depth + 1);
        }
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.requirement, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TargetSpecification;

    fn req(name: &str) -> ValueRequirement {
        ValueRequirement::new(name, TargetSpecification::security("S"))
    }

    #[test]
    fn test_exhausted_prefers_no_functions() {
        let missing = ResolutionFailure::new(req("SPOT"), FailureKind::MissingMarketData);
        let none = ResolutionFailure::new(req("CURVE"), FailureKind::NoFunctions);
        let via_f = ResolutionFailure::new(req("PV"), FailureKind::CouldNotResolve).with_function("F").with_cause(missing);
        let via_g = ResolutionFailure::new(req("PV"), FailureKind::CouldNotResolve).with_function("G").with_cause(none);

        let failure = ResolutionFailure::exhausted(req("PV"), vec![via_f, via_g]);
        assert_eq!(failure.kind, FailureKind::NoFunctions);
    }

    #[test]
    fn test_exhausted_prefers_market_data_over_generic() {
        let generic = ResolutionFailure::new(req("PV"), FailureKind::CouldNotResolve);
        let missing = ResolutionFailure::new(req("SPOT"), FailureKind::MissingMarketData);
        let failure = ResolutionFailure::exhausted(req("PV"), vec![generic, missing]);
        assert_eq!(failure.kind, FailureKind::MissingMarketData);
    }

    #[test]
    fn test_exhausted_without_causes_is_generic() {
        let failure = ResolutionFailure::exhausted(req("PV"), Vec::new());
        assert_eq!(failure.kind, FailureKind::CouldNotResolve);
        assert!(!failure.involves_recursion());
    }

    #[test]
    fn test_describe_indents_causes() {
        let failure = ResolutionFailure::new(req("PV"), FailureKind::CouldNotResolve)
            .with_function("F")
            .with_cause(ResolutionFailure::new(req("CURVE"), FailureKind::RecursionDetected));
        let text = failure.describe();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("(via F)"));
        assert!(lines[1].starts_with("  CURVE"));
        assert!(failure.involves_recursion());
    }
}
