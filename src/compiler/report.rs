//! report.rs
//! Unsatisfied requirements of one compiled configuration.

use crate::resolver::{FailureKind, ResolutionFailure};
use crate::value::ValueRequirement;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Failures that share an identity, reported once with a count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureGroup {
    pub identity: String,
    pub kind: FailureKind,
    pub occurrences: usize,
    /// The first failure seen with this identity.
    pub example: ResolutionFailure,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureReport {
    calculation_configuration: String,
    failures: Vec<(ValueRequirement, ResolutionFailure)>,
}

impl FailureReport {
    pub fn new(calculation_configuration: impl Into<String>) -> Self {
        Self { calculation_configuration: calculation_configuration.into(), failures: Vec::new() }
    }

    pub fn record(&mut self, requirement: ValueRequirement, failure: ResolutionFailure) {
        self.failures.push((requirement, failure));
    }

    pub fn calculation_configuration(&self) -> &str { &self.calculation_configuration }
    pub fn is_empty(&self) -> bool { self.failures.is_empty() }
    pub fn len(&self) -> usize { self.failures.len() }

    pub fn failures(&self) -> impl Iterator<Item = (&ValueRequirement, &ResolutionFailure)> {
        self.failures.iter().map(|(r, f)| (r, f))
    }

    pub fn failure_for(&self, requirement: &ValueRequirement) -> Option<&ResolutionFailure> {
        self.failures.iter().find(|(r, _)| r == requirement).map(|(_, f)| f)
    }

    /// Groups failures by identity, most frequent first.
    pub fn summary(&self) -> Vec<FailureGroup> {
        let mut groups: BTreeMap<String, FailureGroup> = BTreeMap::new();
        for (_, failure) in &self.failures {
            let identity = failure.identity();
            groups
                .entry(identity.clone())
                .and_modify(|g| g.occurrences += 1)
                .or_insert_with(|| FailureGroup {
                    identity,
                    kind: failure.kind,
                    occurrences: 1,
                    example: failure.clone(),
                });
        }
        let mut summary: Vec<FailureGroup> = groups.into_values().collect();
        summary.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.identity.cmp(&b.identity)));
        summary
    }

    /// Logs one warning per failure group.
    pub fn log(&self) {
        for group in self.summary() {
            warn!(
                configuration = %self.calculation_configuration,
                occurrences = group.occurrences,
                "{}",
                group.identity
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TargetSpecification;

    fn req(name: &str, target: &str) -> ValueRequirement {
        ValueRequirement::new(name, TargetSpecification::security(target))
    }

    #[test]
    fn test_summary_groups_identical_failures() {
        let mut report = FailureReport::new("Default");
        for target in ["A", "B", "C"] {
            let r = req("PV", target);
            report.record(r.clone(), ResolutionFailure::new(r, FailureKind::NoFunctions));
        }
        let spot = req("SPOT", "A");
        report.record(spot.clone(), ResolutionFailure::new(spot, FailureKind::MissingMarketData));

        let summary = report.summary();
        assert_eq!(report.len(), 4);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].occurrences, 3);
        assert_eq!(summary[0].kind, FailureKind::NoFunctions);
        assert_eq!(summary[1].occurrences, 1);
    }

    #[test]
    fn test_failure_lookup_by_requirement() {
        let mut report = FailureReport::new("Default");
        let r = req("PV", "A");
        report.record(r.clone(), ResolutionFailure::new(r.clone(), FailureKind::NoFunctions));
        assert_eq!(report.failure_for(&r).map(|f| f.kind), Some(FailureKind::NoFunctions));
        assert!(report.failure_for(&req("PV", "B")).is_none());
    }
}
