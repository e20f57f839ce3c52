//! Property reconciliation when a market data value has to be relabeled to
//! satisfy a requirement.

use crate::value::{
    PropertyValues, ValueProperties, ValueRequirement, ValueSpecification, FUNCTION_PROPERTY,
    MARKET_DATA_SOURCING_FUNCTION,
};
use std::collections::BTreeSet;

/// Chooses concrete property values where a requirement allows several.
///
/// Implementations must be deterministic for identical inputs.
pub trait PropertyPolicy: Send + Sync {
    /// Picks one of `values` for the property `name`.
    fn choose<'a>(&self, name: &str, values: &'a BTreeSet<String>) -> Option<&'a str>;

    /// Properties for a relabeled copy of `available` that satisfies `requirement`.
    ///
    /// The function identity becomes the market data marker when the
    /// requirement leaves it open, is kept when the requirement names one
    /// function, and is chosen by `choose` when it names several. Other
    /// constrained properties keep the available values if those already
    /// satisfy, and are otherwise narrowed to one chosen value.
    fn reconcile(&self, requirement: &ValueRequirement, available: &ValueSpecification) -> ValueProperties {
        let mut properties = available.properties.clone();

        for (name, wanted) in requirement.constraints.iter() {
            if name == FUNCTION_PROPERTY {
                continue;
            }
            let current = available.properties.get(name);
            let reconciled = match wanted {
                PropertyValues::Wildcard => current.cloned().unwrap_or(PropertyValues::Wildcard),
                PropertyValues::Values(set) => {
                    let satisfied = ValueProperties::new()
                        .with_values(name.clone(), set.iter().cloned())
                        .is_satisfied_by(&available.properties);
                    match (satisfied, current) {
                        (true, Some(values)) => values.clone(),
                        _ => self.choose(name, set).map_or(PropertyValues::Wildcard, PropertyValues::single),
                    }
                }
            };
            properties.set(name.clone(), reconciled);
        }

        let function = match requirement.constraints.get(FUNCTION_PROPERTY) {
            None | Some(PropertyValues::Wildcard) => PropertyValues::single(MARKET_DATA_SOURCING_FUNCTION),
            Some(PropertyValues::Values(set)) if set.len() == 1 => PropertyValues::Values(set.clone()),
            Some(PropertyValues::Values(set)) => self
                .choose(FUNCTION_PROPERTY, set)
                .map_or(PropertyValues::Wildcard, PropertyValues::single),
        };
        properties.set(FUNCTION_PROPERTY, function);
        properties
    }
}

/// Picks the lowest value in lexical order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPropertyPolicy;

impl PropertyPolicy for DefaultPropertyPolicy {
    fn choose<'a>(&self, _name: &str, values: &'a BTreeSet<String>) -> Option<&'a str> {
        values.iter().next().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TargetSpecification;
    use rstest::rstest;

    fn bond() -> TargetSpecification { TargetSpecification::security("Bond7") }

    fn market_curve() -> ValueSpecification {
        ValueSpecification::new("CURVE_5PC", bond(), ValueProperties::new().with("DataSource", "Live"))
    }

    #[test]
    fn test_unconstrained_function_gets_market_data_marker() {
        let req = ValueRequirement::new("DISCOUNT_CURVE", bond());
        let props = DefaultPropertyPolicy.reconcile(&req, &market_curve());
        assert_eq!(props.get_single(FUNCTION_PROPERTY), Some(MARKET_DATA_SOURCING_FUNCTION));
        assert_eq!(props.get_single("DataSource"), Some("Live"));
    }

    #[rstest]
    #[case(&["OnlyOne"], "OnlyOne")]
    #[case(&["Zeta", "Alpha", "Mid"], "Alpha")]
    fn test_function_constraint_is_narrowed(#[case] allowed: &[&str], #[case] expected: &str) {
        let req = ValueRequirement::new("DISCOUNT_CURVE", bond())
            .with_constraints(ValueProperties::new().with_values(FUNCTION_PROPERTY, allowed.iter().copied()));
        let props = DefaultPropertyPolicy.reconcile(&req, &market_curve());
        assert_eq!(props.get_single(FUNCTION_PROPERTY), Some(expected));
        assert!(req.constraints.is_satisfied_by(&props));
    }

    #[test]
    fn test_unmet_constraint_is_narrowed_to_one_value() {
        let req = ValueRequirement::new("DISCOUNT_CURVE", bond())
            .with_constraints(ValueProperties::new().with_values("Ccy", ["USD", "EUR"]).with_any("Tenor"));
        let props = DefaultPropertyPolicy.reconcile(&req, &market_curve());
        assert_eq!(props.get_single("Ccy"), Some("EUR"));
        assert_eq!(props.get("Tenor"), Some(&PropertyValues::Wildcard));
        assert!(req.constraints.is_satisfied_by(&props));
    }

    #[test]
    fn test_policy_is_overridable() {
        struct Highest;
        impl PropertyPolicy for Highest {
            fn choose<'a>(&self, _name: &str, values: &'a BTreeSet<String>) -> Option<&'a str> {
                values.iter().next_back().map(String::as_str)
            }
        }
        let req = ValueRequirement::new("DISCOUNT_CURVE", bond())
            .with_constraints(ValueProperties::new().with_values("Ccy", ["USD", "EUR"]));
        assert_eq!(Highest.reconcile(&req, &market_curve()).get_single("Ccy"), Some("USD"));
    }
}
