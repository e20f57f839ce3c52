//! Property sets attached to requirements (as constraints) and to
//! specifications (as resolved properties).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Name of the property carrying the identity of the producing function.
pub const FUNCTION_PROPERTY: &str = "Function";

/// The values a single property may take.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertyValues {
    /// Any value is acceptable (constraint) or can be produced (specification).
    Wildcard,
    /// A non-empty set of explicit values.
    Values(BTreeSet<String>),
}

impl PropertyValues {
    pub fn single(value: impl Into<String>) -> Self {
        PropertyValues::Values(BTreeSet::from([value.into()]))
    }

    /// Returns the only value if exactly one is declared.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            PropertyValues::Values(v) if v.len() == 1 => v.iter().next().map(String::as_str),
            _ => None,
        }
    }

    /// Can a producer declaring `self` satisfy a consumer asking for `wanted`?
    fn satisfies(&self, wanted: &PropertyValues) -> bool {
        match (wanted, self) {
            (PropertyValues::Wildcard, _) => true,
            (_, PropertyValues::Wildcard) => true,
            (PropertyValues::Values(w), PropertyValues::Values(have)) => !w.is_disjoint(have),
        }
    }
}

/// An ordered property map. Ordering makes hashing, equality and display stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueProperties {
    props: BTreeMap<String, PropertyValues>,
}

impl ValueProperties {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(name.into(), PropertyValues::single(value));
        self
    }

    pub fn with_values<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if set.is_empty() {
            self.props.insert(name.into(), PropertyValues::Wildcard);
        } else {
            self.props.insert(name.into(), PropertyValues::Values(set));
        }
        self
    }

    pub fn with_any(mut self, name: impl Into<String>) -> Self {
        self.props.insert(name.into(), PropertyValues::Wildcard);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, values: PropertyValues) {
        self.props.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValues> { self.props.get(name) }

    pub fn get_single(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(PropertyValues::as_single)
    }

    pub fn is_empty(&self) -> bool { self.props.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValues)> {
        self.props.iter()
    }

    /// True if every constraint in `self` is met by `properties`.
    ///
    /// A constrained name must be defined on the producer side. Explicit value
    /// sets must intersect, unless the producer declares a wildcard.
    pub fn is_satisfied_by(&self, properties: &ValueProperties) -> bool {
        self.props.iter().all(|(name, wanted)| {
            properties
                .props
                .get(name)
                .is_some_and(|have| have.satisfies(wanted))
        })
    }
}

impl fmt::Display for ValueProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, values)) in self.props.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            match values {
                PropertyValues::Wildcard => write!(f, "{}=*", name)?,
                PropertyValues::Values(v) => {
                    let joined = v.iter().map(String::as_str).collect::<Vec<_>>().join("|");
                    write!(f, "{}={}", name, joined)?;
                }
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn props(pairs: &[(&str, &str)]) -> ValueProperties {
        pairs.iter().fold(ValueProperties::new(), |acc, (k, v)| acc.with(*k, *v))
    }

    #[rstest]
    #[case(ValueProperties::new(), props(&[]), true)]
    #[case(ValueProperties::new(), props(&[("Ccy", "USD")]), true)]
    #[case(props(&[("Ccy", "USD")]), props(&[("Ccy", "USD")]), true)]
    #[case(props(&[("Ccy", "USD")]), props(&[("Ccy", "EUR")]), false)]
    #[case(props(&[("Ccy", "USD")]), props(&[]), false)]
    #[case(ValueProperties::new().with_any("Ccy"), props(&[("Ccy", "EUR")]), true)]
    #[case(props(&[("Ccy", "USD")]), ValueProperties::new().with_any("Ccy"), true)]
    #[case(ValueProperties::new().with_values("Ccy", ["USD", "EUR"]), props(&[("Ccy", "EUR")]), true)]
    fn test_constraint_satisfaction(
        #[case] constraints: ValueProperties,
        #[case] available: ValueProperties,
        #[case] expected: bool,
    ) {
        assert_eq!(constraints.is_satisfied_by(&available), expected);
    }

    #[test]
    fn test_display_is_ordered() {
        let p = ValueProperties::new().with("b", "2").with("a", "1").with_any("c");
        assert_eq!(p.to_string(), "{a=1, b=2, c=*}");
    }

    #[test]
    fn test_empty_value_list_means_wildcard() {
        let p = ValueProperties::new().with_values("Curve", Vec::<String>::new());
        assert_eq!(p.get("Curve"), Some(&PropertyValues::Wildcard));
    }
}
