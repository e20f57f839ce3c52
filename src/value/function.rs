//! The closed set of function kinds a node can invoke.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity carried by nodes that source live market data.
pub const MARKET_DATA_SOURCING_FUNCTION: &str = "MarketDataSourcingFunction";
/// Identity carried by nodes that relabel a market data value.
pub const VALUE_RELABELING_FUNCTION: &str = "ValueRelabelingFunction";

pub type FunctionParameters = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    /// A catalog function performing real computation.
    Computation { id: String, parameters: FunctionParameters },
    /// A pass-through node whose output comes from the market data layer.
    MarketDataSource,
    /// Re-publishes its single input under a different specification.
    Relabel,
}

impl FunctionKind {
    pub fn computation(id: impl Into<String>) -> Self {
        FunctionKind::Computation { id: id.into(), parameters: FunctionParameters::new() }
    }

    pub fn function_id(&self) -> &str {
        match self {
            FunctionKind::Computation { id, .. } => id,
            FunctionKind::MarketDataSource => MARKET_DATA_SOURCING_FUNCTION,
            FunctionKind::Relabel => VALUE_RELABELING_FUNCTION,
        }
    }

    pub fn parameters(&self) -> Option<&FunctionParameters> {
        match self {
            FunctionKind::Computation { parameters, .. } => Some(parameters),
            _ => None,
        }
    }

    pub fn is_market_data(&self) -> bool {
        matches!(self, FunctionKind::MarketDataSource)
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_id())
    }
}
