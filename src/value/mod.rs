//! Value requirements, specifications and the types they are built from.
pub mod function;
pub mod properties;
pub mod target;
pub mod types;

pub use function::{FunctionKind, FunctionParameters, MARKET_DATA_SOURCING_FUNCTION, VALUE_RELABELING_FUNCTION};
pub use properties::{PropertyValues, ValueProperties, FUNCTION_PROPERTY};
pub use target::{ComputationTarget, TargetReference, TargetSpecification, TargetType};
pub use types::{ValueRequirement, ValueSpecification};
