//! Read-only analyses over dependency graphs and execution history.
pub mod telemetry;
pub mod topology;

pub use telemetry::{ExecutionStatistics, StatisticsReport};
pub use topology::execution_order;
