//! Runs compiled graphs through an external dispatcher.
//!
//! A graph becomes one `CalculationJob`: its nodes in execution order plus a
//! cache selection saying which produced values must be shared. The
//! dispatcher reports per-node outcomes once for the whole job; those are
//! written to an `ExecutionTracker` and complete the caller's handle.
pub mod dispatch;
pub mod executor;
pub mod job;
pub mod ledger;

pub use dispatch::{Cancelable, DispatchError, JobDispatcher, JobResultReceiver};
pub use executor::{ExecutionError, ExecutionHandle, ExecutionResult, GraphExecutor};
pub use job::{build_job, select_cache, CacheSelection, CalculationJob, ItemOutcome, ItemStatus, JobId, JobItem, JobResult};
pub use ledger::{ExecutionLedger, ExecutionTracker, NodeExecutionState};
