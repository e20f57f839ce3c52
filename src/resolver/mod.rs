//! Turns value requirements into committed graph nodes.
//!
//! Resolution of one requirement is a resumable task moving through
//! `ResolveTarget -> CheckLiveData -> EnumerateFunctions -> ResolveInputs`
//! and ending `Committed` or `Failed`. Rejected candidates are backtracked
//! over; the failure recorded for an exhausted requirement is the most
//! informative one collected along the way.
pub mod engine;
pub mod failure;
pub mod policy;
mod task;

pub use engine::{PumpStatus, RequirementOutcome, ResolutionProgress, Resolver};
pub use failure::{FailureKind, ResolutionFailure};
pub use policy::{DefaultPropertyPolicy, PropertyPolicy};
pub use task::TaskId;
