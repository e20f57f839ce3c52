//! The boundary to whatever actually runs jobs.

use super::job::{CalculationJob, JobResult};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatcher rejected the job: {0}")]
    Rejected(String),
    #[error("No execution capacity is available")]
    Unavailable,
}

/// A handle on a dispatched job.
pub trait Cancelable: Send + Sync {
    /// Attempts to stop the job. Returns true if it will not report a result.
    fn cancel(&self) -> bool;
}

/// Receives the outcome of a dispatched job, exactly once per job.
pub trait JobResultReceiver: Send + Sync {
    fn on_result(&self, result: JobResult);
}

pub trait JobDispatcher: Send + Sync {
    fn dispatch(
        &self,
        job: CalculationJob,
        receiver: Arc<dyn JobResultReceiver>,
    ) -> Result<Box<dyn Cancelable>, DispatchError>;
}
