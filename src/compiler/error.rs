use crate::graph::GraphError;
use crate::validation::ValidationError;
use thiserror::Error;

/// Why a compilation produced no graph set.
///
/// Unsatisfiable requirements are not errors; they are listed in each
/// configuration's `FailureReport`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Compilation was cancelled")]
    Cancelled,

    #[error("Graph invariant violated while building '{configuration}': {source}")]
    Graph {
        configuration: String,
        #[source]
        source: GraphError,
    },

    #[error("Graph for '{configuration}' failed validation with {} error(s)", .errors.len())]
    Validation { configuration: String, errors: Vec<ValidationError> },

    #[error("Compilation ended without producing a result")]
    Abandoned,
}
