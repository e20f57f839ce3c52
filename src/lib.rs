//! Dependency-graph construction and execution for calculation engines.
//!
//! Value requirements are resolved against market data and a function
//! catalog into a DAG of function invocations per calculation configuration
//! (`compiler`, `resolver`, `graph`). Compiled graphs are then dispatched as
//! ordered jobs and their per-node outcomes tracked (`execution`).

pub mod analysis;
pub mod compiler;
pub mod display;
pub mod execution;
pub mod graph;
pub mod provider;
pub mod resolver;
pub mod validation;
pub mod value;

pub use compiler::{CompilationHandle, CompileError, CompileRequest, CompiledGraphSet, CompilerConfig, GraphCompiler};
pub use execution::{ExecutionError, ExecutionHandle, ExecutionResult, GraphExecutor};
pub use graph::{DependencyGraph, DependencyNode, GraphError, NodeId};
pub use provider::ResolutionServices;
pub use resolver::{FailureKind, ResolutionFailure};
pub use value::{ValueProperties, ValueRequirement, ValueSpecification};
