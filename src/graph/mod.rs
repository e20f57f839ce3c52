//! Defines the core data structures for the dependency graph.
pub mod dag;
pub mod error;
pub mod node;

// Re-export key types for convenient access
pub use dag::DependencyGraph;
pub use error::GraphError;
pub use node::{DependencyNode, NodeId};
