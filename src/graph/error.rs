//! Invariant violations raised by the graph model.
//!
//! None of these are caused by bad input. They indicate a defect in whatever
//! is building the graph and are propagated rather than recovered from.
use super::node::NodeId;
use crate::value::ValueSpecification;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate producer for {spec}: already produced by node {existing:?}")]
    DuplicateProducer { spec: ValueSpecification, existing: NodeId },
    #[error("No node produces {0}")]
    NoProducer(ValueSpecification),
    #[error("Cannot replace node {0:?}: it is not part of the graph")]
    ReplaceUnknownNode(NodeId),
    #[error("Node {0:?} is not part of the graph")]
    UnknownNode(NodeId),
    #[error("Cycle detected involving node {0:?}")]
    CycleDetected(NodeId),
}
