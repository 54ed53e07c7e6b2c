use crate::model::NodeId;
use thiserror::Error;

/// Errors surfaced by operation validation and the query surface.
///
/// All structural errors are detected before an operation is constructed;
/// once an operation exists, its undo/redo replay cannot fail. Query errors
/// (`NotFound`) are always recoverable.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    /// A structural edit would create an illegal parent/child relationship,
    /// e.g. a non-group parent or a cycle in the group tree.
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// A key cycle fails its closure / Steiner-vertex invariant.
    #[error("invalid cycle: {0}")]
    InvalidCycle(String),

    /// An edit would leave a halfedge, endpoint, or interpolation reference
    /// pointing at a missing or kind-mismatched node.
    #[error("dangling reference to node {0:?}")]
    DanglingReference(NodeId),

    /// Query by id did not resolve to a live node.
    #[error("node {0:?} not found")]
    NotFound(NodeId),

    /// A group transform cannot be inverted within tolerance.
    #[error("transform on group {0:?} is not invertible")]
    NotInvertible(NodeId),

    /// An authored attribute with this name already exists on the node.
    #[error("attribute `{name}` already exists on node {node:?}")]
    AttributeExists { node: NodeId, name: String },

    /// An authored attribute with this name does not exist on the node.
    #[error("attribute `{name}` not found on node {node:?}")]
    AttributeNotFound { node: NodeId, name: String },
}

pub type Result<T> = std::result::Result<T, Error>;
