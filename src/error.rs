//! Error types for graph construction and walk generation.

use crate::graph::{LabelId, NodeId};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WalkError>;

#[derive(Debug, Error)]
pub enum WalkError {
    /// A node id was never issued by the graph (or builder) it was used with.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// A start label that does not tag any edge.
    #[error("unknown start label: {0}")]
    UnknownLabel(LabelId),

    /// The graph or the policy reached a state that cannot occur on a
    /// well-formed graph. Aborts the whole batch.
    #[error("invariant violation at node {node}: {message}")]
    InvariantViolation { node: NodeId, message: String },

    /// A `call` edge whose source never received a `ret` edge.
    #[error("call edge {source_name} -> {target_name} has no return node")]
    MissingReturnNode {
        source_name: String,
        target_name: String,
    },

    /// More nodes or labels than 32-bit ids can address.
    #[error("too many {0}: ids are 32-bit")]
    CapacityExceeded(&'static str),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The batch was cancelled before all rounds were dispatched.
    #[error("batch cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("edge list parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WalkError {
    pub(crate) fn invariant(node: NodeId, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            node,
            message: message.into(),
        }
    }
}
