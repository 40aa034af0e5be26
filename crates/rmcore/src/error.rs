//! Resource manager error types

use activeobj::ActiveError;
use thiserror::Error;

use crate::node::NodeState;

/// Result type for resource manager operations
pub type Result<T> = std::result::Result<T, RmError>;

/// Resource manager errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RmError {
    /// A state change not allowed by the node state machine
    #[error("node {url}: cannot {operation} from {from}")]
    IllegalTransition {
        url: String,
        from: NodeState,
        operation: &'static str,
    },

    /// No node registered under this url
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// No node source with this name
    #[error("unknown node source: {0}")]
    UnknownSource(String),

    /// The node did not answer
    #[error("node {url} unreachable: {reason}")]
    NodeUnreachable { url: String, reason: String },

    /// A node with this url is already registered
    #[error("node already registered: {0}")]
    DuplicateNode(String),

    /// A node source with this name already exists
    #[error("node source already exists: {0}")]
    SourceExists(String),

    /// The default node source cannot be removed
    #[error("the default node source cannot be removed")]
    DefaultSourceRemoval,

    /// The resource manager is shutting down
    #[error("resource manager is shutting down")]
    ShuttingDown,

    /// A selection script could not be run
    #[error("selection script failed on {url}: {reason}")]
    Script { url: String, reason: String },

    /// Failure of the underlying active-object runtime
    #[error("active object error: {0}")]
    Active(#[from] ActiveError),
}
