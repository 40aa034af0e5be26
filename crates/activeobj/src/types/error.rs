//! Dispatch engine error types

use thiserror::Error;

use super::identifiers::{BodyId, FutureId};

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, ActiveError>;

/// Errors raised while sending, executing or awaiting a request.
///
/// The type is `Clone` because a resolved future hands the same outcome to
/// every reader.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActiveError {
    /// The request could not be delivered to its destination
    #[error("communication failure towards body {destination}: {reason}")]
    Communication { destination: BodyId, reason: String },

    /// The target method raised an error while executing
    #[error("{kind}: {message}")]
    Raised { kind: String, message: String },

    /// No body is registered under this identity
    #[error("body not found: {0}")]
    BodyNotFound(BodyId),

    /// The body was terminated before serving the request
    #[error("body terminated: {0}")]
    BodyTerminated(BodyId),

    /// A sterile request tried to reach a body other than itself or its parent
    #[error("sterile request from {source_body} may not call {destination}")]
    SterileViolation { source_body: BodyId, destination: BodyId },

    /// Unknown method name on the interface
    #[error("method not found: {interface}::{method}")]
    MethodNotFound { interface: String, method: String },

    /// Wrong argument count
    #[error("method {method} expects {expected} arguments, got {got}")]
    ArityMismatch { method: String, expected: usize, got: usize },

    /// Argument of the wrong type
    #[error("method {method} argument {index}: expected {expected}, got {got}")]
    TypeMismatch { method: String, index: usize, expected: String, got: String },

    /// Relocating a body failed
    #[error("migration of body {body} failed: {reason}")]
    MigrationFailed { body: BodyId, reason: String },
}

impl ActiveError {
    /// Build a target execution failure from an error kind and message
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Build a communication failure
    pub fn communication(destination: BodyId, reason: impl Into<String>) -> Self {
        Self::Communication {
            destination,
            reason: reason.into(),
        }
    }

    /// Whether a Standard send may retry after this error
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication { .. })
    }
}

/// A bounded wait on a future elapsed before it was resolved
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("future {0} still pending after timeout")]
pub struct FutureTimeout(pub FutureId);

/// Outcome of waiting on a set of futures when none could be reported
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitAnyError {
    /// No futures were given
    #[error("no futures to wait for")]
    Empty,

    /// None of the futures resolved in time
    #[error("no future resolved before the timeout")]
    Timeout,
}
