//! Operator fault type.

use thiserror::Error;

/// Fault raised from inside a method's `execute`.
///
/// Never escapes the planner loop: the single call site converts it into
/// a `Failed` operator result carrying the message.
#[derive(Debug, Error)]
pub enum MethodError {
    #[error("execute() called on compound method {0}")]
    NotPrimitive(String),

    #[error("missing required param {0:?}")]
    MissingParam(String),

    #[error("artifact {0} not found")]
    ArtifactNotFound(String),

    #[error("{0}")]
    Execution(String),
}
