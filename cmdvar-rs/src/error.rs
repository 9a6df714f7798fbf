//! Error types.
//!
//! Only [`EngineError`] ever leaves [`crate::Engine::parse`]; the others are
//! caught at the block, sandbox or middleware boundary and logged.

use crate::block::Operator;
use crate::engine::Stage;
use crate::value::Datatype;

/// Failure of the persistent store.  Not recoverable inside a parse.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid store path {0:?}")]
    InvalidPath(String),
    #[error("value at {path:?} cannot be stored: {reason}")]
    Unsupported { path: String, reason: String },
    #[error("store task failed: {0}")]
    Task(String),
}

/// Failure surfaced to the caller of `parse`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no template: engine was built without one and none was passed")]
    NoTemplate,
    #[error("store failure during {stage}: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: StoreError,
    },
}

/// Why a single block fell back.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{name}: stored {stored} does not match declared {declared}")]
    Mismatch {
        name: String,
        stored: Datatype,
        declared: Datatype,
    },
    #[error("{name}: operator `{operator}` is not supported for {datatype}")]
    Unsupported {
        name: String,
        operator: Operator,
        datatype: Datatype,
    },
    #[error("{name}: {reason}")]
    Malformed { name: String, reason: String },
    #[error("{name}: not set")]
    Missing { name: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A sandboxed expression failed to parse or evaluate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SandboxError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("{0}")]
    Eval(String),
    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
}

/// A middleware handler failed.  The chain carries on with the next one.
#[derive(Debug, thiserror::Error)]
#[error("middleware {handler}: {message}")]
pub struct MiddlewareError {
    pub handler: String,
    pub message: String,
}

impl MiddlewareError {
    pub fn new(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            message: message.into(),
        }
    }
}
