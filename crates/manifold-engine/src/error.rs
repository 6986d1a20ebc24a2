use std::fmt;

use manifold_core::{MathError, PatternId};
use manifold_store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// A descriptor field is missing or out of range. Raised before any
    /// store call.
    Validation { field: String, reason: String },
    UnknownCommand(String),
    /// A referenced source pattern is absent from the store.
    NotFound(PatternId),
    Store(StoreError),
    /// Vector arithmetic failed (zero-norm or mismatched input).
    Normalization(MathError),
    /// Lifecycle misuse: execute twice, or undo before execute.
    InvalidState(String),
    /// An orchestrated sequence aborted at `step` (zero-based).
    Sequence { step: usize, source: Box<EngineError> },
    Cancelled,
}

impl EngineError {
    pub fn missing(field: &str) -> Self {
        EngineError::Validation {
            field: field.to_string(),
            reason: "required field is missing".to_string(),
        }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// The innermost error, looking through sequence wrappers.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::Sequence { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation { field, reason } => {
                write!(f, "validation failed for '{field}': {reason}")
            }
            EngineError::UnknownCommand(kind) => write!(f, "unknown command type: {kind}"),
            EngineError::NotFound(id) => write!(f, "pattern {id} not found"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
            EngineError::Normalization(e) => write!(f, "normalization error: {e}"),
            EngineError::InvalidState(msg) => write!(f, "invalid command state: {msg}"),
            EngineError::Sequence { step, source } => {
                write!(f, "sequence aborted at step {step}: {source}")
            }
            EngineError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            EngineError::Normalization(e) => Some(e),
            EngineError::Sequence { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

impl From<MathError> for EngineError {
    fn from(e: MathError) -> Self {
        EngineError::Normalization(e)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
