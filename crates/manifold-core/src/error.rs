use std::fmt;

/// Failures of the pure vector algebra.
#[derive(Debug, Clone, PartialEq)]
pub enum MathError {
    /// The vector has zero L2 norm and cannot be normalized.
    ZeroNorm,
    /// An operation that folds over inputs received none.
    Empty,
    DimensionMismatch { expected: usize, actual: usize },
}

impl fmt::Display for MathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathError::ZeroNorm => write!(f, "cannot normalize a zero-norm vector"),
            MathError::Empty => write!(f, "operation requires at least one vector"),
            MathError::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

impl std::error::Error for MathError {}

pub type Result<T> = std::result::Result<T, MathError>;
