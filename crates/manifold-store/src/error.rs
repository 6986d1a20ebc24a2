use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    InvalidData(String),
    CollectionMissing(String),
    /// The collection exists but has not been loaded for search/query.
    NotLoaded(String),
    DimensionMismatch { expected: usize, actual: usize },
    /// A backend call did not complete within the configured bound.
    Timeout { op: &'static str, after: Duration },
    Config(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            StoreError::CollectionMissing(name) => write!(f, "collection not found: {name}"),
            StoreError::NotLoaded(name) => write!(f, "collection not loaded: {name}"),
            StoreError::DimensionMismatch { expected, actual } => {
                write!(f, "vector dimension mismatch: expected {expected}, got {actual}")
            }
            StoreError::Timeout { op, after } => {
                write!(f, "store call '{op}' timed out after {}ms", after.as_millis())
            }
            StoreError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
