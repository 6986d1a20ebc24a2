//! Persistence for manifold patterns.
//!
//! [`VectorBackend`] is the contract an external similarity store exposes;
//! [`SqliteBackend`] implements it locally. [`PatternGateway`] sits on top:
//! once-only initialization, bounded calls, and conversion to and from
//! [`manifold_core::Pattern`].

pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod schema;
pub mod sqlite;

pub use backend::{
    CollectionSchema, DataType, FieldSchema, Filter, IndexParams, Metric, NewRecord, Record,
    ScoredRecord, SearchParams, VectorBackend,
};
pub use config::{GatewayConfig, database_path, default_data_dir};
pub use error::{Result, StoreError};
pub use gateway::{PatternGateway, pattern_schema};
pub use sqlite::SqliteBackend;
