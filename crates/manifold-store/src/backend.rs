//! The external vector-store contract consumed by the gateway.
//!
//! Shapes here mirror what a similarity store exposes: collections with a
//! declared schema, an index over the vector field, an explicit load step,
//! and CRUD + top-k search over records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int64,
    FloatVector,
    VarChar,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub description: String,
    pub data_type: DataType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_id: bool,
    /// Vector fields only.
    pub dim: Option<usize>,
    /// VarChar fields only.
    pub max_length: Option<usize>,
}

impl FieldSchema {
    fn new(name: &str, description: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            data_type,
            primary_key: false,
            auto_id: false,
            dim: None,
            max_length: None,
        }
    }

    pub fn primary(name: &str, description: &str) -> Self {
        Self {
            primary_key: true,
            auto_id: true,
            ..Self::new(name, description, DataType::Int64)
        }
    }

    pub fn int64(name: &str, description: &str) -> Self {
        Self::new(name, description, DataType::Int64)
    }

    pub fn float_vector(name: &str, description: &str, dim: usize) -> Self {
        Self {
            dim: Some(dim),
            ..Self::new(name, description, DataType::FloatVector)
        }
    }

    pub fn varchar(name: &str, description: &str, max_length: usize) -> Self {
        Self {
            max_length: Some(max_length),
            ..Self::new(name, description, DataType::VarChar)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn vector_dim(&self) -> Option<usize> {
        self.fields
            .iter()
            .find(|f| f.data_type == DataType::FloatVector)
            .and_then(|f| f.dim)
    }
}

/// Similarity metric used to rank search results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Euclidean distance, smaller is nearer.
    #[default]
    L2,
    /// Inner product, larger is nearer.
    Ip,
    Cosine,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Ip => "ip",
            Self::Cosine => "cosine",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "l2" => Some(Self::L2),
            "ip" => Some(Self::Ip),
            "cosine" => Some(Self::Cosine),
            _ => None,
        }
    }

    /// True when larger scores rank first.
    pub fn higher_is_nearer(&self) -> bool {
        !matches!(self, Self::L2)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexParams {
    pub index_type: String,
    pub nlist: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub nprobe: u32,
}

/// A record to insert. The store assigns the id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRecord {
    pub pattern_vector: Vec<f32>,
    pub pattern_type: String,
    pub symbol: String,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: i64,
    pub pattern_vector: Vec<f32>,
    pub pattern_type: String,
    pub symbol: String,
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredRecord {
    pub record: Record,
    /// Metric value: distance for L2, similarity for IP/cosine.
    pub score: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    Id(i64),
    All,
}

#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn has_collection(&self, collection: &str) -> Result<bool>;

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        metric: Metric,
        params: &IndexParams,
    ) -> Result<()>;

    async fn load_collection(&self, collection: &str) -> Result<()>;

    /// Insert one record and return the store-assigned id.
    async fn insert(&self, collection: &str, record: NewRecord) -> Result<i64>;

    /// Records matching `filter`, ascending by id.
    async fn query(&self, collection: &str, filter: Filter, limit: Option<usize>)
    -> Result<Vec<Record>>;

    /// Up to `top_k` records, nearest first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        params: &SearchParams,
    ) -> Result<Vec<ScoredRecord>>;

    /// Delete matching records and return how many were removed.
    async fn delete(&self, collection: &str, filter: Filter) -> Result<usize>;

    async fn count(&self, collection: &str) -> Result<u64>;
}
