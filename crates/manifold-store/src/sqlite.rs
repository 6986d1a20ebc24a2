//! SQLite implementation of the [`VectorBackend`] contract.
//!
//! One table per collection plus a `collections` registry. Vectors are stored
//! as little-endian `f32` blobs and ranked by brute force under the metric
//! registered with the collection's index.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use manifold_core::vector::{cosine_similarity, dot, l2_distance};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;

use crate::backend::{
    CollectionSchema, Filter, IndexParams, Metric, NewRecord, Record, ScoredRecord, SearchParams,
    VectorBackend,
};
use crate::error::{Result, StoreError};
use crate::schema;

struct Inner {
    conn: Connection,
    loaded: HashSet<String>,
}

struct CollectionInfo {
    dim: usize,
    metric: Option<Metric>,
}

pub struct SqliteBackend {
    inner: Mutex<Inner>,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::initialize(&conn)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                loaded: HashSet::new(),
            }),
        })
    }
}

impl Inner {
    fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let row: Option<(i64, Option<String>)> = self
            .conn
            .query_row(
                "SELECT dim, metric FROM collections WHERE name = ?1",
                [collection],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (dim, metric) =
            row.ok_or_else(|| StoreError::CollectionMissing(collection.to_string()))?;
        Ok(CollectionInfo {
            dim: dim as usize,
            metric: metric.as_deref().and_then(Metric::parse),
        })
    }

    fn require_loaded(&self, collection: &str) -> Result<CollectionInfo> {
        let info = self.collection_info(collection)?;
        if !self.loaded.contains(collection) {
            return Err(StoreError::NotLoaded(collection.to_string()));
        }
        Ok(info)
    }

    fn select_records(
        &self,
        collection: &str,
        filter: Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let (sql, id) = match filter {
            Filter::Id(id) => (
                format!(
                    "SELECT id, pattern_vector, pattern_type, symbol, timestamp FROM {collection}
                     WHERE id = ?1 ORDER BY id LIMIT ?2"
                ),
                Some(id),
            ),
            Filter::All => (
                format!(
                    "SELECT id, pattern_vector, pattern_type, symbol, timestamp FROM {collection}
                     WHERE ?1 IS NULL ORDER BY id LIMIT ?2"
                ),
                None,
            ),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![id, limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, blob, pattern_type, symbol, timestamp)| {
                Ok(Record {
                    id,
                    pattern_vector: decode_vector(&blob)?,
                    pattern_type,
                    symbol,
                    timestamp,
                })
            })
            .collect()
    }
}

#[async_trait]
impl VectorBackend for SqliteBackend {
    async fn has_collection(&self, collection: &str) -> Result<bool> {
        let inner = self.inner.lock().await;
        let exists: Option<i64> = inner
            .conn
            .query_row(
                "SELECT 1 FROM collections WHERE name = ?1",
                [collection],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let ddl = schema::collection_ddl(schema)?;
        let dim = schema.vector_dim().ok_or_else(|| {
            StoreError::InvalidData(format!("collection '{}' has no vector field", schema.name))
        })?;
        let schema_json = serde_json::to_string(schema)
            .map_err(|e| StoreError::InvalidData(format!("schema serialization: {e}")))?;

        let inner = self.inner.lock().await;
        let tx = inner.conn.unchecked_transaction()?;
        tx.execute_batch(&ddl)?;
        tx.execute(
            "INSERT INTO collections (name, dim, schema_json) VALUES (?1, ?2, ?3)",
            params![schema.name, dim as i64, schema_json],
        )?;
        tx.commit()?;
        tracing::info!("created collection '{}' (dim {dim})", schema.name);
        Ok(())
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        metric: Metric,
        params: &IndexParams,
    ) -> Result<()> {
        let params_json = serde_json::to_string(params)
            .map_err(|e| StoreError::InvalidData(format!("index params: {e}")))?;
        let inner = self.inner.lock().await;
        inner.collection_info(collection)?;
        inner.conn.execute(
            "UPDATE collections SET metric = ?1, index_field = ?2, index_params = ?3 WHERE name = ?4",
            params![metric.as_str(), field, params_json, collection],
        )?;
        tracing::debug!(
            "indexed {collection}.{field} with {} ({})",
            params.index_type,
            metric.as_str()
        );
        Ok(())
    }

    async fn load_collection(&self, collection: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let info = inner.collection_info(collection)?;
        if info.metric.is_none() {
            return Err(StoreError::InvalidData(format!(
                "collection '{collection}' has no index; create one before loading"
            )));
        }
        inner.loaded.insert(collection.to_string());
        Ok(())
    }

    async fn insert(&self, collection: &str, record: NewRecord) -> Result<i64> {
        let inner = self.inner.lock().await;
        let info = inner.collection_info(collection)?;
        if record.pattern_vector.len() != info.dim {
            return Err(StoreError::DimensionMismatch {
                expected: info.dim,
                actual: record.pattern_vector.len(),
            });
        }
        inner.conn.execute(
            &format!(
                "INSERT INTO {collection} (pattern_vector, pattern_type, symbol, timestamp)
                 VALUES (?1, ?2, ?3, ?4)"
            ),
            params![
                encode_vector(&record.pattern_vector),
                record.pattern_type,
                record.symbol,
                record.timestamp,
            ],
        )?;
        Ok(inner.conn.last_insert_rowid())
    }

    async fn query(
        &self,
        collection: &str,
        filter: Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        let inner = self.inner.lock().await;
        inner.require_loaded(collection)?;
        inner.select_records(collection, filter, limit)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        _params: &SearchParams,
    ) -> Result<Vec<ScoredRecord>> {
        let inner = self.inner.lock().await;
        let info = inner.require_loaded(collection)?;
        if vector.len() != info.dim {
            return Err(StoreError::DimensionMismatch {
                expected: info.dim,
                actual: vector.len(),
            });
        }
        let metric = info.metric.unwrap_or_default();
        let query: Vec<f64> = vector.iter().map(|&v| v as f64).collect();

        let mut scored: Vec<ScoredRecord> = inner
            .select_records(collection, Filter::All, None)?
            .into_iter()
            .map(|record| {
                let candidate: Vec<f64> =
                    record.pattern_vector.iter().map(|&v| v as f64).collect();
                let score = match metric {
                    Metric::L2 => l2_distance(&query, &candidate),
                    Metric::Ip => dot(&query, &candidate),
                    Metric::Cosine => cosine_similarity(&query, &candidate),
                };
                ScoredRecord { record, score }
            })
            .collect();

        if metric.higher_is_nearer() {
            scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        } else {
            scored.sort_by(|a, b| a.score.total_cmp(&b.score));
        }
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, collection: &str, filter: Filter) -> Result<usize> {
        let inner = self.inner.lock().await;
        inner.collection_info(collection)?;
        let removed = match filter {
            Filter::Id(id) => inner
                .conn
                .execute(&format!("DELETE FROM {collection} WHERE id = ?1"), [id])?,
            Filter::All => inner
                .conn
                .execute(&format!("DELETE FROM {collection}"), [])?,
        };
        Ok(removed)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        inner.collection_info(collection)?;
        let n: i64 = inner.conn.query_row(
            &format!("SELECT COUNT(*) FROM {collection}"),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::InvalidData(format!(
            "vector blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
