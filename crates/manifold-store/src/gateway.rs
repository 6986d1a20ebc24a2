//! The pattern gateway: the one place engine code touches the vector store.
//!
//! Initialization runs once per gateway (concurrent first callers share a
//! single bootstrap), every backend call is bounded by the configured
//! timeout, and records are converted to and from [`Pattern`] here.

use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use manifold_core::constants::{MAX_SYMBOL_LEN, MAX_TYPE_LEN};
use manifold_core::{DIMENSION, NORM_TOLERANCE, Pattern, PatternId, PatternType, l2_norm};
use tokio::sync::OnceCell;

use crate::backend::{
    CollectionSchema, FieldSchema, Filter, IndexParams, NewRecord, Record, SearchParams,
    VectorBackend,
};
use crate::config::{GatewayConfig, database_path};
use crate::error::{Result, StoreError};
use crate::sqlite::SqliteBackend;

pub const VECTOR_FIELD: &str = "pattern_vector";

/// The fixed pattern collection layout.
pub fn pattern_schema(collection: &str) -> CollectionSchema {
    CollectionSchema {
        name: collection.to_string(),
        fields: vec![
            FieldSchema::primary("id", "ID field"),
            FieldSchema::float_vector(
                VECTOR_FIELD,
                "Vector representation of the pattern",
                DIMENSION,
            ),
            FieldSchema::varchar("pattern_type", "Pattern type", MAX_TYPE_LEN),
            FieldSchema::varchar("symbol", "Pattern symbol", MAX_SYMBOL_LEN),
            FieldSchema::int64("timestamp", "Creation timestamp (epoch millis)"),
        ],
    }
}

pub struct PatternGateway {
    backend: Arc<dyn VectorBackend>,
    config: GatewayConfig,
    ready: OnceCell<()>,
}

impl PatternGateway {
    pub fn new(backend: Arc<dyn VectorBackend>, config: GatewayConfig) -> Self {
        Self {
            backend,
            config,
            ready: OnceCell::new(),
        }
    }

    /// Open (or create) the SQLite store under `data_dir`.
    pub fn open(data_dir: &Path, config: GatewayConfig) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            StoreError::Config(format!("cannot create {}: {e}", data_dir.display()))
        })?;
        let backend = SqliteBackend::open(&database_path(data_dir))?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn in_memory() -> Result<Self> {
        let backend = SqliteBackend::open_in_memory()?;
        Ok(Self::new(Arc::new(backend), GatewayConfig::default()))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Ensure the collection exists, is indexed, and is loaded. Runs the
    /// bootstrap at most once successfully; a failed attempt is retried by
    /// the next caller.
    pub async fn initialize(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| self.bootstrap())
            .await
            .map(|_| ())
    }

    async fn bootstrap(&self) -> Result<()> {
        let collection = self.config.collection.as_str();
        let exists = self
            .call("has_collection", self.backend.has_collection(collection))
            .await?;

        if !exists {
            tracing::info!("creating collection '{collection}'");
            let schema = pattern_schema(collection);
            self.call("create_collection", self.backend.create_collection(&schema))
                .await?;
            let params = IndexParams {
                index_type: "IVF_FLAT".to_string(),
                nlist: self.config.index_nlist,
            };
            self.call(
                "create_index",
                self.backend
                    .create_index(collection, VECTOR_FIELD, self.config.metric, &params),
            )
            .await?;
        }

        self.call("load_collection", self.backend.load_collection(collection))
            .await?;
        tracing::debug!("gateway ready on '{collection}'");
        Ok(())
    }

    /// Persist a pattern. The timestamp is assigned here; any id or
    /// timestamp on the input is ignored.
    pub async fn insert_pattern(&self, pattern: &Pattern) -> Result<PatternId> {
        validate_pattern(pattern)?;
        self.initialize().await?;
        let record = NewRecord {
            pattern_vector: pattern.vector.iter().map(|&v| v as f32).collect(),
            pattern_type: pattern.pattern_type.as_str().to_string(),
            symbol: pattern.symbol.clone(),
            timestamp: manifold_core::now_unix_millis(),
        };
        let id = self
            .call(
                "insert",
                self.backend.insert(&self.config.collection, record),
            )
            .await?;
        tracing::debug!("inserted pattern {id} ({} {})", pattern.pattern_type, pattern.symbol);
        Ok(id)
    }

    pub async fn get_pattern_by_id(&self, id: PatternId) -> Result<Option<Pattern>> {
        self.initialize().await?;
        let records = self
            .call(
                "query",
                self.backend
                    .query(&self.config.collection, Filter::Id(id), Some(1)),
            )
            .await?;
        records.into_iter().next().map(record_to_pattern).transpose()
    }

    /// Up to `top_k` stored patterns, nearest first.
    pub async fn search_similar(&self, vector: &[f64], top_k: usize) -> Result<Vec<Pattern>> {
        if vector.len() != DIMENSION {
            return Err(StoreError::DimensionMismatch {
                expected: DIMENSION,
                actual: vector.len(),
            });
        }
        self.initialize().await?;
        let query: Vec<f32> = vector.iter().map(|&v| v as f32).collect();
        let params = SearchParams {
            nprobe: self.config.search_nprobe,
        };
        let hits = self
            .call(
                "search",
                self.backend
                    .search(&self.config.collection, &query, top_k, &params),
            )
            .await?;
        hits.into_iter()
            .map(|hit| record_to_pattern(hit.record))
            .collect()
    }

    /// Remove a pattern. Deleting an id that does not exist is not an error.
    pub async fn delete_pattern(&self, id: PatternId) -> Result<()> {
        self.initialize().await?;
        let removed = self
            .call(
                "delete",
                self.backend.delete(&self.config.collection, Filter::Id(id)),
            )
            .await?;
        if removed == 0 {
            tracing::debug!("delete of pattern {id} matched nothing");
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        self.initialize().await?;
        self.call("count", self.backend.count(&self.config.collection))
            .await
    }

    /// Stored patterns in insertion order, optionally capped.
    pub async fn list_patterns(&self, limit: Option<usize>) -> Result<Vec<Pattern>> {
        self.initialize().await?;
        let records = self
            .call(
                "query",
                self.backend
                    .query(&self.config.collection, Filter::All, limit),
            )
            .await?;
        records.into_iter().map(record_to_pattern).collect()
    }

    async fn call<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let after = self.config.call_timeout();
        match tokio::time::timeout(after, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!("store call '{op}' failed: {e}");
                Err(e)
            }
            Err(_) => {
                tracing::warn!("store call '{op}' timed out after {}ms", after.as_millis());
                Err(StoreError::Timeout { op, after })
            }
        }
    }
}

fn validate_pattern(pattern: &Pattern) -> Result<()> {
    if pattern.vector.len() != DIMENSION {
        return Err(StoreError::DimensionMismatch {
            expected: DIMENSION,
            actual: pattern.vector.len(),
        });
    }
    let norm = l2_norm(&pattern.vector);
    if !norm.is_finite() || (norm - 1.0).abs() > NORM_TOLERANCE {
        return Err(StoreError::InvalidData(format!(
            "pattern vector must have unit norm, got {norm}"
        )));
    }
    let symbol_len = pattern.symbol.chars().count();
    if symbol_len == 0 || symbol_len > MAX_SYMBOL_LEN {
        return Err(StoreError::InvalidData(format!(
            "symbol must be 1..={MAX_SYMBOL_LEN} characters, got {symbol_len}"
        )));
    }
    if pattern.pattern_type.as_str().len() > MAX_TYPE_LEN {
        return Err(StoreError::InvalidData("pattern type too long".to_string()));
    }
    Ok(())
}

fn record_to_pattern(record: Record) -> Result<Pattern> {
    let pattern_type =
        PatternType::from_str(&record.pattern_type).map_err(StoreError::InvalidData)?;
    let vector: Vec<f64> = record.pattern_vector.iter().map(|&v| v as f64).collect();
    let mut pattern = Pattern::new(vector, pattern_type, record.symbol);
    pattern.id = Some(record.id);
    pattern.timestamp = Some(record.timestamp);
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use manifold_core::generate;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use crate::backend::{Metric, ScoredRecord};

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn sample(symbol: &str, rng: &mut SmallRng) -> Pattern {
        generate(PatternType::Quantum, symbol, 0.0, rng).unwrap()
    }

    /// Wraps a backend and counts collection creations.
    struct CountingBackend {
        inner: SqliteBackend,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl VectorBackend for CountingBackend {
        async fn has_collection(&self, collection: &str) -> Result<bool> {
            // Widen the race window between the existence check and creation.
            tokio::task::yield_now().await;
            self.inner.has_collection(collection).await
        }
        async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create_collection(schema).await
        }
        async fn create_index(
            &self,
            collection: &str,
            field: &str,
            metric: Metric,
            params: &IndexParams,
        ) -> Result<()> {
            self.inner.create_index(collection, field, metric, params).await
        }
        async fn load_collection(&self, collection: &str) -> Result<()> {
            self.inner.load_collection(collection).await
        }
        async fn insert(&self, collection: &str, record: NewRecord) -> Result<i64> {
            self.inner.insert(collection, record).await
        }
        async fn query(
            &self,
            collection: &str,
            filter: Filter,
            limit: Option<usize>,
        ) -> Result<Vec<Record>> {
            self.inner.query(collection, filter, limit).await
        }
        async fn search(
            &self,
            collection: &str,
            vector: &[f32],
            top_k: usize,
            params: &SearchParams,
        ) -> Result<Vec<ScoredRecord>> {
            self.inner.search(collection, vector, top_k, params).await
        }
        async fn delete(&self, collection: &str, filter: Filter) -> Result<usize> {
            self.inner.delete(collection, filter).await
        }
        async fn count(&self, collection: &str) -> Result<u64> {
            self.inner.count(collection).await
        }
    }

    /// Never answers.
    struct HangingBackend;

    #[async_trait]
    impl VectorBackend for HangingBackend {
        async fn has_collection(&self, _: &str) -> Result<bool> {
            std::future::pending().await
        }
        async fn create_collection(&self, _: &CollectionSchema) -> Result<()> {
            std::future::pending().await
        }
        async fn create_index(&self, _: &str, _: &str, _: Metric, _: &IndexParams) -> Result<()> {
            std::future::pending().await
        }
        async fn load_collection(&self, _: &str) -> Result<()> {
            std::future::pending().await
        }
        async fn insert(&self, _: &str, _: NewRecord) -> Result<i64> {
            std::future::pending().await
        }
        async fn query(&self, _: &str, _: Filter, _: Option<usize>) -> Result<Vec<Record>> {
            std::future::pending().await
        }
        async fn search(
            &self,
            _: &str,
            _: &[f32],
            _: usize,
            _: &SearchParams,
        ) -> Result<Vec<ScoredRecord>> {
            std::future::pending().await
        }
        async fn delete(&self, _: &str, _: Filter) -> Result<usize> {
            std::future::pending().await
        }
        async fn count(&self, _: &str) -> Result<u64> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let gateway = PatternGateway::in_memory().unwrap();
        let mut rng = rng();
        let pattern = sample("⦿", &mut rng);
        let id = gateway.insert_pattern(&pattern).await.unwrap();

        let stored = gateway.get_pattern_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.symbol, "⦿");
        assert_eq!(stored.pattern_type, PatternType::Quantum);
        assert_eq!(stored.vector.len(), DIMENSION);
        assert!(stored.timestamp.is_some(), "gateway assigns the timestamp");
        assert!((stored.norm() - 1.0).abs() < 1e-6);
        for (a, b) in stored.vector.iter().zip(&pattern.vector) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let gateway = PatternGateway::in_memory().unwrap();
        assert!(gateway.get_pattern_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let gateway = PatternGateway::in_memory().unwrap();
        gateway.delete_pattern(12345).await.unwrap();
        assert_eq!(gateway.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_nearest_first() {
        let gateway = PatternGateway::in_memory().unwrap();
        let mut rng = rng();
        let a = sample("a", &mut rng);
        let b = sample("b", &mut rng);
        gateway.insert_pattern(&a).await.unwrap();
        gateway.insert_pattern(&b).await.unwrap();

        let hits = gateway.search_similar(&b.vector, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "b");

        let all = gateway.search_similar(&a.vector, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].symbol, "a");
    }

    #[tokio::test]
    async fn test_insert_validation() {
        let gateway = PatternGateway::in_memory().unwrap();
        let mut rng = rng();

        let short = Pattern::new(vec![1.0; 3], PatternType::Quantum, "⦿");
        assert!(matches!(
            gateway.insert_pattern(&short).await,
            Err(StoreError::DimensionMismatch { .. })
        ));

        let mut unnormalized = sample("⦿", &mut rng);
        unnormalized.vector[0] += 1.0;
        assert!(matches!(
            gateway.insert_pattern(&unnormalized).await,
            Err(StoreError::InvalidData(_))
        ));

        let mut empty_symbol = sample("⦿", &mut rng);
        empty_symbol.symbol.clear();
        assert!(gateway.insert_pattern(&empty_symbol).await.is_err());

        let mut long_symbol = sample("⦿", &mut rng);
        long_symbol.symbol = "abcdefghi".to_string();
        assert!(gateway.insert_pattern(&long_symbol).await.is_err());

        assert_eq!(gateway.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_patterns_in_insertion_order() {
        let gateway = PatternGateway::in_memory().unwrap();
        let mut rng = rng();
        for symbol in ["a", "b", "c"] {
            gateway.insert_pattern(&sample(symbol, &mut rng)).await.unwrap();
        }
        let listed = gateway.list_patterns(Some(2)).await.unwrap();
        let symbols: Vec<_> = listed.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["a", "b"]);
        assert_eq!(gateway.list_patterns(None).await.unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initialize_creates_once() {
        let backend = Arc::new(CountingBackend {
            inner: SqliteBackend::open_in_memory().unwrap(),
            creates: AtomicUsize::new(0),
        });
        let gateway = Arc::new(PatternGateway::new(
            backend.clone(),
            GatewayConfig::default(),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move { gateway.initialize().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(backend.creates.load(Ordering::SeqCst), 1);
        assert!(gateway.is_ready());
    }

    #[tokio::test]
    async fn test_reopen_skips_creation() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut rng = rng();
        {
            let gateway = PatternGateway::open(dir.path(), GatewayConfig::default()).unwrap();
            gateway.insert_pattern(&sample("⬡", &mut rng)).await.unwrap();
        }
        let gateway = PatternGateway::open(dir.path(), GatewayConfig::default()).unwrap();
        assert_eq!(gateway.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hanging_backend_times_out() {
        let config = GatewayConfig {
            call_timeout_ms: 20,
            ..GatewayConfig::default()
        };
        let gateway = PatternGateway::new(Arc::new(HangingBackend), config);
        let err = gateway.count().await.unwrap_err();
        match err {
            StoreError::Timeout { op, after } => {
                assert_eq!(op, "has_collection");
                assert_eq!(after, Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {other}"),
        }
        assert!(!gateway.is_ready(), "failed init must not mark ready");
    }
}
