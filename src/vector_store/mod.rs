pub mod lancedb;
pub mod memory;
pub mod pinecone;


use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::lancedb::LanceVectorStore;
pub use memory::MemoryVectorStore;
pub use pinecone::PineconeVectorStore;

use crate::config::{Config, Credentials, VectorStoreBackend};
use crate::{RagError, Result};

/// Similarity measure an index is built for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    DotProduct,
    Euclidean,
}

impl DistanceMetric {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dotproduct",
            Self::Euclidean => "euclidean",
        }
    }

    /// Scores two vectors so that higher always means closer.
    #[inline]
    pub fn similarity(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::DotProduct => dot(a, b),
            Self::Euclidean => {
                let squared: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                Self::similarity_from_squared_distance(squared)
            }
        }
    }

    #[inline]
    pub fn similarity_from_squared_distance(squared_distance: f32) -> f32 {
        1.0 / (1.0 + squared_distance.max(0.0))
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dotproduct" | "dot" => Ok(Self::DotProduct),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(RagError::Config(format!("Unknown distance metric: {other}"))),
        }
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scalar metadata value attached to a vector record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl MetadataValue {
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<usize> for MetadataValue {
    #[inline]
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata keys the index builder may write on a chunk record
pub const RECORD_METADATA_KEYS: [&str; 9] = [
    "article_id",
    "headline",
    "url",
    "chunk_index",
    "text",
    "start_offset",
    "end_offset",
    "publication_date",
    "section",
];

/// A vector with its id and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl VectorRecord {
    #[inline]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetadataValue::as_str)
    }
}

/// A query match. `record.values` is empty when the backend does not return vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

impl IndexSpec {
    #[inline]
    pub fn new(name: impl Into<String>, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
        }
    }
}

/// An index known to exist with the given spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHandle {
    pub spec: IndexSpec,
    /// Data-plane host for backends that serve each index separately
    pub host: Option<String>,
}

impl IndexHandle {
    #[inline]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.spec.dimension
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.spec.metric
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub upserted: usize,
    pub batches: usize,
}

/// Storage and nearest-neighbour search over vector records
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Opens the named index, creating it when absent.
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle>;

    /// Inserts records, replacing any with the same id.
    async fn upsert(&self, index: &IndexHandle, records: &[VectorRecord]) -> Result<UpsertSummary>;

    /// Returns at most `top_k` matches in descending similarity.
    async fn query(
        &self,
        index: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Ids of every record in the index.
    async fn list_ids(&self, index: &IndexHandle) -> Result<Vec<String>>;

    /// Removes the given records. Unknown ids are ignored.
    async fn delete(&self, index: &IndexHandle, ids: &[String]) -> Result<()>;
}

/// Builds the store selected by the configuration
#[inline]
pub async fn create_vector_store(
    config: &Config,
    credentials: &Credentials,
) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.vector_store.backend {
        VectorStoreBackend::Memory => Arc::new(MemoryVectorStore::new()),
        VectorStoreBackend::LanceDb => {
            Arc::new(LanceVectorStore::open(&config.vector_database_path()).await?)
        }
        VectorStoreBackend::Pinecone => {
            let pinecone = &config.vector_store.pinecone;
            let api_key = credentials.require(&pinecone.api_key_env)?;
            Arc::new(PineconeVectorStore::new(pinecone, api_key))
        }
    };
    Ok(store)
}

/// Fails when an existing index was built with a different dimension or metric.
#[inline]
pub fn check_existing_index(
    requested: &IndexSpec,
    existing_dimension: usize,
    existing_metric: DistanceMetric,
) -> Result<()> {
    if requested.dimension != existing_dimension || requested.metric != existing_metric {
        return Err(RagError::Config(format!(
            "Index '{}' already exists with dimension {} and metric {}, but dimension {} and metric {} were requested",
            requested.name,
            existing_dimension,
            existing_metric,
            requested.dimension,
            requested.metric
        )));
    }
    Ok(())
}

/// Validates every record before any is written.
#[inline]
pub fn validate_records(index: &IndexHandle, records: &[VectorRecord]) -> Result<()> {
    for record in records {
        if record.id.trim().is_empty() {
            return Err(RagError::VectorStore(
                "Vector record id must not be empty".to_string(),
            ));
        }
        if record.values.len() != index.dimension() {
            return Err(RagError::VectorStore(format!(
                "Record '{}' has dimension {}, index '{}' expects {}",
                record.id,
                record.values.len(),
                index.name(),
                index.dimension()
            )));
        }
        if record.values.iter().any(|v| !v.is_finite()) {
            return Err(RagError::VectorStore(format!(
                "Record '{}' contains non-finite values",
                record.id
            )));
        }
    }
    Ok(())
}

#[inline]
pub fn validate_query(index: &IndexHandle, vector: &[f32]) -> Result<()> {
    if vector.len() != index.dimension() {
        return Err(RagError::VectorStore(format!(
            "Query vector has dimension {}, index '{}' expects {}",
            vector.len(),
            index.name(),
            index.dimension()
        )));
    }
    Ok(())
}

/// Orders matches by descending score, ties broken by id.
#[inline]
pub fn rank(matches: &mut Vec<ScoredRecord>, top_k: usize) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    matches.truncate(top_k);
}
