#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    IndexHandle, IndexSpec, ScoredRecord, UpsertSummary, VectorRecord, VectorStore,
    check_existing_index, rank, validate_query, validate_records,
};
use crate::{RagError, Result};

/// In-process store with exact (brute force) search
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    indexes: RwLock<HashMap<String, MemoryIndex>>,
}

#[derive(Debug)]
struct MemoryIndex {
    spec: IndexSpec,
    records: BTreeMap<String, VectorRecord>,
}

impl MemoryVectorStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub async fn len(&self, index: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(index)
            .map_or(0, |i| i.records.len())
    }

    #[inline]
    pub async fn is_empty(&self, index: &str) -> bool {
        self.len(index).await == 0
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    #[inline]
    fn backend(&self) -> &'static str {
        "memory"
    }

    #[inline]
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle> {
        let mut indexes = self.indexes.write().await;

        if let Some(existing) = indexes.get(&spec.name) {
            check_existing_index(spec, existing.spec.dimension, existing.spec.metric)?;
            debug!("Reusing in-memory index {}", spec.name);
        } else {
            info!(
                "Creating in-memory index {} ({} dimensions, {})",
                spec.name, spec.dimension, spec.metric
            );
            indexes.insert(
                spec.name.clone(),
                MemoryIndex {
                    spec: spec.clone(),
                    records: BTreeMap::new(),
                },
            );
        }

        Ok(IndexHandle {
            spec: spec.clone(),
            host: None,
        })
    }

    #[inline]
    async fn upsert(&self, index: &IndexHandle, records: &[VectorRecord]) -> Result<UpsertSummary> {
        validate_records(index, records)?;

        let mut indexes = self.indexes.write().await;
        let stored = indexes
            .get_mut(index.name())
            .ok_or_else(|| RagError::VectorStore(format!("Index '{}' does not exist", index.name())))?;

        for record in records {
            stored.records.insert(record.id.clone(), record.clone());
        }

        debug!("Upserted {} records into {}", records.len(), index.name());
        Ok(UpsertSummary {
            upserted: records.len(),
            batches: usize::from(!records.is_empty()),
        })
    }

    #[inline]
    async fn query(
        &self,
        index: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        validate_query(index, vector)?;

        let indexes = self.indexes.read().await;
        let stored = indexes
            .get(index.name())
            .ok_or_else(|| RagError::VectorStore(format!("Index '{}' does not exist", index.name())))?;

        let metric = stored.spec.metric;
        let mut matches: Vec<ScoredRecord> = stored
            .records
            .values()
            .map(|record| ScoredRecord {
                score: metric.similarity(vector, &record.values),
                record: record.clone(),
            })
            .collect();

        rank(&mut matches, top_k);
        Ok(matches)
    }

    #[inline]
    async fn list_ids(&self, index: &IndexHandle) -> Result<Vec<String>> {
        let indexes = self.indexes.read().await;
        let stored = indexes
            .get(index.name())
            .ok_or_else(|| RagError::VectorStore(format!("Index '{}' does not exist", index.name())))?;
        Ok(stored.records.keys().cloned().collect())
    }

    #[inline]
    async fn delete(&self, index: &IndexHandle, ids: &[String]) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        let stored = indexes
            .get_mut(index.name())
            .ok_or_else(|| RagError::VectorStore(format!("Index '{}' does not exist", index.name())))?;

        let before = stored.records.len();
        for id in ids {
            stored.records.remove(id);
        }
        debug!(
            "Deleted {} records from {}",
            before - stored.records.len(),
            index.name()
        );
        Ok(())
    }
}
