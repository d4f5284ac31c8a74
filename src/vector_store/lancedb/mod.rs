#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase, Select},
};
use tracing::{debug, info, warn};

use super::{
    DistanceMetric, IndexHandle, IndexSpec, Metadata, ScoredRecord, UpsertSummary, VectorRecord,
    VectorStore, check_existing_index, rank, validate_query, validate_records,
};
use crate::{RagError, Result};

const METRIC_KEY: &str = "distance_metric";
const CREATED_AT_KEY: &str = "created_at";
const WRITE_BATCH_SIZE: usize = 1000;

/// Vector store backed by a local LanceDB directory, one table per index
pub struct LanceVectorStore {
    connection: Connection,
}

impl LanceVectorStore {
    /// Opens (or creates) the database directory at `path`.
    #[inline]
    pub async fn open(path: &Path) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", path);

        std::fs::create_dir_all(path).map_err(|e| {
            RagError::VectorStore(format!("Failed to create vector database directory: {e}"))
        })?;

        let uri = path.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to connect to LanceDB: {e}")))?;

        info!("Vector store opened at {}", uri);
        Ok(Self { connection })
    }

    fn fields(dimension: usize) -> Vec<Field> {
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("metadata", DataType::Utf8, false),
        ]
    }

    /// Table schema; the metric is recorded in the schema metadata
    fn create_schema(spec: &IndexSpec) -> SchemaRef {
        let metadata = HashMap::from([
            (METRIC_KEY.to_string(), spec.metric.to_string()),
            (CREATED_AT_KEY.to_string(), chrono::Utc::now().to_rfc3339()),
        ]);

        Arc::new(Schema::new(Self::fields(spec.dimension)).with_metadata(metadata))
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to list tables: {e}")))?;
        Ok(table_names.iter().any(|t| t == name))
    }

    async fn open_table(&self, name: &str) -> Result<Table> {
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to open table {name}: {e}")))
    }

    /// Reads dimension and metric back from an existing table schema
    async fn describe_table(&self, table: &Table) -> Result<(usize, Option<DistanceMetric>)> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to get table schema: {e}")))?;

        let dimension = schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => Some(*size as usize),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::VectorStore(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })?;

        let metric = schema
            .metadata()
            .get(METRIC_KEY)
            .map(|m| m.parse::<DistanceMetric>())
            .transpose()?;

        Ok((dimension, metric))
    }

    /// Create a RecordBatch from vector records
    fn create_record_batch(spec: &IndexSpec, records: &[VectorRecord]) -> Result<RecordBatch> {
        let dimension = spec.dimension;
        let mut ids = Vec::with_capacity(records.len());
        let mut metadata = Vec::with_capacity(records.len());
        let mut flat_values = Vec::with_capacity(records.len() * dimension);

        for record in records {
            ids.push(record.id.as_str());
            metadata.push(serde_json::to_string(&record.metadata).map_err(|e| {
                RagError::VectorStore(format!("Failed to encode metadata of {}: {e}", record.id))
            })?);
            flat_values.extend_from_slice(&record.values);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::VectorStore(format!("Failed to create vector array: {e}")))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(metadata)),
        ];

        let schema = Arc::new(Schema::new(Self::fields(dimension)));
        RecordBatch::try_new(schema, arrays)
            .map_err(|e| RagError::VectorStore(format!("Failed to create record batch: {e}")))
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch, metric: DistanceMetric) -> Result<Vec<ScoredRecord>> {
        let ids = string_column(batch, "id")?;
        let metadata = string_column(batch, "metadata")?;
        let vectors = batch
            .column_by_name("vector")
            .and_then(|col| col.as_any().downcast_ref::<FixedSizeListArray>());
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| RagError::VectorStore("Missing _distance column".to_string()))?;

        let mut results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let parsed: Metadata = serde_json::from_str(metadata.value(row)).map_err(|e| {
                RagError::VectorStore(format!(
                    "Invalid metadata stored for {}: {e}",
                    ids.value(row)
                ))
            })?;

            let values = vectors
                .map(|list| list.value(row))
                .and_then(|values| {
                    values
                        .as_any()
                        .downcast_ref::<Float32Array>()
                        .map(|v| v.values().to_vec())
                })
                .unwrap_or_default();

            results.push(ScoredRecord {
                record: VectorRecord {
                    id: ids.value(row).to_string(),
                    values,
                    metadata: parsed,
                },
                score: similarity_from_distance(metric, distances.value(row)),
            });
        }

        Ok(results)
    }

    /// Get the number of records stored in an index
    #[inline]
    pub async fn count(&self, index: &IndexHandle) -> Result<usize> {
        let table = self.open_table(index.name()).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to count rows: {e}")))
    }

    /// Drop an index table if it exists
    #[inline]
    pub async fn drop_index(&self, name: &str) -> Result<()> {
        if self.table_exists(name).await? {
            info!("Dropping table {}", name);
            self.connection
                .drop_table(name)
                .await
                .map_err(|e| RagError::VectorStore(format!("Failed to drop table {name}: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    #[inline]
    fn backend(&self) -> &'static str {
        "lancedb"
    }

    #[inline]
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle> {
        if self.table_exists(&spec.name).await? {
            let table = self.open_table(&spec.name).await?;
            let (dimension, metric) = self.describe_table(&table).await?;
            let metric = metric.unwrap_or_else(|| {
                warn!(
                    "Table {} does not record its metric, assuming {}",
                    spec.name, spec.metric
                );
                spec.metric
            });
            check_existing_index(spec, dimension, metric)?;
            debug!("Reusing table {} ({} dimensions)", spec.name, dimension);
        } else {
            info!(
                "Creating table {} with {} dimensions ({})",
                spec.name, spec.dimension, spec.metric
            );
            self.connection
                .create_empty_table(&spec.name, Self::create_schema(spec))
                .execute()
                .await
                .map_err(|e| RagError::VectorStore(format!("Failed to create table: {e}")))?;
        }

        Ok(IndexHandle {
            spec: spec.clone(),
            host: None,
        })
    }

    #[inline]
    async fn upsert(&self, index: &IndexHandle, records: &[VectorRecord]) -> Result<UpsertSummary> {
        validate_records(index, records)?;
        if records.is_empty() {
            debug!("No records to upsert");
            return Ok(UpsertSummary::default());
        }

        let table = self.open_table(index.name()).await?;
        let mut summary = UpsertSummary::default();

        for batch in records.chunks(WRITE_BATCH_SIZE) {
            let record_batch = Self::create_record_batch(&index.spec, batch)?;
            let schema = record_batch.schema();
            let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

            let mut merge = table.merge_insert(&["id"]);
            merge
                .when_matched_update_all(None)
                .when_not_matched_insert_all();
            merge.execute(Box::new(reader)).await.map_err(|e| {
                RagError::VectorStore(format!(
                    "Upsert into {} failed after {} of {} records were written: {e}",
                    index.name(),
                    summary.upserted,
                    records.len()
                ))
            })?;

            summary.upserted += batch.len();
            summary.batches += 1;
        }

        info!(
            "Successfully upserted {} records into {}",
            summary.upserted,
            index.name()
        );
        Ok(summary)
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
        debug!("Searching {} for {} nearest records", index.name(), top_k);

        let table = self.open_table(index.name()).await?;
        let mut results = table
            .vector_search(vector)
            .map_err(|e| RagError::VectorStore(format!("Failed to create vector search: {e}")))?
            .column("vector")
            .distance_type(distance_type(index.metric()))
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to execute search: {e}")))?;

        let mut matches = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to read result stream: {e}")))?
        {
            matches.extend(Self::parse_search_batch(&batch, index.metric())?);
        }

        rank(&mut matches, top_k);
        debug!("Parsed {} search results", matches.len());
        Ok(matches)
    }

    #[inline]
    async fn list_ids(&self, index: &IndexHandle) -> Result<Vec<String>> {
        let table = self.open_table(index.name()).await?;
        let mut results = table
            .query()
            .select(Select::columns(&["id"]))
            .execute()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to list record ids: {e}")))?;

        let mut ids = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::VectorStore(format!("Failed to read result stream: {e}")))?
        {
            let column = string_column(&batch, "id")?;
            ids.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
        }
        Ok(ids)
    }

    #[inline]
    async fn delete(&self, index: &IndexHandle, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let table = self.open_table(index.name()).await?;
        for batch in ids.chunks(WRITE_BATCH_SIZE) {
            let quoted: Vec<String> = batch
                .iter()
                .map(|id| format!("'{}'", id.replace('\'', "''")))
                .collect();
            let predicate = format!("id IN ({})", quoted.join(", "));
            table.delete(&predicate).await.map_err(|e| {
                RagError::VectorStore(format!("Failed to delete records from {}: {e}", index.name()))
            })?;
        }

        info!("Deleted {} records from {}", ids.len(), index.name());
        Ok(())
    }
}

fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::DotProduct => DistanceType::Dot,
        DistanceMetric::Euclidean => DistanceType::L2,
    }
}

/// LanceDB reports `1 - cos` for cosine, `1 - dot` for dot and the squared
/// distance for L2.
fn similarity_from_distance(metric: DistanceMetric, distance: f32) -> f32 {
    match metric {
        DistanceMetric::Cosine | DistanceMetric::DotProduct => 1.0 - distance,
        DistanceMetric::Euclidean => DistanceMetric::similarity_from_squared_distance(distance),
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::VectorStore(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::VectorStore(format!("Invalid {name} column type")))
}
