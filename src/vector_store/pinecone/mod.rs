
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    DistanceMetric, IndexHandle, IndexSpec, Metadata, ScoredRecord, UpsertSummary, VectorRecord,
    VectorStore, check_existing_index, rank, validate_query, validate_records,
};
use crate::config::PineconeConfig;
use crate::http::{HttpClient, HttpError, Retry, join_url};
use crate::{RagError, Result};

const API_VERSION: &str = "2024-07";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const LIST_PAGE_SIZE: usize = 100;
const DELETE_BATCH_SIZE: usize = 1000;

/// Hosted Pinecone serverless index over the REST API
#[derive(Debug, Clone)]
pub struct PineconeVectorStore {
    control_plane_url: String,
    cloud: String,
    region: String,
    namespace: String,
    upsert_batch_size: usize,
    ready_timeout: Duration,
    poll_interval: Duration,
    http: HttpClient,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    dimension: usize,
    metric: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    serverless: CloudRegion<'a>,
}

#[derive(Debug, Serialize)]
struct CloudRegion<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedVector>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedVector {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

impl PineconeVectorStore {
    #[inline]
    pub fn new(config: &PineconeConfig, api_key: &str) -> Self {
        let http = HttpClient::new(Duration::from_secs(config.timeout_secs), config.retry_attempts)
            .with_header("Api-Key", api_key)
            .with_header("X-Pinecone-API-Version", API_VERSION);

        Self {
            control_plane_url: config.control_plane_url.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            namespace: config.namespace.clone(),
            upsert_batch_size: config.upsert_batch_size.max(1),
            ready_timeout: Duration::from_secs(config.ready_timeout_secs),
            poll_interval: DEFAULT_POLL_INTERVAL,
            http,
        }
    }

    #[inline]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.http = self.http.with_backoff(backoff);
        self
    }

    fn namespace(&self) -> Option<&str> {
        (!self.namespace.is_empty()).then_some(self.namespace.as_str())
    }

    /// Returns `None` when the index does not exist.
    fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let url = join_url(&self.control_plane_url, &format!("/indexes/{name}"));
        match self.http.get_json::<IndexDescription>(&url) {
            Ok(description) => Ok(Some(description)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(store_error(&format!("Failed to describe index {name}"), e)),
        }
    }

    /// Issues the create call once; a concurrent creation (409) is not an error.
    fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let request = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric.as_str(),
            spec: ServerlessSpec {
                serverless: CloudRegion {
                    cloud: &self.cloud,
                    region: &self.region,
                },
            },
        };
        let url = join_url(&self.control_plane_url, "/indexes");

        match self
            .http
            .post_json::<_, serde_json::Value>(&url, &request, Retry::Never)
        {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(409) => {
                warn!("Index {} was created concurrently", spec.name);
                Ok(())
            }
            Err(e) => Err(store_error(
                &format!("Failed to create index {}", spec.name),
                e,
            )),
        }
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let started = Instant::now();
        loop {
            match self.describe_index(name)? {
                Some(description) if description.status.ready => return Ok(description),
                Some(description) => {
                    debug!("Index {} is {}", name, description.status.state);
                }
                None => debug!("Index {} is not visible yet", name),
            }

            if started.elapsed() >= self.ready_timeout {
                return Err(RagError::VectorStore(format!(
                    "Index {name} was not ready after {:?}",
                    self.ready_timeout
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn data_plane_url(index: &IndexHandle, path: &str) -> Result<String> {
        let host = index.host.as_deref().ok_or_else(|| {
            RagError::VectorStore(format!("Index {} has no data-plane host", index.name()))
        })?;
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Ok(join_url(&base, path))
    }

    fn list_page_url(&self, index: &IndexHandle, token: Option<&str>) -> Result<String> {
        let base = Self::data_plane_url(index, "/vectors/list")?;
        let mut url = Url::parse(&base)
            .map_err(|e| RagError::VectorStore(format!("Invalid data-plane URL {base}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &LIST_PAGE_SIZE.to_string());
            if let Some(namespace) = self.namespace() {
                query.append_pair("namespace", namespace);
            }
            if let Some(token) = token {
                query.append_pair("paginationToken", token);
            }
        }
        Ok(url.into())
    }
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    #[inline]
    fn backend(&self) -> &'static str {
        "pinecone"
    }

    #[inline]
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<IndexHandle> {
        let description = match self.describe_index(&spec.name)? {
            Some(existing) => {
                let metric = existing.metric.parse::<DistanceMetric>()?;
                check_existing_index(spec, existing.dimension, metric)?;
                if existing.status.ready {
                    debug!("Reusing index {} at {}", spec.name, existing.host);
                    existing
                } else {
                    self.wait_until_ready(&spec.name).await?
                }
            }
            None => {
                info!(
                    "Creating index {} ({} dimensions, {}) in {}/{}",
                    spec.name, spec.dimension, spec.metric, self.cloud, self.region
                );
                self.create_index(spec)?;
                let created = self.wait_until_ready(&spec.name).await?;
                let metric = created.metric.parse::<DistanceMetric>()?;
                check_existing_index(spec, created.dimension, metric)?;
                created
            }
        };

        Ok(IndexHandle {
            spec: spec.clone(),
            host: Some(description.host),
        })
    }

    #[inline]
    async fn upsert(&self, index: &IndexHandle, records: &[VectorRecord]) -> Result<UpsertSummary> {
        validate_records(index, records)?;
        let url = Self::data_plane_url(index, "/vectors/upsert")?;
        let mut summary = UpsertSummary::default();

        for batch in records.chunks(self.upsert_batch_size) {
            let request = UpsertRequest {
                vectors: batch,
                namespace: self.namespace(),
            };
            let response: UpsertResponse = self
                .http
                .post_json(&url, &request, Retry::Idempotent)
                .map_err(|e| {
                    store_error(
                        &format!(
                            "Upsert failed after {} of {} records were written",
                            summary.upserted,
                            records.len()
                        ),
                        e,
                    )
                })?;

            if response.upserted_count != batch.len() {
                return Err(RagError::VectorStore(format!(
                    "Pinecone acknowledged {} of {} records in a batch; {} of {} records were written before it",
                    response.upserted_count,
                    batch.len(),
                    summary.upserted,
                    records.len()
                )));
            }

            summary.upserted += batch.len();
            summary.batches += 1;
            debug!(
                "Upserted batch {} ({}/{} records)",
                summary.batches,
                summary.upserted,
                records.len()
            );
        }

        info!("Upserted {} records into {}", summary.upserted, index.name());
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

        let url = Self::data_plane_url(index, "/query")?;
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace(),
        };
        let response: QueryResponse = self
            .http
            .post_json(&url, &request, Retry::Idempotent)
            .map_err(|e| store_error("Query failed", e))?;

        let metric = index.metric();
        let mut matches: Vec<ScoredRecord> = response
            .matches
            .into_iter()
            .map(|m| ScoredRecord {
                // euclidean scores come back as squared distances
                score: match metric {
                    DistanceMetric::Euclidean => {
                        DistanceMetric::similarity_from_squared_distance(m.score)
                    }
                    DistanceMetric::Cosine | DistanceMetric::DotProduct => m.score,
                },
                record: VectorRecord {
                    id: m.id,
                    values: m.values,
                    metadata: m.metadata.unwrap_or_default(),
                },
            })
            .collect();

        rank(&mut matches, top_k);
        debug!("Query returned {} matches", matches.len());
        Ok(matches)
    }

    #[inline]
    async fn list_ids(&self, index: &IndexHandle) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let url = self.list_page_url(index, token.as_deref())?;
            let page: ListResponse = self
                .http
                .get_json(&url)
                .map_err(|e| store_error(&format!("Failed to list records of {}", index.name()), e))?;
            ids.extend(page.vectors.into_iter().map(|v| v.id));

            match page.pagination.and_then(|p| p.next) {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        debug!("Listed {} records in {}", ids.len(), index.name());
        Ok(ids)
    }

    #[inline]
    async fn delete(&self, index: &IndexHandle, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let url = Self::data_plane_url(index, "/vectors/delete")?;
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let request = DeleteRequest {
                ids: batch,
                namespace: self.namespace(),
            };
            self.http
                .post_json::<_, serde_json::Value>(&url, &request, Retry::Idempotent)
                .map_err(|e| {
                    store_error(&format!("Failed to delete records from {}", index.name()), e)
                })?;
        }

        info!("Deleted {} records from {}", ids.len(), index.name());
        Ok(())
    }
}

fn store_error(context: &str, error: HttpError) -> RagError {
    RagError::VectorStore(format!("{context}: {error}"))
}
