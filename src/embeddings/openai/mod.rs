
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::embeddings::{Embedder, ensure_embeddings_shape, ensure_within_limit};
use crate::http::{HttpClient, Retry, join_url};
use crate::{RagError, Result};

/// Embedding client for OpenAI-compatible `/embeddings` endpoints
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    endpoint: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    max_input_chars: usize,
    http: HttpClient,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig, api_key: &str) -> Result<Self> {
        let base_url = config.base_url()?;
        if api_key.trim().is_empty() {
            return Err(RagError::Config("missing OpenAI API key".to_string()));
        }

        let http = HttpClient::new(
            Duration::from_secs(config.timeout_secs),
            config.retry_attempts,
        )
        .with_header("Authorization", &format!("Bearer {}", api_key.trim()));

        Ok(Self {
            endpoint: join_url(base_url.as_str(), "embeddings"),
            model: config.model.clone(),
            dimension: config.dimension as usize,
            batch_size: config.batch_size.max(1) as usize,
            max_input_chars: config.max_input_chars,
            http,
        })
    }

    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.http = self.http.with_backoff(backoff);
        self
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            // text-embedding-3 models can shorten their output to the index dimension
            dimensions: self
                .model
                .starts_with("text-embedding-3")
                .then_some(self.dimension),
        };

        let mut response: EmbeddingResponse = self
            .http
            .post_json(&self.endpoint, &request, Retry::Idempotent)
            .map_err(|e| RagError::Encoding(format!("OpenAI embeddings request failed: {e}")))?;

        response.data.sort_by_key(|entry| entry.index);
        let embeddings: Vec<Vec<f32>> = response
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect();

        ensure_embeddings_shape(&embeddings, texts.len(), self.dimension, &self.model)?;
        Ok(embeddings)
    }
}

impl Embedder for OpenAiEmbedder {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        ensure_within_limit(texts, self.max_input_chars, &self.model)?;

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!("Requesting {} embeddings from {}", batch.len(), self.endpoint);
            results.extend(self.embed_single_batch(batch)?);
        }
        Ok(results)
    }
}
