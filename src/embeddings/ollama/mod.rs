
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::embeddings::{Embedder, ensure_embeddings_shape, ensure_within_limit};
use crate::http::{HttpClient, Retry, join_url};
use crate::{RagError, Result};

/// Embedding client for a local or remote Ollama server
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    max_input_chars: usize,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
    /// Always false: the server must refuse input beyond the model context
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config.base_url()?;

        Ok(Self {
            base_url: base_url.as_str().to_string(),
            model: config.model.clone(),
            dimension: config.dimension as usize,
            batch_size: config.batch_size.max(1) as usize,
            max_input_chars: config.max_input_chars,
            http: HttpClient::new(
                Duration::from_secs(config.timeout_secs),
                config.retry_attempts,
            ),
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    /// Test connection to Ollama server and verify model availability
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models()?;

        if models.iter().any(|m| m.name == self.model) {
            info!(
                "Health check passed for Ollama server at {} with model {}",
                self.base_url, self.model
            );
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available_models
            );
            Err(RagError::Encoding(format!(
                "Model '{}' is not available. Available models: {:?}",
                self.model, available_models
            )))
        }
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = join_url(&self.base_url, "/api/tags");
        debug!("Fetching available models from {}", url);

        let response: ModelsResponse = self
            .http
            .get_json(&url)
            .map_err(|e| RagError::Encoding(format!("Failed to fetch models: {e}")))?;

        debug!("Found {} models", response.models.len());
        Ok(response.models)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            model: &self.model,
            inputs: texts,
            truncate: false,
        };
        let url = join_url(&self.base_url, "/api/embed");

        let response: BatchEmbedResponse = self
            .http
            .post_json(&url, &request, Retry::Idempotent)
            .map_err(|e| {
                if e.status() == Some(400) {
                    RagError::Encoding(format!(
                        "{} rejected the input, it may exceed the model context length: {e}",
                        self.model
                    ))
                } else {
                    RagError::Encoding(format!(
                        "Failed to generate embeddings with {}: {e}",
                        self.model
                    ))
                }
            })?;

        ensure_embeddings_shape(
            &response.embeddings,
            texts.len(),
            self.dimension,
            &self.model,
        )?;
        Ok(response.embeddings)
    }
}

impl Embedder for OllamaEmbedder {
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
        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        // Process in batches to avoid overwhelming the server
        for batch in texts.chunks(self.batch_size) {
            results.extend(self.embed_single_batch(batch)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }
}
