pub mod chunking;
pub mod hashing;
pub mod ollama;
pub mod openai;


use std::sync::Arc;

pub use chunking::{Chunk, Chunker, ChunkingConfig, ChunkingMode, chunk_text};
pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use crate::config::{Credentials, EmbeddingConfig, EmbeddingProvider};
use crate::{RagError, Result};

/// Maps text to vectors of a fixed, declared dimension
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embeds each text, returning one vector per input in the same order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RagError::Encoding(format!("{} returned no embedding", self.model())))
    }
}

/// Builds the embedder selected by the configuration
#[inline]
pub fn create_embedder(
    config: &EmbeddingConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(config)?),
        EmbeddingProvider::OpenAi => {
            let api_key = credentials.require(&config.api_key_env)?;
            Arc::new(OpenAiEmbedder::new(config, api_key)?)
        }
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(config.dimension as usize)),
    };
    Ok(embedder)
}

/// Rejects inputs longer than the backend accepts instead of truncating them.
#[inline]
pub fn ensure_within_limit(texts: &[String], max_chars: usize, model: &str) -> Result<()> {
    for (index, text) in texts.iter().enumerate() {
        let length = text.chars().count();
        if length > max_chars {
            return Err(RagError::Encoding(format!(
                "Input {index} has {length} characters, exceeding the {max_chars}-character limit of {model}"
            )));
        }
    }
    Ok(())
}

/// Checks a backend response against the request size and declared dimension.
#[inline]
pub fn ensure_embeddings_shape(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
    model: &str,
) -> Result<()> {
    if embeddings.len() != expected_count {
        return Err(RagError::Encoding(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected_count,
            embeddings.len()
        )));
    }

    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(RagError::Encoding(format!(
            "{model} returned a {}-dimensional vector, expected {dimension}",
            bad.len()
        )));
    }

    Ok(())
}
