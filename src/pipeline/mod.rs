
use tracing::info;

use crate::Result;
use crate::config::{Config, Credentials};
use crate::embeddings::create_embedder;
use crate::generation::{ResponseGenerator, create_generator};
use crate::retrieval::{RetrievalResult, Retriever};
use crate::vector_store::{IndexSpec, ScoredRecord, create_vector_store};

/// A generated answer with the records it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredRecord>,
}

/// Retrieve-then-generate question answering over one index
pub struct RagPipeline {
    retriever: Retriever,
    generator: ResponseGenerator,
    top_k: usize,
}

/// The index described by the configuration
#[inline]
pub fn index_spec(config: &Config) -> IndexSpec {
    IndexSpec::new(
        config.vector_store.index_name.clone(),
        config.embedding.dimension as usize,
        config.vector_store.metric,
    )
}

impl RagPipeline {
    #[inline]
    pub fn new(retriever: Retriever, generator: ResponseGenerator, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k,
        }
    }

    /// Wires every stage from a validated configuration.
    #[inline]
    pub async fn from_config(config: &Config, credentials: &Credentials) -> Result<Self> {
        let embedder = create_embedder(&config.embedding, credentials)?;
        let store = create_vector_store(config, credentials).await?;
        let index = store.ensure_index(&index_spec(config)).await?;
        let generator = ResponseGenerator::new(
            create_generator(&config.generation, credentials)?,
            config.generation.clone(),
        );

        info!(
            "Pipeline ready: {} embeddings, {} index '{}'",
            embedder.model(),
            store.backend(),
            index.name()
        );
        Ok(Self::new(
            Retriever::new(embedder, store, index),
            generator,
            config.retrieval.top_k,
        ))
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    #[inline]
    pub async fn search(&self, query: &str) -> Result<RetrievalResult> {
        self.retriever.retrieve(query, self.top_k).await
    }

    #[inline]
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let retrieval = self.search(query).await?;
        let text = self.generator.generate(query, &retrieval)?;
        Ok(Answer {
            text,
            sources: retrieval.matches,
        })
    }
}
