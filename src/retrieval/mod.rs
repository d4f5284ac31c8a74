
use std::sync::Arc;

use tracing::debug;

use crate::Result;
use crate::embeddings::Embedder;
use crate::vector_store::{IndexHandle, ScoredRecord, VectorStore};

/// Matches for one query, best first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub query: String,
    pub matches: Vec<ScoredRecord>,
}

impl RetrievalResult {
    #[inline]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ScoredRecord> {
        self.matches.iter()
    }
}

/// Embeds a question and looks up its nearest records in one index
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    index: IndexHandle,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, index: IndexHandle) -> Self {
        Self {
            embedder,
            store,
            index,
        }
    }

    #[inline]
    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    #[inline]
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        if top_k == 0 {
            return Ok(RetrievalResult {
                query: query.to_string(),
                matches: Vec::new(),
            });
        }

        let vector = self.embedder.embed(query)?;
        let matches = self.store.query(&self.index, &vector, top_k).await?;
        debug!("Retrieved {} matches for query", matches.len());

        Ok(RetrievalResult {
            query: query.to_string(),
            matches,
        })
    }
}
