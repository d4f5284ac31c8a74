// Index builder
// Chunks articles, embeds the chunks in batches and upserts them into the vector store.
// Chunks an article no longer produces are deleted after the upserts.


use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::articles::Article;
use crate::embeddings::{Chunk, Chunker, Embedder};
use crate::vector_store::{IndexHandle, IndexSpec, Metadata, MetadataValue, VectorRecord, VectorStore};
use crate::{RagError, Result};

/// One-shot offline job that fills an index from a set of articles
pub struct IndexBuilder {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    spec: IndexSpec,
    batch_size: usize,
    show_progress: bool,
}

/// Statistics about a finished build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub index: IndexHandle,
    pub articles: usize,
    pub chunks: usize,
    pub records_upserted: usize,
    /// Leftover chunks of re-indexed articles that were removed
    pub records_deleted: usize,
    pub duration: Duration,
}

impl IndexBuilder {
    #[inline]
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        spec: IndexSpec,
        batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            spec,
            batch_size: batch_size.max(1),
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr when attended
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub async fn build(&self, articles: &[Article]) -> Result<IndexReport> {
        let started = Instant::now();

        if self.embedder.dimension() != self.spec.dimension {
            return Err(RagError::Config(format!(
                "Embedding model {} produces {}-dimensional vectors but index '{}' is configured for {}",
                self.embedder.model(),
                self.embedder.dimension(),
                self.spec.name,
                self.spec.dimension
            )));
        }

        let index = self.store.ensure_index(&self.spec).await?;
        let existing_ids = self.store.list_ids(&index).await?;

        let mut pending = Vec::new();
        for article in articles {
            let chunks = self.chunker.chunk_article(article)?;
            debug!("Article {} produced {} chunks", article.id, chunks.len());
            pending.extend(chunks.into_iter().map(|chunk| (article, chunk)));
        }

        info!(
            "Indexing {} chunks from {} articles into {} ({})",
            pending.len(),
            articles.len(),
            index.name(),
            self.store.backend()
        );

        let bar = self.progress_bar(pending.len() as u64);
        let mut records_upserted = 0;

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, chunk)| chunk.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            if vectors.len() != texts.len() {
                return Err(RagError::Encoding(format!(
                    "{} returned {} vectors for {} chunks",
                    self.embedder.model(),
                    vectors.len(),
                    texts.len()
                )));
            }

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|((article, chunk), values)| record_for(article, chunk, values))
                .collect();

            let summary = self.store.upsert(&index, &records).await?;
            records_upserted += summary.upserted;
            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();

        let written: HashSet<String> = pending
            .iter()
            .map(|(_, chunk)| record_id(&chunk.source_article_id, chunk.sequence_index))
            .collect();
        let stale = stale_record_ids(articles, existing_ids, &written);
        if !stale.is_empty() {
            info!("Removing {} stale chunk records from {}", stale.len(), index.name());
            self.store.delete(&index, &stale).await?;
        }

        let report = IndexReport {
            index,
            articles: articles.len(),
            chunks: pending.len(),
            records_upserted,
            records_deleted: stale.len(),
            duration: started.elapsed(),
        };
        info!(
            "Indexed {} records in {:.2}s",
            report.records_upserted,
            report.duration.as_secs_f64()
        );
        Ok(report)
    }

    fn progress_bar(&self, length: u64) -> ProgressBar {
        if self.show_progress && console::user_attended_stderr() {
            let bar = ProgressBar::new(length);
            if let Ok(style) = ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks {msg}") {
                bar.set_style(style);
            }
            bar
        } else {
            ProgressBar::hidden()
        }
    }
}

/// Builds the stored record for one chunk; the id is stable across rebuilds.
#[inline]
pub fn record_for(article: &Article, chunk: &Chunk, values: Vec<f32>) -> VectorRecord {
    let mut metadata = Metadata::new();
    metadata.insert("article_id".to_string(), MetadataValue::from(article.id.as_str()));
    metadata.insert("headline".to_string(), MetadataValue::from(article.headline.as_str()));
    metadata.insert("url".to_string(), MetadataValue::from(article.url.as_str()));
    metadata.insert("chunk_index".to_string(), MetadataValue::from(chunk.sequence_index));
    metadata.insert("text".to_string(), MetadataValue::from(chunk.text.as_str()));
    metadata.insert("start_offset".to_string(), MetadataValue::from(chunk.start_offset));
    metadata.insert("end_offset".to_string(), MetadataValue::from(chunk.end_offset));
    if let Some(date) = &article.publication_date {
        metadata.insert("publication_date".to_string(), MetadataValue::from(date.as_str()));
    }
    if let Some(section) = &article.section {
        metadata.insert("section".to_string(), MetadataValue::from(section.as_str()));
    }

    VectorRecord {
        id: record_id(&chunk.source_article_id, chunk.sequence_index),
        values,
        metadata,
    }
}

fn record_id(article_id: &str, sequence_index: usize) -> String {
    format!("{article_id}-{sequence_index}")
}

/// Chunk records of the given articles that the latest build did not write.
/// Records of articles outside this build are left alone.
fn stale_record_ids(
    articles: &[Article],
    existing_ids: Vec<String>,
    written: &HashSet<String>,
) -> Vec<String> {
    let article_ids: HashSet<&str> = articles.iter().map(|a| a.id.as_str()).collect();

    existing_ids
        .into_iter()
        .filter(|id| !written.contains(id))
        .filter(|id| match id.rsplit_once('-') {
            Some((article, sequence)) => {
                !sequence.is_empty()
                    && sequence.bytes().all(|b| b.is_ascii_digit())
                    && article_ids.contains(article)
            }
            None => false,
        })
        .collect()
}
