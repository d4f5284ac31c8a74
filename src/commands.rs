use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::articles::{load_articles, write_relevant_articles};
use crate::config::{Config, Credentials, Stage};
use crate::embeddings::{Chunker, ChunkingMode, create_embedder};
use crate::indexer::IndexBuilder;
use crate::pipeline::{RagPipeline, index_spec};
use crate::relevance::RelevanceFilter;
use crate::retrieval::RetrievalResult;
use crate::vector_store::create_vector_store;

const PREVIEW_CHARS: usize = 160;

/// Overrides for the `chunk` command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOptions {
    pub row: usize,
    pub mode: Option<ChunkingMode>,
    pub size: Option<usize>,
    pub overlap: Option<usize>,
}

/// Load, override from the environment and validate the configuration
#[inline]
pub fn load_config(config_dir: &Path) -> Result<Config> {
    let mut config = Config::load(config_dir)?;
    config.apply_env_overrides(|var| std::env::var(var).ok());
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

fn credentials_for(config: &Config, stages: &[Stage]) -> Result<Credentials> {
    Credentials::from_env(config, stages).context("Missing credentials")
}

/// Classify articles and write the relevant ones to `output`
#[inline]
pub async fn filter_articles(
    config: &Config,
    input: &Path,
    output: &Path,
    criteria: Option<&str>,
) -> Result<()> {
    let credentials = credentials_for(config, &[Stage::Relevance])?;
    let articles = load_articles(input).context("Failed to load articles")?;
    let filter = RelevanceFilter::from_config(&config.relevance, &credentials)?;
    let criteria = criteria.unwrap_or(filter.criteria()).to_string();

    info!("Classifying {} articles against: {}", articles.len(), criteria);

    let annotated = filter
        .annotate(&articles, &criteria)
        .context("Failed to filter articles")?;
    let written = write_relevant_articles(output, &annotated)
        .context("Failed to write filtered articles")?;

    println!(
        "Kept {} of {} articles, written to {}",
        written,
        articles.len(),
        output.display()
    );
    Ok(())
}

/// Print the chunks of one article, for tuning the chunking settings
#[inline]
pub fn show_chunks(config: &Config, input: &Path, options: &ChunkOptions) -> Result<()> {
    let mut chunking = config.chunking.clone();
    if let Some(mode) = options.mode {
        chunking.mode = mode;
    }
    if let Some(size) = options.size {
        chunking.chunk_size = size;
    }
    if let Some(overlap) = options.overlap {
        chunking.chunk_overlap = overlap;
    }

    let chunker = Chunker::new(&chunking).context("Invalid chunking settings")?;
    let articles = load_articles(input).context("Failed to load articles")?;
    let article = articles.get(options.row).with_context(|| {
        format!(
            "Row {} does not exist, the file has {} articles",
            options.row,
            articles.len()
        )
    })?;

    let chunks = chunker.chunk_article(article)?;
    println!(
        "Article {} \"{}\": {} {} chunks (size {}, overlap {})",
        article.id,
        article.headline,
        chunks.len(),
        chunking.mode,
        chunking.chunk_size,
        chunking.chunk_overlap
    );
    println!();

    for chunk in &chunks {
        println!(
            "[{}] bytes {}..{} ({} characters)",
            chunk.sequence_index,
            chunk.start_offset,
            chunk.end_offset,
            chunk.text.chars().count()
        );
        println!("{}", chunk.text);
        println!();
    }

    Ok(())
}

/// Chunk, embed and upsert every article of `input`
#[inline]
pub async fn build_index(config: &Config, input: &Path) -> Result<()> {
    let credentials = credentials_for(config, &[Stage::Embedding, Stage::VectorStore])?;
    let articles = load_articles(input).context("Failed to load articles")?;

    let report = async {
        let chunker = Chunker::new(&config.chunking)?;
        let embedder = create_embedder(&config.embedding, &credentials)?;
        let store = create_vector_store(config, &credentials).await?;
        IndexBuilder::new(
            chunker,
            embedder,
            store,
            index_spec(config),
            config.embedding.batch_size as usize,
        )
        .with_progress(true)
        .build(&articles)
        .await
    }
    .await
    .context("Failed to build index")?;

    println!("Index '{}' is ready", report.index.name());
    println!("  Articles: {}", report.articles);
    println!("  Chunks: {}", report.chunks);
    println!("  Records upserted: {}", report.records_upserted);
    if report.records_deleted > 0 {
        println!("  Stale records removed: {}", report.records_deleted);
    }
    println!("  Duration: {:.2}s", report.duration.as_secs_f64());
    Ok(())
}

async fn open_pipeline(config: &Config, stages: &[Stage], top_k: Option<usize>) -> Result<RagPipeline> {
    let mut config = config.clone();
    if let Some(top_k) = top_k {
        config.retrieval.set_top_k(top_k)?;
    }

    let credentials = credentials_for(&config, stages)?;
    RagPipeline::from_config(&config, &credentials)
        .await
        .context("Failed to open the index")
}

fn print_matches(result: &RetrievalResult) {
    if result.is_empty() {
        println!("No matching articles found.");
        return;
    }

    for (rank, m) in result.iter().enumerate() {
        let record = &m.record;
        println!(
            "{}. {} (score {:.3})",
            rank + 1,
            record.metadata_str("headline").unwrap_or(&record.id),
            m.score
        );
        if let Some(url) = record.metadata_str("url") {
            println!("   {url}");
        }
        if let Some(text) = record.metadata_str("text") {
            let preview: String = text.chars().take(PREVIEW_CHARS).collect();
            let ellipsis = if text.chars().count() > PREVIEW_CHARS { "..." } else { "" };
            println!("   {}{}", preview.replace('\n', " "), ellipsis);
        }
    }
}

/// Print the nearest chunks for a query
#[inline]
pub async fn search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let pipeline = open_pipeline(config, &[Stage::Embedding, Stage::VectorStore], top_k).await?;
    let result = pipeline.search(query).await.context("Search failed")?;
    print_matches(&result);
    Ok(())
}

/// Answer a question from the indexed articles
#[inline]
pub async fn ask(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let pipeline = open_pipeline(
        config,
        &[Stage::Embedding, Stage::VectorStore, Stage::Generation],
        top_k,
    )
    .await?;

    let answer = pipeline
        .answer(query)
        .await
        .context("Failed to answer the question")?;

    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        print_matches(&RetrievalResult {
            query: query.to_string(),
            matches: answer.sources,
        });
    }
    Ok(())
}
