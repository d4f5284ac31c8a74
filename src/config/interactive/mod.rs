
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{
    Config, ConfigError, EmbeddingConfig, EmbeddingProvider, VectorStoreBackend, VectorStoreConfig,
};
use crate::vector_store::DistanceMetric;

const PROVIDERS: [(EmbeddingProvider, &str); 3] = [
    (EmbeddingProvider::Ollama, "ollama"),
    (EmbeddingProvider::OpenAi, "openai"),
    (EmbeddingProvider::Hashing, "hashing (offline)"),
];

const BACKENDS: [(VectorStoreBackend, &str); 3] = [
    (VectorStoreBackend::LanceDb, "lancedb (local directory)"),
    (VectorStoreBackend::Pinecone, "pinecone (hosted)"),
    (VectorStoreBackend::Memory, "memory (not persisted)"),
];

const METRICS: [(DistanceMetric, &str); 3] = [
    (DistanceMetric::Cosine, "cosine"),
    (DistanceMetric::DotProduct, "dotproduct"),
    (DistanceMetric::Euclidean, "euclidean"),
];

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 News RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedding Configuration").bold().yellow());
    eprintln!("Choose how article chunks and queries are turned into vectors.");
    eprintln!();
    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Vector Store Configuration").bold().yellow());
    configure_vector_store(&mut config.vector_store)?;

    eprintln!();
    eprintln!("{}", style("Answer Generation").bold().yellow());
    let top_k: usize = Input::new()
        .with_prompt("Number of chunks to retrieve per question")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("top_k must be between 1 and 100")
            }
        })
        .interact_text()?;
    config.retrieval.set_top_k(top_k)?;

    let model: String = Input::new()
        .with_prompt("Generation model")
        .default(config.generation.model.clone())
        .interact_text()?;
    config.generation.set_model(model)?;

    if config.embedding.provider == EmbeddingProvider::Ollama {
        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        if test_ollama_connection(&config.embedding) {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before indexing.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!(
        "  Provider: {}",
        style(provider_label(config.embedding.provider)).cyan()
    );
    eprintln!("  URL: {}", style(&config.embedding.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Batch Size: {}", style(config.embedding.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!(
        "  Backend: {}",
        style(backend_label(config.vector_store.backend)).cyan()
    );
    eprintln!("  Index: {}", style(&config.vector_store.index_name).cyan());
    eprintln!("  Metric: {}", style(config.vector_store.metric).cyan());
    match config.vector_store.backend {
        VectorStoreBackend::LanceDb => eprintln!(
            "  Path: {}",
            style(config.vector_database_path().display()).cyan()
        ),
        VectorStoreBackend::Pinecone => eprintln!(
            "  Location: {}/{}",
            style(&config.vector_store.pinecone.cloud).cyan(),
            style(&config.vector_store.pinecone.region).cyan()
        ),
        VectorStoreBackend::Memory => {}
    }

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!("  Mode: {}", style(config.chunking.mode).cyan());
    eprintln!(
        "  Size/Overlap: {}/{}",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Generation:").bold().yellow());
    eprintln!("  Model: {}", style(&config.generation.model).cyan());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!("  Max Tokens: {}", style(config.generation.max_tokens).cyan());
    eprintln!("  Relevance Model: {}", style(&config.relevance.model).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn provider_label(provider: EmbeddingProvider) -> &'static str {
    PROVIDERS
        .iter()
        .find(|(p, _)| *p == provider)
        .map_or("unknown", |(_, label)| label)
}

fn backend_label(backend: VectorStoreBackend) -> &'static str {
    BACKENDS
        .iter()
        .find(|(b, _)| *b == backend)
        .map_or("unknown", |(_, label)| label)
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let labels: Vec<&str> = PROVIDERS.iter().map(|(_, label)| *label).collect();
    let default_index = PROVIDERS
        .iter()
        .position(|(p, _)| *p == embedding.provider)
        .unwrap_or(0);

    let provider_index = Select::new()
        .with_prompt("Embedding provider")
        .default(default_index)
        .items(&labels)
        .interact()?;
    embedding.provider = PROVIDERS[provider_index].0;

    if embedding.provider != EmbeddingProvider::Hashing {
        let base_url: String = Input::new()
            .with_prompt("Embedding service URL")
            .default(embedding.base_url.clone())
            .validate_with(|input: &String| -> Result<(), ConfigError> {
                let mut probe = EmbeddingConfig::default();
                probe.set_base_url(input.clone())
            })
            .interact_text()?;
        embedding.set_base_url(base_url)?;
    }

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (8..=8192).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 8 and 8192")
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(embedding.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.set_model(model)?;
    embedding.set_dimension(dimension)?;
    embedding.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_vector_store(store: &mut VectorStoreConfig) -> Result<()> {
    let labels: Vec<&str> = BACKENDS.iter().map(|(_, label)| *label).collect();
    let default_index = BACKENDS
        .iter()
        .position(|(b, _)| *b == store.backend)
        .unwrap_or(0);

    let backend_index = Select::new()
        .with_prompt("Vector store backend")
        .default(default_index)
        .items(&labels)
        .interact()?;
    store.backend = BACKENDS[backend_index].0;

    let index_name: String = Input::new()
        .with_prompt("Index name")
        .default(store.index_name.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            super::settings::validate_index_name(input)
        })
        .interact_text()?;
    store.set_index_name(index_name)?;

    let metric_labels: Vec<&str> = METRICS.iter().map(|(_, label)| *label).collect();
    let metric_index = Select::new()
        .with_prompt("Distance metric (must match an existing index)")
        .default(
            METRICS
                .iter()
                .position(|(m, _)| *m == store.metric)
                .unwrap_or(0),
        )
        .items(&metric_labels)
        .interact()?;
    store.metric = METRICS[metric_index].0;

    if store.backend == VectorStoreBackend::Pinecone {
        store.pinecone.cloud = Input::new()
            .with_prompt("Serverless cloud")
            .default(store.pinecone.cloud.clone())
            .interact_text()?;
        store.pinecone.region = Input::new()
            .with_prompt("Serverless region")
            .default(store.pinecone.region.clone())
            .interact_text()?;
        eprintln!(
            "The API key is read from {} at start-up.",
            style(&store.pinecone.api_key_env).cyan()
        );
    }

    Ok(())
}

fn test_ollama_connection(embedding: &EmbeddingConfig) -> bool {
    let Ok(url) = embedding.base_url().and_then(|base| {
        base.join("/api/version")
            .map_err(|_| ConfigError::InvalidUrl(embedding.base_url.clone()))
    }) else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url.as_str()).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
