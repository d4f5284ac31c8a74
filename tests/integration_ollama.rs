#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use news_rag::config::EmbeddingConfig;
use news_rag::embeddings::{Embedder, OllamaEmbedder};
use news_rag::vector_store::cosine_similarity;
use std::env;
use tracing::{debug, info};

fn create_integration_test_embedder() -> OllamaEmbedder {
    let defaults = EmbeddingConfig::default();
    let mut config = EmbeddingConfig {
        base_url: env::var("OLLAMA_URL").unwrap_or(defaults.base_url),
        model: env::var("OLLAMA_MODEL").unwrap_or(defaults.model),
        batch_size: 4,
        timeout_secs: 60,
        ..EmbeddingConfig::default()
    };
    if let Some(dimension) = env::var("OLLAMA_DIMENSION").ok().and_then(|d| d.parse().ok()) {
        config.dimension = dimension;
    }

    OllamaEmbedder::new(&config).expect("Failed to create Ollama embedder")
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore error if already initialized
}

#[test]
#[ignore = "requires a running Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();

    let embedder = create_integration_test_embedder();

    info!("Testing health check against real Ollama instance");
    let result = embedder.health_check();

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[test]
#[ignore = "requires a running Ollama instance"]
fn real_ollama_list_models() {
    init_test_tracing();

    let models = create_integration_test_embedder()
        .list_models()
        .expect("Model listing should succeed");

    assert!(!models.is_empty(), "Should have at least one model available");
    for model in &models {
        debug!("Available model: {} (size: {:?})", model.name, model.size);
    }
}

#[test]
#[ignore = "requires a running Ollama instance"]
fn real_ollama_batch_embedding() {
    init_test_tracing();

    let embedder = create_integration_test_embedder();
    let texts = vec![
        "The swimmer won gold in the 200m freestyle.".to_string(),
        "A freestyle swimmer took the gold medal.".to_string(),
        "Parliament passed the annual budget.".to_string(),
        "Interest rates were left unchanged.".to_string(),
        "The relay team finished fourth.".to_string(),
    ];

    let vectors = embedder
        .embed_batch(&texts)
        .expect("Batch embedding should succeed");

    assert_eq!(vectors.len(), texts.len(), "One vector per input, in order");
    assert!(vectors.iter().all(|v| v.len() == embedder.dimension()));

    let related = cosine_similarity(&vectors[0], &vectors[1]);
    let unrelated = cosine_similarity(&vectors[0], &vectors[2]);
    info!("Similarity related={related:.3} unrelated={unrelated:.3}");
    assert!(related > unrelated);
}
