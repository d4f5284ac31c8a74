use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub mod articles;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod http;
pub mod indexer;
pub mod pipeline;
pub mod relevance;
pub mod retrieval;
pub mod vector_store;
