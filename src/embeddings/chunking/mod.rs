
mod recursive;
mod tokenizer;
mod window;

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use tokenizer::{HuggingFaceTokenizer, Tokenizer, WordTokenizer};

use crate::{RagError, Result};
use crate::articles::Article;
use crate::config::ConfigError;

/// A segment of an article ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_article_id: String,
    /// Position of this chunk within its article
    pub sequence_index: usize,
    pub text: String,
    /// Byte offset of the first character in the article content
    pub start_offset: usize,
    /// Byte offset one past the last character
    pub end_offset: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMode {
    /// Split at the coarsest separator that keeps chunks under the size limit
    #[default]
    Recursive,
    /// Sliding character window without boundary awareness
    Fixed,
    /// Sliding window measured in tokenizer tokens
    Token,
}

impl fmt::Display for ChunkingMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Recursive => "recursive",
            Self::Fixed => "fixed",
            Self::Token => "token",
        };
        f.write_str(name)
    }
}

impl FromStr for ChunkingMode {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "recursive" => Ok(Self::Recursive),
            "fixed" => Ok(Self::Fixed),
            "token" => Ok(Self::Token),
            other => Err(RagError::Config(format!("Unknown chunking mode: {other}"))),
        }
    }
}

/// Configuration for article chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub mode: ChunkingMode,
    /// Maximum chunk length, in characters (tokens for token mode)
    pub chunk_size: usize,
    /// Units repeated at the head of the following chunk
    pub chunk_overlap: usize,
    /// Boundaries tried in order by recursive mode; an empty string splits characters
    pub separators: Vec<String>,
    /// HuggingFace `tokenizer.json` for token mode; a word tokenizer is used when unset
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            mode: ChunkingMode::Recursive,
            chunk_size: 500,
            chunk_overlap: 100,
            separators: ["\n\n", "\n", ". ", " ", ""]
                .into_iter()
                .map(String::from)
                .collect(),
            tokenizer_path: None,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }

        if self.mode == ChunkingMode::Recursive && self.separators.is_empty() {
            return Err(ConfigError::EmptySeparators);
        }

        Ok(())
    }
}

/// Splits text according to a validated [`ChunkingConfig`]
#[derive(Clone)]
pub struct Chunker {
    config: ChunkingConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl fmt::Debug for Chunker {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunker")
            .field("config", &self.config)
            .field("tokenizer", &self.tokenizer.name())
            .finish()
    }
}

impl Chunker {
    /// Builds a chunker, loading the configured tokenizer for token mode.
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;

        let tokenizer: Arc<dyn Tokenizer> = match (&config.mode, &config.tokenizer_path) {
            (ChunkingMode::Token, Some(path)) => Arc::new(HuggingFaceTokenizer::from_file(path)?),
            _ => Arc::new(WordTokenizer),
        };

        Ok(Self {
            config: config.clone(),
            tokenizer,
        })
    }

    #[inline]
    pub fn with_tokenizer(config: &ChunkingConfig, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            tokenizer,
        })
    }

    #[inline]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Byte ranges of each chunk within `text`, in order.
    #[inline]
    pub fn spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let ranges = match self.config.mode {
            ChunkingMode::Recursive => {
                recursive::split_recursive(text, &self.config.separators, size, overlap)
            }
            ChunkingMode::Fixed => {
                let units: Vec<(usize, usize)> = text
                    .char_indices()
                    .map(|(i, c)| (i, i + c.len_utf8()))
                    .collect();
                window::sliding_window(&units, size, overlap)
            }
            ChunkingMode::Token => {
                let units = self.tokenizer.token_spans(text)?;
                window::sliding_window(&units, size, overlap)
            }
        };

        Ok(ranges
            .into_iter()
            .filter(|range| text.get(range.clone()).is_some_and(|s| !s.is_empty()))
            .collect())
    }

    /// Chunk text into ordered, non-empty strings.
    #[inline]
    pub fn split(&self, text: &str) -> Result<Vec<String>> {
        Ok(self
            .spans(text)?
            .into_iter()
            .filter_map(|range| text.get(range).map(str::to_string))
            .collect())
    }

    #[inline]
    pub fn chunk_article(&self, article: &Article) -> Result<Vec<Chunk>> {
        let chunks: Vec<Chunk> = self
            .spans(&article.content)?
            .into_iter()
            .filter_map(|range| {
                article
                    .content
                    .get(range.clone())
                    .map(|text| (range, text.to_string()))
            })
            .enumerate()
            .map(|(sequence_index, (range, text))| Chunk {
                source_article_id: article.id.clone(),
                sequence_index,
                text,
                start_offset: range.start,
                end_offset: range.end,
            })
            .collect();

        debug!(
            "Chunked article '{}' into {} {} chunks",
            article.id,
            chunks.len(),
            self.config.mode
        );

        Ok(chunks)
    }
}

/// Chunk text with a one-off chunker built from `config`
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    Chunker::new(config)?.split(text)
}
