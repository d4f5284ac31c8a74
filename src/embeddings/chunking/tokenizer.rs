use std::path::Path;
use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::{RagError, Result};

/// Produces the byte spans of each token in a text
pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &str;

    fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>>;
}

static WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]").expect("valid regex"));

/// Words and individual punctuation marks
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    #[inline]
    fn name(&self) -> &str {
        "words"
    }

    #[inline]
    fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>> {
        WORD_REGEX
            .find_iter(text)
            .map(|found| {
                found
                    .map(|m| (m.start(), m.end()))
                    .map_err(|e| RagError::Encoding(format!("Tokenization failed: {e}")))
            })
            .collect()
    }
}

/// Tokenizer loaded from a HuggingFace `tokenizer.json`
pub struct HuggingFaceTokenizer {
    name: String,
    inner: tokenizers::Tokenizer,
}

impl HuggingFaceTokenizer {
    #[inline]
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            RagError::Config(format!(
                "Failed to load tokenizer from {}: {e}",
                path.display()
            ))
        })?;

        Ok(Self {
            name: path.display().to_string(),
            inner,
        })
    }
}

impl Tokenizer for HuggingFaceTokenizer {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| RagError::Encoding(format!("Tokenization failed: {e}")))?;

        Ok(encoding
            .get_offsets()
            .iter()
            .copied()
            .filter(|(start, end)| end > start)
            .collect())
    }
}
