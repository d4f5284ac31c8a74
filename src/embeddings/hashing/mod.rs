#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::embeddings::Embedder;
use crate::{RagError, Result};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

static TERM_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

/// Deterministic bag-of-words encoder using signed feature hashing.
///
/// Needs no model download or service, which makes it useful offline and for
/// exercising the pipeline end to end. Texts sharing vocabulary land close
/// together under cosine similarity; there is no notion of synonymy.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model: String,
}

impl HashingEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model: format!("feature-hashing-{}", dimension.max(1)),
        }
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];

        for term in TERM_REGEX.find_iter(text) {
            let term = term.map_err(|e| RagError::Encoding(format!("Tokenization failed: {e}")))?;
            let hash = fnv1a(&term.as_str().to_lowercase());
            let bucket = (hash % self.dimension as u64) as usize;
            // Top bit picks the sign so collisions tend to cancel rather than pile up
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        Ok(vector)
    }
}

fn fnv1a(term: &str) -> u64 {
    term.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

impl Embedder for HashingEmbedder {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}
