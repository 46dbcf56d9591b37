//! Hash-based fallback embedder.
//!
//! Provides deterministic pseudo-embeddings when `FastEmbed` is not
//! available. Similarity reflects lexical overlap (shared words and
//! character trigrams), not semantics, which is adequate for the
//! documentation corpus: chunk headers repeat the endpoint name and
//! field list, so keyword overlap carries most of the signal.

use crate::Result;
use crate::embedding::Embedder;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hash-based fallback embedder.
///
/// Combines word-level hashing (vocabulary capture) with character
/// trigram hashing (fuzzy matching), normalized to unit length so
/// cosine similarity is the dot product.
///
/// # Examples
///
/// ```
/// use openfda_agent::embedding::{Embedder, FallbackEmbedder, EMBEDDING_DIMENSIONS};
///
/// let embedder = FallbackEmbedder::new(EMBEDDING_DIMENSIONS);
/// let a = embedder.embed("device recalls").unwrap();
/// let b = embedder.embed("device recalls").unwrap();
/// assert_eq!(a, b); // Deterministic
/// ```
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    /// Creates a new fallback embedder with the specified dimensions.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_string(s: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        // Lowercase and strip punctuation so "510(k)" and "510k" collide
        let normalized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c.is_whitespace() {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();

        let words: Vec<&str> = normalized.split_whitespace().collect();

        // Word-level hashing (primary signal)
        for word in &words {
            let hash = Self::hash_string(word);
            let idx = (hash as usize) % self.dimensions;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            let magnitude = 1.0 + ((hash >> 16) & 0xFF) as f32 / 255.0;
            embedding[idx] += sign * magnitude;
        }

        // Character trigram hashing (secondary signal for fuzzy matching)
        let chars: Vec<char> = normalized.chars().collect();
        if chars.len() >= 3 {
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let hash = Self::hash_string(&trigram);
                let idx = (hash as usize) % self.dimensions;
                let sign = if (hash >> 32) & 1 == 0 { 0.5 } else { -0.5 };
                embedding[idx] += sign;
            }
        }

        // Normalize to unit length for cosine similarity
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }

        embedding
    }
}

impl Embedder for FallbackEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        use rayon::prelude::*;

        Ok(texts
            .par_iter()
            .map(|text| self.generate_embedding(text))
            .collect())
    }

    fn model_name(&self) -> &'static str {
        "hash-fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EMBEDDING_DIMENSIONS, cosine_similarity};

    #[test]
    fn test_deterministic() {
        let embedder = FallbackEmbedder::new(EMBEDDING_DIMENSIONS);
        let a = embedder.embed("Class I recall").unwrap();
        let b = embedder.embed("Class I recall").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimensions() {
        let embedder = FallbackEmbedder::new(EMBEDDING_DIMENSIONS);
        let embedding = embedder.embed("test").unwrap();
        assert_eq!(embedding.len(), EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn test_normalized() {
        let embedder = FallbackEmbedder::new(EMBEDDING_DIMENSIONS);
        let embedding = embedder.embed("adverse event reports").unwrap();
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_text_higher_similarity() {
        let embedder = FallbackEmbedder::new(EMBEDDING_DIMENSIONS);
        let base = embedder.embed("surgical mask recall search").unwrap();
        let similar = embedder.embed("surgical mask recall lookup").unwrap();
        let different = embedder.embed("pacemaker battery telemetry").unwrap();

        let sim_similar = cosine_similarity(&base, &similar);
        let sim_different = cosine_similarity(&base, &different);
        assert!(
            sim_similar > sim_different,
            "similar text should score higher: {sim_similar} vs {sim_different}"
        );
    }

    #[test]
    fn test_batch_embedding() {
        let embedder = FallbackEmbedder::new(EMBEDDING_DIMENSIONS);
        let texts = vec!["recalls", "events", "classifications"];
        let embeddings = embedder.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 3);
        for embedding in embeddings {
            assert_eq!(embedding.len(), EMBEDDING_DIMENSIONS);
        }
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = FallbackEmbedder::new(EMBEDDING_DIMENSIONS);
        let embedding = embedder.embed("").unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_punctuation_insensitive() {
        let embedder = FallbackEmbedder::new(EMBEDDING_DIMENSIONS);
        let a = embedder.embed("510(k) clearance").unwrap();
        let b = embedder.embed("510 k clearance").unwrap();
        assert_eq!(a, b);
    }
}
