//! Embedding generation for the dense half of hybrid retrieval.
//!
//! Provides embedding generation using fastembed (when available) or a
//! hash-based fallback that is deterministic but lexical rather than
//! semantic.
//!
//! # Feature Flags
//!
//! - `fastembed-embeddings`: Enables `FastEmbed` with all-MiniLM-L6-v2
//!   (384 dimensions)
//! - Without the feature: Uses the hash-based fallback

mod fallback;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

pub use fallback::FallbackEmbedder;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

use crate::Result;

/// Embedding dimensions used across the corpus.
///
/// Matches the all-MiniLM-L6-v2 model; the fallback embedder produces
/// vectors of the same width so stored embeddings stay comparable.
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Trait for embedding generators.
///
/// Implementations must be thread-safe (`Send + Sync`); corpus
/// embedding happens in parallel batches at init time.
///
/// # Examples
///
/// ```
/// use openfda_agent::embedding::{Embedder, FallbackEmbedder, EMBEDDING_DIMENSIONS};
///
/// let embedder = FallbackEmbedder::new(EMBEDDING_DIMENSIONS);
/// let embedding = embedder.embed("Class II device recalls").unwrap();
/// assert_eq!(embedding.len(), EMBEDDING_DIMENSIONS);
/// ```
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// The default implementation calls `embed` for each text
    /// sequentially; implementations may batch.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails for any text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Model identifier stored alongside embeddings.
    fn model_name(&self) -> &'static str;
}

/// Creates the default embedder based on available features.
///
/// # Errors
///
/// Returns an error if embedder initialization fails.
#[cfg(feature = "fastembed-embeddings")]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FastEmbedEmbedder::new()?))
}

/// Creates the default embedder based on available features.
///
/// # Errors
///
/// Returns an error if embedder initialization fails (never fails for
/// the fallback).
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FallbackEmbedder::new(EMBEDDING_DIMENSIONS)))
}

/// Computes cosine similarity between two embedding vectors.
///
/// Returns a value between -1.0 and 1.0; 0.0 for mismatched lengths or
/// zero-magnitude inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
