//! Hybrid retrieval over the endpoint documentation corpus.
//!
//! BM25 (FTS5) and dense-embedding cosine scoring run over the same
//! candidate pool, prefiltered by endpoint when the question matches
//! the alias dictionary, then fuse with reciprocal-rank fusion.
//!
//! The controller calls the retriever in two places: at plan time to
//! surface endpoint hints to the planner, and when the extractor
//! reports a low-confidence field, to fetch the canonical field list
//! for a constrained re-extraction.

mod corpus;
mod rrf;

pub use corpus::{builtin_corpus, endpoint_hints};
pub use rrf::{RRF_K, reciprocal_rank_fusion};

use crate::core::CorpusChunk;
use crate::embedding::{Embedder, cosine_similarity};
use crate::error::Result;
use crate::fda::Endpoint;
use crate::storage::SqliteStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Candidates each scorer contributes before fusion.
pub const CANDIDATE_POOL: usize = 50;

/// Default fused results returned.
pub const DEFAULT_TOP_K: usize = 5;

/// One fused retrieval hit.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// The documentation chunk.
    pub chunk: CorpusChunk,
    /// Fused RRF score (higher is better).
    pub score: f64,
    /// BM25 score when the lexical scorer ranked this chunk.
    pub bm25_score: Option<f64>,
    /// Cosine similarity when the dense scorer ranked this chunk.
    pub dense_score: Option<f32>,
}

/// Hybrid BM25 + dense retriever over the corpus store.
pub struct HybridRetriever {
    store: Arc<Mutex<SqliteStore>>,
    embedder: Arc<dyn Embedder>,
}

impl HybridRetriever {
    /// Creates a retriever over the shared store and embedder.
    #[must_use]
    pub fn new(store: Arc<Mutex<SqliteStore>>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Retrieves the top chunks for a question.
    ///
    /// When the alias dictionary produces endpoint hints, candidates
    /// are restricted to those endpoints; otherwise the whole corpus is
    /// scored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or embedder fails.
    pub fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let hints = endpoint_hints(question);
        let labels: Vec<&str> = hints.iter().map(|e| e.path()).collect();
        let filter = (!labels.is_empty()).then_some(labels.as_slice());

        let store = self.store.lock().map_err(|_| {
            crate::error::StorageError::Database("store lock poisoned".to_string())
        })?;

        // Lexical scoring
        let bm25 = store.corpus_search_fts(question, CANDIDATE_POOL, filter)?;

        // Dense scoring over the same pool
        let query_embedding = self.embedder.embed(question)?;
        let mut dense: Vec<(i64, f32)> = store
            .corpus_embeddings(filter)?
            .into_iter()
            .map(|(id, embedding)| (id, cosine_similarity(&query_embedding, &embedding)))
            .collect();
        dense.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        dense.truncate(CANDIDATE_POOL);

        // Fuse
        let bm25_ranked: Vec<i64> = bm25.iter().map(|(id, _)| *id).collect();
        let dense_ranked: Vec<i64> = dense.iter().map(|(id, _)| *id).collect();
        let fused = reciprocal_rank_fusion(&[&bm25_ranked, &dense_ranked], RRF_K);

        let bm25_map: HashMap<i64, f64> = bm25.into_iter().collect();
        let dense_map: HashMap<i64, f32> = dense.into_iter().collect();

        let mut results = Vec::new();
        for (chunk_id, score) in fused.into_iter().take(top_k) {
            if let Some(chunk) = store.corpus_chunk(chunk_id)? {
                results.push(RetrievedChunk {
                    chunk,
                    score,
                    bm25_score: bm25_map.get(&chunk_id).copied(),
                    dense_score: dense_map.get(&chunk_id).copied(),
                });
            }
        }
        Ok(results)
    }

    /// Canonical field names for an endpoint, unioned across its
    /// chunks. Used for constrained re-extraction of low-confidence
    /// fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn field_reference(&self, endpoint: Endpoint) -> Result<Vec<String>> {
        let store = self.store.lock().map_err(|_| {
            crate::error::StorageError::Database("store lock poisoned".to_string())
        })?;
        let chunks = store.corpus_chunks_for_endpoint(endpoint.path())?;
        let mut fields: Vec<String> = Vec::new();
        for chunk in chunks {
            for field in chunk.fields {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        Ok(fields)
    }

    /// Loads the builtin corpus and embeds every chunk. Idempotent per
    /// fresh database; returns the number of chunks embedded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or embedder fails.
    pub fn bootstrap_corpus(&self) -> Result<usize> {
        let mut store = self.store.lock().map_err(|_| {
            crate::error::StorageError::Database("store lock poisoned".to_string())
        })?;

        if store.corpus_count()? > 0 {
            return Ok(0);
        }

        let mut chunks = builtin_corpus();
        store.insert_corpus_chunks(&mut chunks)?;

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        let model_name = self.embedder.model_name();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            if let Some(id) = chunk.id {
                store.store_corpus_embedding(id, &embedding, Some(model_name))?;
            }
        }
        Ok(chunks.len())
    }
}
