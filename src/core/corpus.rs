//! Documentation corpus units for the hybrid retriever.
//!
//! Chunks are immutable at runtime; the corpus is rebuilt offline. Every
//! chunk's text begins with a synthetic header repeating the endpoint
//! name and its canonical field list, which boosts keyword scoring.

use crate::fda::Endpoint;
use serde::{Deserialize, Serialize};

/// What kind of documentation a chunk carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    /// Curated how-to: purpose, example queries, canonical fields.
    Howto,
    /// Field reference.
    Fields,
    /// Endpoint overview.
    Overview,
    /// Filter-language syntax notes.
    QuerySyntax,
}

/// One documentation unit in the retriever corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusChunk {
    /// Storage id, `None` before insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// The endpoint this chunk documents; `None` for general material.
    pub endpoint: Option<Endpoint>,
    /// Documentation kind.
    pub kind: ChunkKind,
    /// Canonical field names mentioned by this chunk.
    pub fields: Vec<String>,
    /// Chunk text, synthetic header included.
    pub text: String,
}

impl CorpusChunk {
    /// Builds a chunk, prefixing the text with the synthetic header.
    #[must_use]
    pub fn new(
        endpoint: Option<Endpoint>,
        kind: ChunkKind,
        fields: Vec<String>,
        body: &str,
    ) -> Self {
        let text = format!("{}{body}", synthetic_header(endpoint, &fields));
        Self {
            id: None,
            endpoint,
            kind,
            fields,
            text,
        }
    }

    /// The endpoint label stored and matched on: the endpoint path, or
    /// `"general"`.
    #[must_use]
    pub fn endpoint_label(&self) -> &'static str {
        self.endpoint.map_or("general", Endpoint::path)
    }
}

/// Renders the synthetic chunk header.
#[must_use]
pub fn synthetic_header(endpoint: Option<Endpoint>, fields: &[String]) -> String {
    format!(
        "[ENDPOINT]: {}\n[FIELDS]: {}\n",
        endpoint.map_or("general", Endpoint::path),
        fields.join(", ")
    )
}
