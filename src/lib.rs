//! # openfda-agent
//!
//! Natural-language agent for the U.S. FDA's openFDA device datasets
//! and the GUDID device catalog.
//!
//! A question in English is planned into a sequence of calls against
//! the seven openFDA device endpoints and a set of local resolver
//! tools, executed (often concurrently), quality-gated against the
//! question, and answered with provenance: the endpoint, the filter
//! expression, the result count and the dataset's freshness stamp.
//!
//! ## Features
//!
//! - **Agent loop**: a hand-rolled plan / dispatch / assess / answer /
//!   guard state machine with a bounded retry budget
//! - **Endpoint tools**: typed wrappers over the seven device
//!   endpoints, plus aggregation and bounded pagination helpers
//! - **Resolvers**: device terms to product codes (local GUDID
//!   catalog), company names to FDA variants, geography to
//!   manufacturer activity
//! - **Hybrid retrieval**: BM25 + dense embeddings with
//!   reciprocal-rank fusion over the endpoint documentation corpus
//! - **Sessions**: durable multi-turn state with per-session usage
//!   caps

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fda;
pub mod llm;
pub mod resolve;
pub mod retrieval;
pub mod session;
pub mod storage;
pub mod usage;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{
    ExtractedParameters, Message, Provenance, RecallClass, ResolverContext, Role, Session,
    SessionRecord, ToolCall, ToolResult,
};

// Re-export the agent surface
pub use agent::{Agent, AgentAnswer, AgentEvent, Strategy};

// Re-export storage types
pub use storage::{DEFAULT_DB_PATH, SqliteStore};

// Re-export endpoint types
pub use fda::{Endpoint, EndpointTools, FdaClient};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};

// Re-export embedding types
#[cfg(feature = "fastembed-embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{EMBEDDING_DIMENSIONS, Embedder, FallbackEmbedder, cosine_similarity};

// Re-export retrieval types
pub use retrieval::{HybridRetriever, endpoint_hints, reciprocal_rank_fusion};
