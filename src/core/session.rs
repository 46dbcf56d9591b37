//! Session documents.
//!
//! A session is a keyed, durable JSON document holding the full message
//! list, the latest resolver context and cumulative usage. Sessions live
//! until explicitly deleted.

use super::context::ResolverContext;
use super::message::Message;
use serde::{Deserialize, Serialize};

/// Session header row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session id (UUID v4 string).
    pub id: String,
    /// Unix timestamp of creation (seconds).
    pub created_at: i64,
    /// Unix timestamp of last append (seconds).
    pub updated_at: i64,
    /// Number of messages in the history.
    pub message_count: u64,
    /// Cumulative LLM spend in USD.
    pub cost_usd: f64,
}

impl Session {
    /// Creates a fresh session with a random id, stamped now.
    #[must_use]
    pub fn new() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            message_count: 0,
            cost_usd: 0.0,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Cumulative token and cost accounting for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUsage {
    /// Total input tokens across all LLM calls.
    pub input_tokens: u64,
    /// Total output tokens across all LLM calls.
    pub output_tokens: u64,
    /// Total spend in USD.
    pub total_cost_usd: f64,
    /// Number of LLM requests made.
    pub request_count: u64,
    /// Active spend limit in USD.
    pub limit_usd: f64,
}

/// The full durable session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session header.
    pub session: Session,
    /// Full append-only message history.
    pub messages: Vec<Message>,
    /// Latest resolver context.
    #[serde(default)]
    pub resolver_context: ResolverContext,
    /// Cumulative usage.
    #[serde(default)]
    pub usage: SessionUsage,
}

impl SessionRecord {
    /// Creates an empty record for a fresh session.
    #[must_use]
    pub fn new(limit_usd: f64) -> Self {
        Self {
            session: Session::new(),
            messages: Vec::new(),
            resolver_context: ResolverContext::default(),
            usage: SessionUsage {
                limit_usd,
                ..SessionUsage::default()
            },
        }
    }

    /// Appends a turn: messages plus a context merge, updating the
    /// header counters.
    pub fn append_turn(
        &mut self,
        messages: Vec<Message>,
        context: ResolverContext,
        usage: SessionUsage,
    ) {
        self.messages.extend(messages);
        self.resolver_context.merge(context);
        self.usage = usage;
        self.session.message_count = self.messages.len() as u64;
        self.session.cost_usd = self.usage.total_cost_usd;
        self.session.updated_at = chrono::Utc::now().timestamp();
    }
}
