//! Output formatting for CLI results.

use crate::agent::AgentAnswer;
use crate::core::Session;
use crate::error::Error;
use crate::storage::StoreStats;
use std::fmt::Write;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// One JSON document.
    Json,
}

impl OutputFormat {
    /// Parses a format flag, defaulting to text.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Formats an error for the chosen output format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => serde_json::json!({
            "error": {
                "code": error.code(),
                "message": error.to_string(),
            }
        })
        .to_string(),
    }
}

/// Formats a completed answer.
#[must_use]
pub fn format_answer(answer: &AgentAnswer, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            format!(
                "{}\n\nsession: {} | tokens: {} in / {} out | cost: ${:.4}\n",
                answer.answer,
                answer.session_id,
                answer.usage.tokens_in,
                answer.usage.tokens_out,
                answer.usage.cost_usd,
            )
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(answer).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

/// Formats the session listing.
#[must_use]
pub fn format_sessions(sessions: &[Session], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                return "no sessions\n".to_string();
            }
            let mut out = String::from("id | messages | cost | updated\n");
            for session in sessions {
                let _ = writeln!(
                    out,
                    "{} | {} | ${:.4} | {}",
                    session.id, session.message_count, session.cost_usd, session.updated_at
                );
            }
            out
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(sessions).unwrap_or_else(|_| "[]".to_string())
        }
    }
}

/// Formats store statistics.
#[must_use]
pub fn format_stats(stats: &StoreStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            format!(
                "catalog devices: {}\ncorpus chunks: {} ({} embedded)\nsessions: {}\nschema: v{}\ndb size: {}\n",
                stats.device_count,
                stats.corpus_chunk_count,
                stats.embedded_chunk_count,
                stats.session_count,
                stats.schema_version,
                stats
                    .db_size
                    .map_or_else(|| "-".to_string(), |size| format!("{size} bytes")),
            )
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(stats).unwrap_or_else(|_| "{}".to_string())
        }
    }
}
