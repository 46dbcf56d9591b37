//! Agent episode state and events.

use crate::core::{ExtractedParameters, Message, Provenance, ResolverContext, ToolCall};
use crate::fda::Endpoint;
use crate::usage::TurnUsage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Planner strategy tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Exact identifier lookup (K-number, PMA number, product code).
    Exact,
    /// Category browse (class, device type).
    Category,
    /// Broad keyword search.
    Broad,
    /// Counting / distribution via aggregation.
    Count,
    /// Safety inquiry: recalls + events + classification in parallel.
    SafetyDossier,
    /// Multiple endpoints joined through resolver output.
    CrossReference,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "exact" => Ok(Self::Exact),
            "category" => Ok(Self::Category),
            "broad" => Ok(Self::Broad),
            "count" => Ok(Self::Count),
            "safety_dossier" => Ok(Self::SafetyDossier),
            "cross_reference" | "crossreference" => Ok(Self::CrossReference),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Mutable state threaded through one episode of the state machine.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    /// Messages produced this turn (system + user + notes).
    pub messages: Vec<Message>,
    /// Extraction output for the question.
    pub extracted: ExtractedParameters,
    /// Resolver context: session-loaded, then enriched by DISPATCH.
    pub resolver_context: ResolverContext,
    /// Every tool call made this episode, append-order.
    pub tool_calls: Vec<ToolCall>,
    /// Re-plans used so far.
    pub retries: u32,
    /// The endpoint the planner routed to, when one was chosen.
    pub selected_endpoint: Option<Endpoint>,
    /// The planner's strategy, when one was chosen.
    pub strategy: Option<Strategy>,
}

impl AgentState {
    /// Total matching records across successful search calls.
    #[must_use]
    pub fn result_total(&self) -> u64 {
        self.tool_calls
            .iter()
            .filter_map(|call| call.result.as_ref())
            .map(|result| result.meta.total)
            .sum()
    }

    /// Count of tool calls that completed successfully.
    #[must_use]
    pub fn successful_calls(&self) -> usize {
        self.tool_calls
            .iter()
            .filter(|call| call.result.is_some())
            .count()
    }
}

/// The final product of an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnswer {
    /// The grounded natural-language answer (prose, key records,
    /// provenance block).
    pub answer: String,
    /// Structured data extracted during the episode, when any resolver
    /// or aggregation ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<serde_json::Value>,
    /// Provenance for the answer.
    pub provenance: Provenance,
    /// Token and cost usage for this turn.
    pub usage: TurnUsage,
    /// The session this turn belongs to.
    pub session_id: String,
}

/// Streaming events for the `ask_stream` surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Episode started.
    Start {
        /// Session id the turn runs under.
        session_id: String,
    },
    /// Progress note (planning, assessing).
    Thinking {
        /// Human-readable progress note.
        message: String,
    },
    /// A tool call is being dispatched.
    ToolCall {
        /// Tool name.
        tool_name: String,
    },
    /// A tool call finished.
    ToolResult {
        /// Tool name.
        tool_name: String,
        /// Records in the result (zero on failure).
        result_count: usize,
        /// Failure description when the call failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// The episode completed with an answer.
    Complete {
        /// The final answer.
        answer: Box<AgentAnswer>,
    },
    /// The episode failed.
    Error {
        /// Stable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}
