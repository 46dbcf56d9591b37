//! The PLAN node.
//!
//! The planner LLM chooses a strategy, the tool calls and their
//! arguments. On LLM failure (after the one-retry policy) the plan
//! falls back deterministically to the endpoint with the highest
//! retrieval hint.

use crate::agent::prompt::{PLANNER_SYSTEM_PROMPT, build_planner_prompt};
use crate::agent::state::Strategy;
use crate::core::{ExtractedParameters, ResolverContext};
use crate::error::Result;
use crate::extract::parse_json_object;
use crate::fda::Endpoint;
use crate::llm::{ChatMessage, LlmCaller, complete_with_retry};
use crate::usage::UsageTracker;
use serde::Deserialize;
use std::sync::Arc;

/// Known tool names the planner may emit.
pub const KNOWN_TOOLS: &[&str] = &[
    "search_classifications",
    "search_510k",
    "search_pma",
    "search_recalls",
    "search_events",
    "search_udi",
    "search_registrations",
    "probe_count",
    "resolve_device",
    "resolve_manufacturer",
    "resolve_location",
];

/// One call the planner scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCall {
    /// Tool name, one of [`KNOWN_TOOLS`].
    pub tool: String,
    /// Aggregation endpoint, for `probe_count`.
    pub endpoint: Option<Endpoint>,
    /// Aggregation field, for `probe_count`.
    pub count_field: Option<String>,
    /// Arguments, extraction-filled then planner-overridden.
    pub params: ExtractedParameters,
}

/// The planner's output for one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Chosen strategy.
    pub strategy: Strategy,
    /// Scheduled calls, in plan order.
    pub calls: Vec<PlannedCall>,
    /// A single clarifying question, when the planner cannot proceed.
    pub clarification: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    strategy: Option<String>,
    #[serde(default)]
    calls: Vec<RawCall>,
    #[serde(default)]
    clarification: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCall {
    tool: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    count_field: Option<String>,
    #[serde(default)]
    params: ExtractedParameters,
}

/// The PLAN node.
pub struct Planner {
    llm: Arc<dyn LlmCaller>,
    model: String,
}

impl Planner {
    /// Creates a planner bound to the planning model.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmCaller>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Produces a plan for the question.
    ///
    /// `feedback` carries the assessor's insufficiency reason on a
    /// re-plan. Never fails on LLM trouble: the deterministic fallback
    /// routes to the strongest retrieval hint.
    ///
    /// # Errors
    ///
    /// Currently infallible beyond panics in serde; kept fallible for
    /// symmetry with the other nodes.
    pub async fn plan(
        &self,
        question: &str,
        extracted: &ExtractedParameters,
        context: &ResolverContext,
        hints: &[Endpoint],
        feedback: Option<&str>,
        usage: &UsageTracker,
    ) -> Result<Plan> {
        let messages = [
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user(build_planner_prompt(
                question, extracted, context, hints, feedback,
            )),
        ];

        let raw = match complete_with_retry(&*self.llm, &self.model, &messages, true).await {
            Ok(completion) => {
                usage.record(&self.model, completion.usage);
                match parse_json_object::<RawPlan>(&completion.content) {
                    Ok(raw) => Some(raw),
                    Err(err) => {
                        tracing::warn!(error = %err, "planner output unparseable, using fallback route");
                        None
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "planner LLM unavailable, using fallback route");
                None
            }
        };

        Ok(raw.map_or_else(
            || fallback_plan(extracted, hints),
            |raw| resolve_plan(raw, extracted, hints),
        ))
    }
}

/// Validates and materializes a raw plan; degenerate plans fall back.
fn resolve_plan(raw: RawPlan, extracted: &ExtractedParameters, hints: &[Endpoint]) -> Plan {
    if let Some(clarification) = raw.clarification
        && !clarification.trim().is_empty()
    {
        return Plan {
            strategy: raw
                .strategy
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Strategy::Broad),
            calls: Vec::new(),
            clarification: Some(clarification),
        };
    }

    let strategy = raw
        .strategy
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Strategy::Broad);

    let calls: Vec<PlannedCall> = raw
        .calls
        .into_iter()
        .filter_map(|call| {
            if !KNOWN_TOOLS.contains(&call.tool.as_str()) {
                tracing::warn!(tool = %call.tool, "planner named an unknown tool, dropping");
                return None;
            }
            // Extraction fills the gaps the planner left
            let mut params = extracted.clone();
            params.merge_from(&call.params);
            Some(PlannedCall {
                tool: call.tool,
                endpoint: call.endpoint.and_then(|e| e.parse().ok()),
                count_field: call.count_field,
                params,
            })
        })
        .collect();

    if calls.is_empty() {
        return fallback_plan(extracted, hints);
    }

    Plan {
        strategy,
        calls,
        clarification: None,
    }
}

/// Deterministic fallback: one search against the strongest hint
/// endpoint (classification when nothing hinted), extraction parameters
/// passed through.
fn fallback_plan(extracted: &ExtractedParameters, hints: &[Endpoint]) -> Plan {
    let endpoint = hints.first().copied().unwrap_or(Endpoint::Classification);
    let tool = match endpoint {
        Endpoint::Classification => "search_classifications",
        Endpoint::Clearance510k => "search_510k",
        Endpoint::Pma => "search_pma",
        Endpoint::Enforcement => "search_recalls",
        Endpoint::Event => "search_events",
        Endpoint::Udi => "search_udi",
        Endpoint::RegistrationListing => "search_registrations",
    };
    Plan {
        strategy: Strategy::Broad,
        calls: vec![PlannedCall {
            tool: tool.to_string(),
            endpoint: None,
            count_field: None,
            params: extracted.clone(),
        }],
        clarification: None,
    }
}
