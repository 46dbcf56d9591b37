//! The GUARD node: LLM guardrail over the drafted answer.
//!
//! A single pass, never a loop, and it never raises: any failure mode
//! (provider down, empty rewrite, suspiciously short rewrite) keeps the
//! draft. The keep-draft rule: the rewrite is discarded when it is
//! empty or shorter than 40% of the draft's length.

use crate::agent::prompt::{GUARDRAIL_SYSTEM_PROMPT, build_guardrail_prompt};
use crate::core::{ResolverContext, ToolCall};
use crate::llm::{ChatMessage, LlmCaller, complete_with_retry};
use crate::usage::UsageTracker;
use std::sync::Arc;

/// Minimum rewrite length relative to the draft.
const MIN_REWRITE_RATIO: f64 = 0.4;

/// The GUARD node.
pub struct Guardrail {
    llm: Arc<dyn LlmCaller>,
    model: String,
}

impl Guardrail {
    /// Creates the guardrail bound to the (possibly smaller) guard
    /// model.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmCaller>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Reviews the draft against the tool outputs. Always returns a
    /// non-empty answer for a non-empty draft.
    pub async fn review(
        &self,
        draft: &str,
        tool_calls: &[ToolCall],
        context: &ResolverContext,
        usage: &UsageTracker,
    ) -> String {
        let messages = [
            ChatMessage::system(GUARDRAIL_SYSTEM_PROMPT),
            ChatMessage::user(build_guardrail_prompt(draft, tool_calls, context)),
        ];

        match complete_with_retry(&*self.llm, &self.model, &messages, false).await {
            Ok(completion) => {
                usage.record(&self.model, completion.usage);
                apply_keep_rule(draft, &completion.content)
            }
            Err(err) => {
                tracing::warn!(error = %err, "guardrail unavailable, passing draft through");
                draft.to_string()
            }
        }
    }
}

/// Keeps the draft when the rewrite is empty or shorter than 40% of the
/// draft's length.
#[allow(clippy::cast_precision_loss)]
fn apply_keep_rule(draft: &str, rewrite: &str) -> String {
    let rewrite = rewrite.trim();
    if rewrite.is_empty() || (rewrite.len() as f64) < (draft.len() as f64) * MIN_REWRITE_RATIO {
        draft.to_string()
    } else {
        rewrite.to_string()
    }
}
