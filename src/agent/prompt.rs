//! System prompts and template builders for the agent nodes.
//!
//! Prompts are the core instructions that define each node's behavior.
//! Template builders format the user messages with question context,
//! retrieval hints and tool output digests.

use crate::core::{ExtractedParameters, ResolverContext, ToolCall};
use crate::fda::Endpoint;
use std::fmt::Write;

/// System prompt for the planner node.
pub const PLANNER_SYSTEM_PROMPT: &str = r#"You plan tool calls for an agent over the U.S. FDA's openFDA device datasets and a local GUDID device catalog.

## Tools

- "search_classifications": device types by class/product code/regulation. Params: product_code, device_class, device_name, regulation_number, limit
- "search_510k": 510(k) clearances. Params: k_number, applicant, device_name, product_code, date_start, date_end, limit
- "search_pma": premarket approvals. Params: pma_number, applicant, device_name, product_code, date_start, date_end, limit
- "search_recalls": enforcement reports. Params: firm_name, device_name, recall_class, country, date_start, date_end, limit. NO product_code parameter exists here.
- "search_events": MAUDE adverse events. Params: device_name, firm_name, product_code, country, event_type, date_start, date_end, limit. At least one of device_name/product_code/country/firm_name is required.
- "search_udi": GUDID records. Params: device_name, firm_name, udi, limit
- "search_registrations": establishments/listings. Params: firm_name, device_name, product_code, country, state, fei_number, limit
- "probe_count": aggregation. Set "endpoint" and "count_field"; optional params become the filter. Use when the user asks how many / which are most common.
- "resolve_device": map a device term to product codes via the local catalog. Params: device_name
- "resolve_manufacturer": normalize a company name to FDA variants. Params: firm_name
- "resolve_location": classify a geographic term and survey manufacturers there. Params: country (or state), optionally device_name

## Strategies

- "exact": the question names an identifier (K123456, P970004, product code)
- "category": browse by class or device type
- "broad": keyword search without strong structure
- "count": the intent is counting or distribution, use probe_count
- "safety_dossier": safety question about a specific product code; plan search_recalls + search_events + search_classifications together
- "cross_reference": resolver output feeds a search (e.g. resolve_device then search_events)

## Output

Return a single JSON object:

{
  "strategy": "exact" | "category" | "broad" | "count" | "safety_dossier" | "cross_reference",
  "calls": [
    {"tool": "search_recalls", "params": {"recall_class": "Class I"}},
    {"tool": "probe_count", "endpoint": "classification", "count_field": "device_class", "params": {}}
  ],
  "clarification": null
}

Rules:
- Prefer one call; plan several only when the strategy needs them.
- recall_class values are the strings "Class I", "Class II", "Class III"; device_class is 1, 2 or 3.
- Dates are YYYYMMDD.
- Use resolver tools before a search when the question uses vocabulary the endpoints will not match (colloquial device names, ambiguous companies, regions).
- If the question is unanswerable without more information, set "clarification" to ONE question and leave "calls" empty.
- Return ONLY the JSON object."#;

/// System prompt for the answer-drafting node.
pub const ANSWER_SYSTEM_PROMPT: &str = r"You write grounded answers about FDA medical device data.

You receive a question and the tool outputs the agent collected. Write a direct prose answer (2-5 sentences) that answers the question using ONLY facts present in the tool outputs.

- Lead with the direct answer (the count, the finding, the record).
- Mention totals when the tool output reports more records than shown.
- If the tool outputs are empty, say plainly that no matching records were found and name the filters used.
- No markdown headers, no bullet lists; the surrounding system renders records separately.
- Never invent record fields, counts or dates.";

/// System prompt for the guardrail node.
pub const GUARDRAIL_SYSTEM_PROMPT: &str = r"You are a factual-grounding reviewer for answers about FDA device data.

You receive a draft answer, the tool outputs it must be grounded in, and resolver context. Rewrite the draft so that:

- Every factual sentence is supported by the tool outputs or resolver context.
- Any claim you cannot support is replaced with a statement that the data is not available.
- Supported content keeps its wording where possible; do not add new facts.

Return ONLY the reviewed answer text, never an empty reply.";

/// Builds the planner's user message.
#[must_use]
pub fn build_planner_prompt(
    question: &str,
    extracted: &ExtractedParameters,
    context: &ResolverContext,
    hints: &[Endpoint],
    feedback: Option<&str>,
) -> String {
    let mut prompt = format!("<question>{question}</question>\n");

    let extracted_json = serde_json::to_string(extracted).unwrap_or_else(|_| "{}".to_string());
    let _ = writeln!(prompt, "<extracted>{extracted_json}</extracted>");

    let low = extracted.low_confidence_fields();
    if !low.is_empty() {
        let _ = writeln!(prompt, "<low_confidence>{}</low_confidence>", low.join(", "));
    }

    let context_summary = context.summary();
    if !context_summary.is_empty() {
        let _ = writeln!(
            prompt,
            "<resolver_context>\n{context_summary}</resolver_context>"
        );
    }

    if !hints.is_empty() {
        let labels: Vec<&str> = hints.iter().map(|e| e.path()).collect();
        let _ = writeln!(
            prompt,
            "<endpoint_hints>{}</endpoint_hints>",
            labels.join(", ")
        );
    }

    if let Some(feedback) = feedback {
        let _ = writeln!(prompt, "<previous_attempt>{feedback}</previous_attempt>");
    }

    prompt.push_str("Plan the tool calls.");
    prompt
}

/// Renders a compact digest of tool outputs for the answer and
/// guardrail prompts. Record lists truncate to keep the prompt bounded.
#[must_use]
pub fn tool_output_digest(tool_calls: &[ToolCall]) -> String {
    let mut digest = String::new();
    for call in tool_calls {
        match (&call.result, &call.error) {
            (Some(result), _) => {
                let _ = writeln!(
                    digest,
                    "<tool name=\"{}\" query=\"{}\" total=\"{}\" last_updated=\"{}\">",
                    call.tool_name,
                    result.query_expression,
                    result.meta.total,
                    result.meta.last_updated.as_deref().unwrap_or("unknown"),
                );
                for record in result.results.iter().take(10) {
                    let rendered = serde_json::to_string(record).unwrap_or_default();
                    let compact: String = rendered.chars().take(400).collect();
                    let _ = writeln!(digest, "{compact}");
                }
                if let Some(structured) = &result.structured {
                    let rendered = serde_json::to_string(structured).unwrap_or_default();
                    let compact: String = rendered.chars().take(800).collect();
                    let _ = writeln!(digest, "<structured>{compact}</structured>");
                }
                digest.push_str("</tool>\n");
            }
            (None, Some(failure)) => {
                let _ = writeln!(
                    digest,
                    "<tool name=\"{}\" failed=\"{}\">{}</tool>",
                    call.tool_name, failure.kind, failure.reason
                );
            }
            (None, None) => {}
        }
    }
    digest
}

/// Builds the answer-drafting user message.
#[must_use]
pub fn build_answer_prompt(question: &str, tool_calls: &[ToolCall]) -> String {
    format!(
        "<question>{question}</question>\n\n<tool_outputs>\n{}</tool_outputs>\n\nWrite the grounded answer.",
        tool_output_digest(tool_calls)
    )
}

/// Builds the guardrail user message.
#[must_use]
pub fn build_guardrail_prompt(
    draft: &str,
    tool_calls: &[ToolCall],
    context: &ResolverContext,
) -> String {
    let mut prompt = format!(
        "<draft>\n{draft}\n</draft>\n\n<tool_outputs>\n{}</tool_outputs>\n",
        tool_output_digest(tool_calls)
    );
    let summary = context.summary();
    if !summary.is_empty() {
        let _ = writeln!(prompt, "<resolver_context>\n{summary}</resolver_context>");
    }
    prompt.push_str("Review the draft.");
    prompt
}
