//! The ANSWER node.
//!
//! Drafts the response: LLM prose grounded in the tool outputs, a
//! compact table of key records (at most 10 rows), and the provenance
//! block. When the drafting model is unavailable the prose degrades to
//! a deterministic summary; the table and provenance never depend on
//! the LLM.

use crate::agent::prompt::{ANSWER_SYSTEM_PROMPT, build_answer_prompt};
use crate::agent::state::AgentState;
use crate::core::{Provenance, ToolCall};
use crate::error::Result;
use crate::llm::{ChatMessage, LlmCaller, complete_with_retry};
use crate::usage::UsageTracker;
use std::fmt::Write;
use std::sync::Arc;

/// Maximum record rows rendered in the answer.
const MAX_ROWS: usize = 10;

/// Candidate JSON paths for each rendered column, first hit wins.
const COLUMN_PATHS: &[(&str, &[&str])] = &[
    (
        "record",
        &[
            "/device_name",
            "/trade_name",
            "/product_description",
            "/device/0/generic_name",
            "/brand_name",
            "/products/0/openfda/device_name",
            "/term",
        ],
    ),
    (
        "firm",
        &[
            "/applicant",
            "/recalling_firm",
            "/company_name",
            "/device/0/manufacturer_d_name",
            "/registration/name",
        ],
    ),
    (
        "id",
        &[
            "/k_number",
            "/pma_number",
            "/product_code",
            "/recall_number",
            "/report_number",
            "/registration/fei_number",
        ],
    ),
    (
        "date/class",
        &[
            "/decision_date",
            "/recall_initiation_date",
            "/date_received",
            "/device_class",
            "/classification",
            "/count",
        ],
    ),
];

/// The ANSWER node.
pub struct AnswerBuilder {
    llm: Arc<dyn LlmCaller>,
    model: String,
}

impl AnswerBuilder {
    /// Creates the answer node bound to the drafting model.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmCaller>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Drafts the answer body (prose + record table). The provenance
    /// block is appended after the guardrail pass by the controller.
    ///
    /// # Errors
    ///
    /// Currently infallible: LLM failure degrades to the deterministic
    /// draft.
    pub async fn draft(
        &self,
        question: &str,
        state: &AgentState,
        usage: &UsageTracker,
    ) -> Result<String> {
        let messages = [
            ChatMessage::system(ANSWER_SYSTEM_PROMPT),
            ChatMessage::user(build_answer_prompt(question, &state.tool_calls)),
        ];

        let prose = match complete_with_retry(&*self.llm, &self.model, &messages, false).await {
            Ok(completion) => {
                usage.record(&self.model, completion.usage);
                let trimmed = completion.content.trim().to_string();
                if trimmed.is_empty() {
                    fallback_prose(state)
                } else {
                    trimmed
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "answer drafting failed, using deterministic summary");
                fallback_prose(state)
            }
        };

        let table = render_rows(&state.tool_calls);
        let mut draft = prose;
        if !table.is_empty() {
            draft.push_str("\n\n");
            draft.push_str(&table);
        }
        Ok(draft)
    }
}

/// Deterministic prose for when the drafting model is unreachable.
#[must_use]
pub fn fallback_prose(state: &AgentState) -> String {
    let total = state.result_total();
    let endpoints: Vec<&str> = state
        .tool_calls
        .iter()
        .filter(|call| call.result.is_some())
        .map(|call| call.tool_name.as_str())
        .collect();
    if endpoints.is_empty() {
        "No tool produced results for this question.".to_string()
    } else if total == 0 {
        format!(
            "No matching records were found ({}).",
            endpoints.join(", ")
        )
    } else {
        format!(
            "{total} matching records were found across {}.",
            endpoints.join(", ")
        )
    }
}

/// Renders up to [`MAX_ROWS`] key records as a compact pipe table.
#[must_use]
pub fn render_rows(tool_calls: &[ToolCall]) -> String {
    let records: Vec<&serde_json::Value> = tool_calls
        .iter()
        .filter_map(|call| call.result.as_ref())
        .flat_map(|result| result.results.iter())
        .take(MAX_ROWS)
        .collect();

    if records.is_empty() {
        return String::new();
    }

    let mut table = String::new();
    let headers: Vec<&str> = COLUMN_PATHS.iter().map(|(label, _)| *label).collect();
    let _ = writeln!(table, "| {} |", headers.join(" | "));
    let _ = writeln!(
        table,
        "|{}|",
        headers.iter().map(|_| "---").collect::<Vec<_>>().join("|")
    );

    for record in records {
        let cells: Vec<String> = COLUMN_PATHS
            .iter()
            .map(|(_, paths)| {
                paths
                    .iter()
                    .find_map(|path| record.pointer(path))
                    .map_or_else(String::new, render_cell)
            })
            .collect();
        let _ = writeln!(table, "| {} |", cells.join(" | "));
    }
    table
}

fn render_cell(value: &serde_json::Value) -> String {
    let cell = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    cell.chars().take(60).collect::<String>().replace('|', "/")
}

/// Renders the provenance block appended to every answer.
#[must_use]
pub fn render_provenance(provenance: &Provenance) -> String {
    let mut block = String::from("---\nSources:\n");
    let _ = writeln!(
        block,
        "- endpoint: {} | query: {} | results: {} | last updated: {}",
        if provenance.endpoint.is_empty() {
            "none"
        } else {
            &provenance.endpoint
        },
        if provenance.query_expression.is_empty() {
            "-"
        } else {
            &provenance.query_expression
        },
        provenance.result_count,
        provenance.last_updated.as_deref().unwrap_or("unknown"),
    );
    for call in &provenance.tool_calls {
        match &call.error {
            Some(failure) => {
                let _ = writeln!(
                    block,
                    "- {}: FAILED ({}: {})",
                    call.tool_name, failure.kind, failure.reason
                );
            }
            None => {
                if let Some(result) = &call.result {
                    let _ = writeln!(
                        block,
                        "- {}: {} records ({})",
                        call.tool_name, result.meta.total, result.query_expression
                    );
                }
            }
        }
    }
    if provenance.retries > 0 {
        let _ = writeln!(block, "- re-plans: {}", provenance.retries);
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExtractedParameters, ResultMeta, ToolResult};

    fn call_with_records(tool: &str, records: Vec<serde_json::Value>, total: u64) -> ToolCall {
        ToolCall::begin(tool, ExtractedParameters::default()).succeed(ToolResult {
            endpoint: tool.to_string(),
            query_expression: "device_class:2".to_string(),
            meta: ResultMeta {
                total,
                last_updated: Some("2026-07-01".to_string()),
                ..ResultMeta::default()
            },
            results: records,
            structured: None,
        })
    }

    #[test]
    fn test_render_rows_caps_at_ten() {
        let records: Vec<serde_json::Value> = (0..25)
            .map(|i| serde_json::json!({"device_name": format!("device {i}")}))
            .collect();
        let table = render_rows(&[call_with_records("search_classifications", records, 25)]);
        // Header + separator + 10 rows
        assert_eq!(table.lines().count(), 12);
        assert!(table.contains("device 0"));
        assert!(!table.contains("device 10"));
    }

    #[test]
    fn test_render_rows_empty() {
        assert!(render_rows(&[call_with_records("search_510k", Vec::new(), 0)]).is_empty());
    }

    #[test]
    fn test_render_rows_column_candidates() {
        let record = serde_json::json!({
            "product_description": "Infusion pump",
            "recalling_firm": "Acme Medical",
            "recall_number": "Z-1234-2026",
            "classification": "Class I"
        });
        let table = render_rows(&[call_with_records("search_recalls", vec![record], 1)]);
        assert!(table.contains("Infusion pump"));
        assert!(table.contains("Acme Medical"));
        assert!(table.contains("Z-1234-2026"));
        assert!(table.contains("Class I"));
    }

    #[test]
    fn test_fallback_prose_variants() {
        let empty = AgentState::default();
        assert!(fallback_prose(&empty).contains("No tool produced results"));

        let zero = AgentState {
            tool_calls: vec![call_with_records("search_recalls", Vec::new(), 0)],
            ..AgentState::default()
        };
        assert!(fallback_prose(&zero).contains("No matching records"));

        let some = AgentState {
            tool_calls: vec![call_with_records(
                "search_recalls",
                vec![serde_json::json!({})],
                7,
            )],
            ..AgentState::default()
        };
        assert!(fallback_prose(&some).contains("7 matching records"));
    }

    #[test]
    fn test_render_provenance_lists_failures() {
        let failed = ToolCall::begin("search_events", ExtractedParameters::default())
            .fail("transport_error", "connection refused");
        let ok = call_with_records("search_recalls", vec![serde_json::json!({})], 3);
        let provenance = Provenance::from_tool_calls(vec![failed, ok], 1);
        let block = render_provenance(&provenance);
        assert!(block.contains("search_events: FAILED (transport_error"));
        assert!(block.contains("search_recalls: 3 records"));
        assert!(block.contains("re-plans: 1"));
        assert!(block.contains("last updated: 2026-07-01"));
    }
}
