//! The ASSESS node: deterministic sufficiency checks.
//!
//! Layer 1 of the answer assessor. Decides whether the collected
//! results actually answer the question or whether the planner should
//! try again (within the retry budget). Tool completion order is
//! irrelevant; the records are treated as a set.

use crate::agent::state::{AgentState, Strategy};
use crate::extract::{ClassIntent, classify_class_intent, has_class_token, has_temporal_token};

/// The assessor's verdict for one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Whether the results suffice to answer.
    pub sufficient: bool,
    /// Why (also the feedback handed back to the planner).
    pub reason: String,
}

impl Assessment {
    fn ok(reason: &str) -> Self {
        Self {
            sufficient: true,
            reason: reason.to_string(),
        }
    }

    fn insufficient(reason: &str) -> Self {
        Self {
            sufficient: false,
            reason: reason.to_string(),
        }
    }
}

/// Runs the deterministic sufficiency check.
#[must_use]
pub fn assess(question: &str, state: &AgentState) -> Assessment {
    // A populated safety dossier answers the question even when the
    // individual endpoints came back empty
    if state.strategy == Some(Strategy::SafetyDossier) && state.successful_calls() >= 2 {
        return Assessment::ok("safety dossier assembled");
    }

    // The question names a class but no class filter was extracted
    if has_class_token(question) {
        let missing = match classify_class_intent(question) {
            ClassIntent::Recall => state.extracted.recall_class.is_none(),
            ClassIntent::Device => state.extracted.device_class.is_none(),
        };
        if missing {
            return Assessment::insufficient("missing class filter");
        }
    }

    // The question is temporal but no date range was extracted
    if has_temporal_token(question)
        && state.extracted.date_start.is_none()
        && state.extracted.date_end.is_none()
    {
        return Assessment::insufficient("missing date filter");
    }

    if state.result_total() == 0 {
        // Zero results with plausible filters is a valid answer; zero
        // results with nothing asked is a failed iteration
        if state.successful_calls() > 0 && !state.extracted.is_empty() {
            return Assessment::ok("no matching records");
        }
        if state.successful_calls() > 0
            && state
                .tool_calls
                .iter()
                .any(|call| call.result.is_some() && !call.args.is_empty())
        {
            return Assessment::ok("no matching records");
        }
        return Assessment::insufficient("no results and no usable filters");
    }

    Assessment::ok("results available")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExtractedParameters, RecallClass, ResultMeta, ToolCall, ToolResult};

    fn successful_call(tool: &str, total: u64, args: ExtractedParameters) -> ToolCall {
        ToolCall::begin(tool, args.clone()).succeed(ToolResult {
            endpoint: tool.to_string(),
            query_expression: "x:y".to_string(),
            meta: ResultMeta {
                total,
                ..ResultMeta::default()
            },
            results: Vec::new(),
            structured: None,
        })
    }

    #[test]
    fn test_missing_recall_class_filter() {
        let state = AgentState {
            tool_calls: vec![successful_call(
                "search_recalls",
                5,
                ExtractedParameters::default(),
            )],
            ..AgentState::default()
        };
        let assessment = assess("Any Class I recalls?", &state);
        assert!(!assessment.sufficient);
        assert_eq!(assessment.reason, "missing class filter");
    }

    #[test]
    fn test_class_filter_present_passes() {
        let params = ExtractedParameters {
            recall_class: Some(RecallClass::ClassI),
            ..Default::default()
        };
        let state = AgentState {
            extracted: params.clone(),
            tool_calls: vec![successful_call("search_recalls", 5, params)],
            ..AgentState::default()
        };
        let assessment = assess("Any Class I recalls?", &state);
        assert!(assessment.sufficient);
    }

    #[test]
    fn test_missing_date_filter() {
        let params = ExtractedParameters {
            applicant: Some("Medtronic".to_string()),
            ..Default::default()
        };
        let state = AgentState {
            extracted: params.clone(),
            tool_calls: vec![successful_call("search_510k", 3, params)],
            ..AgentState::default()
        };
        let assessment = assess("510k clearances from Medtronic since 2023", &state);
        assert!(!assessment.sufficient);
        assert_eq!(assessment.reason, "missing date filter");
    }

    #[test]
    fn test_zero_results_with_plausible_filters_is_valid() {
        let params = ExtractedParameters {
            k_number: Some("K999999".to_string()),
            ..Default::default()
        };
        let state = AgentState {
            extracted: params.clone(),
            tool_calls: vec![successful_call("search_510k", 0, params)],
            ..AgentState::default()
        };
        let assessment = assess("Show me K999999", &state);
        assert!(assessment.sufficient);
        assert_eq!(assessment.reason, "no matching records");
    }

    #[test]
    fn test_zero_results_without_filters_is_insufficient() {
        let state = AgentState {
            tool_calls: vec![successful_call(
                "search_classifications",
                0,
                ExtractedParameters::default(),
            )],
            ..AgentState::default()
        };
        let assessment = assess("show me interesting devices", &state);
        assert!(!assessment.sufficient);
    }

    #[test]
    fn test_device_class_intent_checked_separately() {
        let params = ExtractedParameters {
            device_class: Some(2),
            ..Default::default()
        };
        let state = AgentState {
            extracted: params.clone(),
            tool_calls: vec![successful_call("search_classifications", 10, params)],
            ..AgentState::default()
        };
        let assessment = assess("Show me 5 Class II devices", &state);
        assert!(assessment.sufficient);
    }

    #[test]
    fn test_safety_dossier_sufficient_even_when_empty() {
        let params = ExtractedParameters {
            product_code: Some("DXY".to_string()),
            ..Default::default()
        };
        let state = AgentState {
            extracted: params.clone(),
            strategy: Some(Strategy::SafetyDossier),
            tool_calls: vec![
                successful_call("search_recalls", 0, params.clone()),
                successful_call("search_events", 0, params.clone()),
                successful_call("search_classifications", 0, params),
            ],
            ..AgentState::default()
        };
        let assessment = assess("Is product code DXY safe?", &state);
        assert!(assessment.sufficient);
        assert_eq!(assessment.reason, "safety dossier assembled");
    }

    #[test]
    fn test_results_available() {
        let params = ExtractedParameters {
            device_name: Some("mask".to_string()),
            ..Default::default()
        };
        let state = AgentState {
            extracted: params.clone(),
            tool_calls: vec![successful_call("search_classifications", 12, params)],
            ..AgentState::default()
        };
        let assessment = assess("what masks are classified", &state);
        assert!(assessment.sufficient);
        assert_eq!(assessment.reason, "results available");
    }
}
