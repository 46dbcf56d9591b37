//! Tool-call records and answer provenance.
//!
//! Every endpoint tool returns the normalized [`ToolResult`] envelope;
//! failures are carried as values inside [`ToolCall`] so the rest of a
//! dispatch iteration can complete. Every assistant answer ships a
//! [`Provenance`] block naming the endpoint, the composed filter
//! expression, the result count and the dataset's `last_updated` stamp.

use super::context::{LocationContext, ManufacturerGroup, ResolvedDevices};
use super::params::ExtractedParameters;
use serde::{Deserialize, Serialize};

/// Pagination and freshness metadata from an endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMeta {
    /// Total matching records on the endpoint.
    pub total: u64,
    /// Offset of the first returned record.
    pub skip: u64,
    /// Requested page size.
    pub limit: u64,
    /// Dataset freshness stamp as reported by openFDA.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// One `{term, count}` pair from an aggregation query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCount {
    /// Aggregated term value.
    pub term: String,
    /// Record count for this term.
    pub count: u64,
}

/// Tool-specific typed aggregate carried alongside raw records.
///
/// Discriminated by tool kind; resolvers and `probe_count` populate it,
/// the dispatcher merges resolver variants into the shared
/// [`super::ResolverContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "data", rename_all = "snake_case")]
pub enum StructuredResult {
    /// Device resolution output.
    Devices(ResolvedDevices),
    /// Manufacturer groupings.
    Manufacturers(Vec<ManufacturerGroup>),
    /// Location resolution output.
    Location(LocationContext),
    /// Aggregation counts from `probe_count`.
    Counts(Vec<TermCount>),
}

/// Normalized envelope returned by every endpoint tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Endpoint or resolver name.
    pub endpoint: String,
    /// The composed filter expression, for provenance.
    pub query_expression: String,
    /// Result metadata.
    pub meta: ResultMeta,
    /// Raw records as returned by the endpoint.
    pub results: Vec<serde_json::Value>,
    /// Typed aggregate, when the tool produces one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredResult>,
}

impl ToolResult {
    /// An empty result for an endpoint (the 404-no-matches case).
    #[must_use]
    pub fn empty(endpoint: impl Into<String>, query_expression: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            query_expression: query_expression.into(),
            ..Self::default()
        }
    }
}

/// A captured tool failure: kind + reason, listed in provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// Stable failure kind (an [`crate::error::Error::code`] value).
    pub kind: String,
    /// Human-readable reason.
    pub reason: String,
}

/// One tool invocation within an episode. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Invoked tool name.
    pub tool_name: String,
    /// Arguments the planner passed.
    pub args: ExtractedParameters,
    /// Unix millis when the call started.
    pub started_at: i64,
    /// Unix millis when the call completed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// The result, when the call succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
    /// The failure, when the call did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl ToolCall {
    /// Starts a call record stamped now.
    #[must_use]
    pub fn begin(tool_name: impl Into<String>, args: ExtractedParameters) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            started_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Completes the record with a success.
    #[must_use]
    pub fn succeed(mut self, result: ToolResult) -> Self {
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
        self.result = Some(result);
        self
    }

    /// Completes the record with a failure.
    #[must_use]
    pub fn fail(mut self, kind: impl Into<String>, reason: impl Into<String>) -> Self {
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
        self.error = Some(ToolFailure {
            kind: kind.into(),
            reason: reason.into(),
        });
        self
    }

    /// Number of records in the result, zero on failure.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.results.len())
    }
}

/// Per-answer provenance emitted with every assistant answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Primary endpoint the answer is grounded on.
    pub endpoint: String,
    /// Filter expression sent to that endpoint.
    pub query_expression: String,
    /// Total matching records.
    pub result_count: u64,
    /// Dataset freshness stamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Every tool call made during the episode, append-order.
    pub tool_calls: Vec<ToolCall>,
    /// How many re-plans the episode used.
    pub retries: u32,
}

impl Provenance {
    /// Builds provenance from an episode's tool calls.
    ///
    /// The primary endpoint is the first successful search call; failed
    /// calls stay listed with their failure kind and reason.
    #[must_use]
    pub fn from_tool_calls(tool_calls: Vec<ToolCall>, retries: u32) -> Self {
        let primary = tool_calls
            .iter()
            .find(|call| call.result.is_some())
            .and_then(|call| call.result.as_ref());

        let (endpoint, query_expression, result_count, last_updated) = primary.map_or_else(
            || (String::new(), String::new(), 0, None),
            |result| {
                (
                    result.endpoint.clone(),
                    result.query_expression.clone(),
                    result.meta.total,
                    result.meta.last_updated.clone(),
                )
            },
        );

        Self {
            endpoint,
            query_expression,
            result_count,
            last_updated,
            tool_calls,
            retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(endpoint: &str, total: u64) -> ToolResult {
        ToolResult {
            endpoint: endpoint.to_string(),
            query_expression: "device_class:2".to_string(),
            meta: ResultMeta {
                total,
                skip: 0,
                limit: 10,
                last_updated: Some("2026-07-01".to_string()),
            },
            results: vec![serde_json::json!({"device_name": "mask"})],
            structured: None,
        }
    }

    #[test]
    fn test_tool_call_lifecycle() {
        let call = ToolCall::begin("search_classifications", ExtractedParameters::default());
        assert!(call.completed_at.is_none());

        let call = call.succeed(sample_result("classification", 42));
        assert!(call.completed_at.is_some());
        assert_eq!(call.result_count(), 1);
        assert!(call.error.is_none());
    }

    #[test]
    fn test_tool_call_failure_is_a_value() {
        let call = ToolCall::begin("search_recalls", ExtractedParameters::default())
            .fail("transport_error", "connection refused");
        assert_eq!(call.result_count(), 0);
        let failure = call.error.unwrap();
        assert_eq!(failure.kind, "transport_error");
        assert!(failure.reason.contains("refused"));
    }

    #[test]
    fn test_provenance_picks_first_success() {
        let failed = ToolCall::begin("search_recalls", ExtractedParameters::default())
            .fail("transport_error", "timeout");
        let succeeded = ToolCall::begin("search_classifications", ExtractedParameters::default())
            .succeed(sample_result("classification", 42));

        let provenance = Provenance::from_tool_calls(vec![failed, succeeded], 1);
        assert_eq!(provenance.endpoint, "classification");
        assert_eq!(provenance.result_count, 42);
        assert_eq!(provenance.retries, 1);
        assert_eq!(provenance.tool_calls.len(), 2);
        assert!(provenance.tool_calls[0].error.is_some());
    }

    #[test]
    fn test_provenance_all_failed() {
        let failed = ToolCall::begin("search_recalls", ExtractedParameters::default())
            .fail("transport_error", "timeout");
        let provenance = Provenance::from_tool_calls(vec![failed], 0);
        assert!(provenance.endpoint.is_empty());
        assert_eq!(provenance.result_count, 0);
    }

    #[test]
    fn test_structured_result_tagged_serde() {
        let structured = StructuredResult::Counts(vec![TermCount {
            term: "2".to_string(),
            count: 1234,
        }]);
        let json = serde_json::to_string(&structured).unwrap();
        assert!(json.contains("\"tool\":\"counts\""));
        let back: StructuredResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, structured);
    }
}
