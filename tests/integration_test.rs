//! End-to-end episodes over a scripted LLM and a mocked openFDA
//! transport, plus the HTTP retry-law checks against a live wiremock
//! server.

use async_trait::async_trait;
use openfda_agent::agent::{Agent, AgentEvent};
use openfda_agent::config::Config;
use openfda_agent::core::CatalogDevice;
use openfda_agent::error::TransportError;
use openfda_agent::fda::{Endpoint, FdaClient, FdaQuery, HttpSend, ReqwestSender, TransportResponse};
use openfda_agent::llm::{ChatMessage, ChatRole, Completion, LlmCaller, TokenUsage};
use openfda_agent::storage::SqliteStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// ==================== Scripted LLM ====================

/// Routes completions by the system prompt of each call; each role's
/// script repeats, so repeated questions replay identically.
struct RoutedLlm {
    extraction: Vec<String>,
    planner: Vec<String>,
    answer: Vec<String>,
    guard: Vec<String>,
    extraction_calls: AtomicUsize,
    planner_calls: AtomicUsize,
    answer_calls: AtomicUsize,
    guard_calls: AtomicUsize,
}

impl RoutedLlm {
    fn new(
        extraction: Vec<&str>,
        planner: Vec<&str>,
        answer: Vec<&str>,
        guard: Vec<&str>,
    ) -> Arc<Self> {
        let own = |v: Vec<&str>| v.into_iter().map(String::from).collect();
        Arc::new(Self {
            extraction: own(extraction),
            planner: own(planner),
            answer: own(answer),
            guard: own(guard),
            extraction_calls: AtomicUsize::new(0),
            planner_calls: AtomicUsize::new(0),
            answer_calls: AtomicUsize::new(0),
            guard_calls: AtomicUsize::new(0),
        })
    }

    fn pick(script: &[String], counter: &AtomicUsize) -> String {
        let index = counter.fetch_add(1, Ordering::SeqCst);
        script
            .get(index % script.len().max(1))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmCaller for RoutedLlm {
    async fn complete(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        _json_output: bool,
    ) -> openfda_agent::Result<Completion> {
        let system = messages
            .iter()
            .find(|m| m.role == ChatRole::System)
            .map_or("", |m| m.content.as_str());

        let content = if system.contains("extract search parameters") {
            Self::pick(&self.extraction, &self.extraction_calls)
        } else if system.contains("plan tool calls") {
            Self::pick(&self.planner, &self.planner_calls)
        } else if system.contains("grounded answers") {
            Self::pick(&self.answer, &self.answer_calls)
        } else {
            Self::pick(&self.guard, &self.guard_calls)
        };

        Ok(Completion {
            content,
            usage: TokenUsage {
                input_tokens: 50,
                output_tokens: 20,
            },
        })
    }

    fn provider_name(&self) -> &'static str {
        "routed-mock"
    }
}

// ==================== Mocked openFDA transport ====================

/// Replays canned bodies per endpoint path and records every request.
struct MockFda {
    bodies: HashMap<&'static str, String>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl MockFda {
    fn new(bodies: &[(&'static str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            bodies: bodies
                .iter()
                .map(|(path, body)| (*path, (*body).to_string()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn searches_for(&self, path: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.contains(path))
            .map(|(_, params)| {
                params
                    .iter()
                    .find(|(k, _)| k == "search")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[async_trait]
impl HttpSend for MockFda {
    async fn send(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), params.to_vec()));
        let body = self
            .bodies
            .iter()
            .find(|(path, _)| url.contains(*path))
            .map(|(_, body)| body.clone());
        match body {
            Some(body) => Ok(TransportResponse {
                status: 200,
                retry_after_secs: None,
                body,
            }),
            None => Ok(TransportResponse {
                status: 404,
                retry_after_secs: None,
                body: r#"{"error": {"code": "NOT_FOUND", "message": "No matches found!"}}"#
                    .to_string(),
            }),
        }
    }
}

fn classification_body(total: u64, rows: usize) -> String {
    let results: Vec<serde_json::Value> = (0..rows)
        .map(|i| {
            serde_json::json!({
                "device_name": format!("Device {i}"),
                "device_class": "2",
                "product_code": "FXX"
            })
        })
        .collect();
    serde_json::json!({
        "meta": {
            "last_updated": "2026-07-01",
            "results": {"skip": 0, "limit": rows, "total": total}
        },
        "results": results
    })
    .to_string()
}

fn event_body(total: u64) -> String {
    serde_json::json!({
        "meta": {
            "last_updated": "2026-06-15",
            "results": {"skip": 0, "limit": 10, "total": total}
        },
        "results": [{
            "event_type": "Malfunction",
            "device": [{
                "generic_name": "pacemaker",
                "manufacturer_d_name": "PULSEWORKS",
                "manufacturer_d_country": "CN"
            }]
        }]
    })
    .to_string()
}

// ==================== Agent assembly ====================

fn agent_with(llm: Arc<RoutedLlm>, fda: Arc<MockFda>, seed_catalog: bool) -> Agent {
    agent_with_config(llm, fda, seed_catalog, Config::default())
}

fn agent_with_config(
    llm: Arc<RoutedLlm>,
    fda: Arc<MockFda>,
    seed_catalog: bool,
    config: Config,
) -> Agent {
    let mut store = SqliteStore::in_memory().unwrap();
    store.init().unwrap();
    if seed_catalog {
        store
            .insert_devices(&[CatalogDevice {
                id: None,
                brand_name: "CardioPace 3000".to_string(),
                company_name: "PulseWorks".to_string(),
                description: "Implantable cardiac pacemaker".to_string(),
                product_code: "DXY".to_string(),
                gmdn_term: None,
                identifier: None,
            }])
            .unwrap();
    }

    let client = FdaClient::with_sender(fda, None, 3, "http://mock")
        .with_backoff_base(Duration::from_millis(1));
    Agent::assemble(config, Arc::new(Mutex::new(store)), llm, Arc::new(client)).unwrap()
}

// ==================== End-to-end scenarios ====================

#[tokio::test(flavor = "multi_thread")]
async fn e2e_class_two_devices() {
    // "Show me 5 Class II devices" routes to classifications with
    // device_class=2 and limit=5
    let llm = RoutedLlm::new(
        vec![r#"{"device_class": 2, "limit": 5}"#],
        vec![
            r#"{"strategy": "category", "calls": [{"tool": "search_classifications", "params": {"limit": 5}}]}"#,
        ],
        vec!["There are 3000 Class II device types; the first 5 are shown."],
        vec!["There are 3000 Class II device types; the first 5 are shown."],
    );
    let fda = MockFda::new(&[("classification.json", &classification_body(3000, 5))]);
    let agent = agent_with(llm, Arc::clone(&fda), false);

    let answer = agent.ask(None, "Show me 5 Class II devices").await.unwrap();

    assert_eq!(answer.provenance.endpoint, "classification");
    assert!(answer.provenance.query_expression.contains("device_class:2"));
    assert_eq!(answer.provenance.result_count, 3000);
    assert_eq!(answer.provenance.last_updated.as_deref(), Some("2026-07-01"));
    assert!(answer.answer.contains("Class II"));
    assert!(answer.answer.contains("Sources:"), "provenance block present");
    assert!(answer.usage.tokens_in > 0);

    let searches = fda.searches_for("classification.json");
    assert_eq!(searches, vec!["device_class:2"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_exact_k_number_not_found() {
    // "Show me K123456" with no matching record is a valid empty answer
    let llm = RoutedLlm::new(
        vec![r#"{"k_number": "K123456"}"#],
        vec![
            r#"{"strategy": "exact", "calls": [{"tool": "search_510k", "params": {"k_number": "K123456"}}]}"#,
        ],
        vec!["No 510(k) record was found for K123456."],
        vec!["No 510(k) record was found for K123456."],
    );
    // No 510k body mounted: the mock answers 404
    let fda = MockFda::new(&[]);
    let agent = agent_with(llm, Arc::clone(&fda), false);

    let answer = agent.ask(None, "Show me K123456").await.unwrap();
    assert_eq!(answer.provenance.endpoint, "510k");
    assert_eq!(answer.provenance.result_count, 0);
    assert!(answer.answer.contains("K123456"));
    assert_eq!(fda.searches_for("510k.json"), vec!["k_number:K123456"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_device_resolution_feeds_events() {
    // "Adverse events for pacemakers from Chinese manufacturers":
    // resolve_device maps pacemaker -> DXY, search_events gets the code
    // and the ISO country
    let llm = RoutedLlm::new(
        vec![r#"{"device_name": "pacemakers", "country": "China"}"#],
        vec![
            r#"{"strategy": "cross_reference", "calls": [
                {"tool": "resolve_device", "params": {"device_name": "pacemaker"}},
                {"tool": "search_events", "params": {"country": "China"}}
            ]}"#,
        ],
        vec!["There are 12 adverse event reports for pacemakers from Chinese manufacturers."],
        vec!["There are 12 adverse event reports for pacemakers from Chinese manufacturers."],
    );
    let fda = MockFda::new(&[("event.json", &event_body(12))]);
    let agent = agent_with(llm, Arc::clone(&fda), true);

    let answer = agent
        .ask(None, "Adverse events for pacemakers from Chinese manufacturers")
        .await
        .unwrap();

    // Both tool calls appear in provenance
    let tools: Vec<&str> = answer
        .provenance
        .tool_calls
        .iter()
        .map(|c| c.tool_name.as_str())
        .collect();
    assert_eq!(tools, vec!["resolve_device", "search_events"]);

    // Country rendered as ISO code, product code injected from resolution
    let searches = fda.searches_for("event.json");
    assert_eq!(searches.len(), 1);
    assert!(searches[0].contains("device.manufacturer_d_country:CN"));
    assert!(searches[0].contains("device.device_report_product_code:DXY"));

    // Resolver context rode into the structured payload
    let structured = answer.structured_data.unwrap();
    assert!(structured["devices"]["product_codes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|code| code == "DXY"));
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_count_strategy() {
    // "How many Class III devices are there?" aggregates device_class
    let llm = RoutedLlm::new(
        vec![r#"{"device_class": 3}"#],
        vec![
            r#"{"strategy": "count", "calls": [{"tool": "probe_count", "endpoint": "classification", "count_field": "device_class", "params": {}}]}"#,
        ],
        vec!["There are 420 Class III device types."],
        vec!["There are 420 Class III device types."],
    );
    let count_body = serde_json::json!({
        "meta": {"last_updated": "2026-07-01"},
        "results": [{"term": "3", "count": 420}]
    })
    .to_string();
    let fda = MockFda::new(&[("classification.json", &count_body)]);
    let agent = agent_with(llm, Arc::clone(&fda), false);

    let answer = agent
        .ask(None, "How many Class III devices are there?")
        .await
        .unwrap();
    assert!(answer.answer.contains("420"));
    assert!(answer.answer.contains("2026-07-01"));
    let structured = answer.structured_data.unwrap();
    assert_eq!(structured[0]["term"], "3");
    assert_eq!(structured[0]["count"], 420);
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_budget_holds() {
    // The question is temporal but neither the extractor nor the
    // planner ever supplies a date range, so every assessment is
    // insufficient; the planner may run at most retry.max + 1 = 3 times
    let llm = RoutedLlm::new(
        vec![r#"{"firm_name": "Acme"}"#],
        vec![r#"{"strategy": "broad", "calls": [{"tool": "search_recalls", "params": {"firm_name": "Acme"}}]}"#],
        vec!["Recall search results for Acme."],
        vec!["Recall search results for Acme."],
    );
    let recall_body = serde_json::json!({
        "meta": {"last_updated": "2026-07-01", "results": {"skip": 0, "limit": 10, "total": 2}},
        "results": [{"recalling_firm": "Acme"}, {"recalling_firm": "Acme Medical"}]
    })
    .to_string();
    let fda = MockFda::new(&[("enforcement.json", &recall_body)]);
    let agent = agent_with(Arc::clone(&llm), fda, false);

    let answer = agent.ask(None, "Recent recalls from Acme").await.unwrap();
    assert_eq!(llm.planner_calls.load(Ordering::SeqCst), 3);
    assert_eq!(answer.provenance.retries, 2);
    assert_eq!(answer.provenance.tool_calls.len(), 3, "one dispatch per plan");
}

#[tokio::test(flavor = "multi_thread")]
async fn idempotent_reads_same_session() {
    let build_llm = || {
        RoutedLlm::new(
            vec![r#"{"recall_class": "Class I"}"#],
            vec![
                r#"{"strategy": "category", "calls": [{"tool": "search_recalls", "params": {"recall_class": "Class I"}}]}"#,
            ],
            vec!["There are 2 Class I recalls."],
            vec!["There are 2 Class I recalls."],
        )
    };
    let recall_body = serde_json::json!({
        "meta": {"last_updated": "2026-07-01", "results": {"skip": 0, "limit": 10, "total": 2}},
        "results": [{"recalling_firm": "Acme", "classification": "Class I"}]
    })
    .to_string();
    let fda = MockFda::new(&[("enforcement.json", &recall_body)]);
    let agent = agent_with(build_llm(), Arc::clone(&fda), false);

    let first = agent.ask(None, "Any Class I recalls?").await.unwrap();
    let second = agent
        .ask(Some(&first.session_id), "Any Class I recalls?")
        .await
        .unwrap();

    assert_eq!(first.answer, second.answer);
    assert_eq!(first.provenance.endpoint, second.provenance.endpoint);
    assert_eq!(
        first.provenance.query_expression,
        second.provenance.query_expression
    );
    assert_eq!(first.provenance.result_count, second.provenance.result_count);
    assert!(
        first
            .provenance
            .query_expression
            .contains("classification:\"Class I\"")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn resolver_context_replaced_per_resolution() {
    let llm = RoutedLlm::new(
        vec![r#"{"device_name": "pacemaker"}"#],
        vec![
            r#"{"strategy": "cross_reference", "calls": [{"tool": "resolve_device", "params": {}}]}"#,
        ],
        vec!["Resolved."],
        vec!["Resolved."],
    );
    let fda = MockFda::new(&[]);
    let agent = agent_with(llm, fda, true);

    let first = agent.ask(None, "what is a pacemaker").await.unwrap();
    let record = agent.sessions().load(&first.session_id).unwrap();
    assert_eq!(
        record.resolver_context.devices.as_ref().unwrap().query,
        "pacemaker"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn streaming_emits_lifecycle_events() {
    let llm = RoutedLlm::new(
        vec![r#"{"device_class": 2, "limit": 5}"#],
        vec![
            r#"{"strategy": "category", "calls": [{"tool": "search_classifications", "params": {}}]}"#,
        ],
        vec!["Class II devices are shown."],
        vec!["Class II devices are shown."],
    );
    let fda = MockFda::new(&[("classification.json", &classification_body(10, 5))]);
    let agent = Arc::new(agent_with(llm, fda, false));

    let mut receiver = agent.ask_stream(None, "Show me 5 Class II devices".to_string());
    let mut kinds = Vec::new();
    while let Some(event) = receiver.recv().await {
        kinds.push(match event {
            AgentEvent::Start { .. } => "start",
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::Complete { .. } => "complete",
            AgentEvent::Error { .. } => "error",
        });
    }
    assert_eq!(kinds.first(), Some(&"start"));
    assert_eq!(kinds.last(), Some(&"complete"));
    assert!(kinds.contains(&"tool_call"));
    assert!(kinds.contains(&"tool_result"));
}

#[tokio::test(flavor = "multi_thread")]
async fn clarification_terminates_episode() {
    let llm = RoutedLlm::new(
        vec![r"{}"],
        vec![r#"{"strategy": "broad", "calls": [], "clarification": "Which manufacturer do you mean?"}"#],
        vec!["unused"],
        vec!["unused"],
    );
    let fda = MockFda::new(&[]);
    let agent = agent_with(Arc::clone(&llm), fda, false);

    let answer = agent.ask(None, "show me their recalls").await.unwrap();
    assert_eq!(answer.answer, "Which manufacturer do you mean?");
    assert!(answer.provenance.tool_calls.is_empty());
    assert_eq!(llm.planner_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn operator_passphrase_extends_limit() {
    let llm = RoutedLlm::new(
        vec![r#"{"device_class": 2}"#],
        vec![
            r#"{"strategy": "category", "calls": [{"tool": "search_classifications", "params": {}}]}"#,
        ],
        vec!["Class II devices are shown."],
        vec!["Class II devices are shown."],
    );
    let fda = MockFda::new(&[("classification.json", &classification_body(10, 5))]);
    let mut config = Config::default();
    config.usage.override_passphrase = Some("sesame".to_string());
    let agent = agent_with_config(llm, fda, false, config);

    let answer = agent.ask(None, "Show me Class II devices").await.unwrap();
    let id = answer.session_id;

    assert!(!agent.extend_session_limit(&id, "wrong").unwrap());
    assert!(agent.extend_session_limit(&id, "sesame").unwrap());
    let record = agent.sessions().load(&id).unwrap();
    assert!((record.usage.limit_usd - 25.0).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_discards_partial_results() {
    let llm = RoutedLlm::new(
        vec![r#"{"device_class": 2, "limit": 5}"#],
        vec![
            r#"{"strategy": "category", "calls": [{"tool": "search_classifications", "params": {}}]}"#,
        ],
        vec!["unused"],
        vec!["unused"],
    );
    let fda = MockFda::new(&[("classification.json", &classification_body(10, 5))]);
    let agent = agent_with(llm, fda, false);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = agent
        .ask_with_cancel(None, "Show me 5 Class II devices", cancel)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "cancelled");

    // The session exists but the cancelled turn persisted nothing
    let sessions = agent.sessions().list().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].message_count, 0);
}

// ==================== HTTP retry law (wiremock) ====================

#[tokio::test(flavor = "multi_thread")]
async fn http_retry_law_429_then_200() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/classification.json"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("Retry-After", "1"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/classification.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(classification_body(1, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let sender = ReqwestSender::new(Duration::from_secs(5)).unwrap();
    let client = FdaClient::with_sender(Arc::new(sender), None, 3, &server.uri());

    let started = Instant::now();
    let response = client
        .fetch(
            Endpoint::Classification,
            &FdaQuery {
                search: Some("device_class:2".to_string()),
                count: None,
                limit: Some(1),
                skip: None,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "slept at least the advertised Retry-After"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn http_4xx_surfaces_body_message() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            r#"{"error": {"code": "BAD_REQUEST", "message": "search syntax error"}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let sender = ReqwestSender::new(Duration::from_secs(5)).unwrap();
    let client = FdaClient::with_sender(Arc::new(sender), None, 3, &server.uri());

    let err = client
        .fetch(
            Endpoint::Enforcement,
            &FdaQuery::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    match err {
        openfda_agent::Error::Transport(TransportError::ClientRequest { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "search syntax error");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
