//! HTTP transport for openFDA.
//!
//! One pooled client per process. Handles API-key injection, the
//! documented rate limits (240 requests/minute with a key, 40 without),
//! and the retry policy: 429 and 5xx retry with exponential backoff and
//! jitter honoring `Retry-After`; timeouts and connection errors retry
//! once; other 4xx surface immediately. A 404 is the endpoint's
//! "no matching records" shape and decodes to an empty response.

use crate::config::OpenFdaConfig;
use crate::error::{AgentError, Error, Result, TransportError};
use crate::fda::endpoint::{DEFAULT_BASE_URL, Endpoint};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Documented openFDA rate limit with an API key.
const REQUESTS_PER_MINUTE_WITH_KEY: NonZeroU32 = NonZeroU32::new(240).unwrap();

/// Documented openFDA rate limit without an API key.
const REQUESTS_PER_MINUTE_ANONYMOUS: NonZeroU32 = NonZeroU32::new(40).unwrap();

/// Initial backoff interval for retryable responses.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Connect timeout for the pooled client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A raw HTTP exchange result, before policy is applied.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Retry-After` header value in seconds, when present.
    pub retry_after_secs: Option<u64>,
    /// Response body.
    pub body: String,
}

/// Seam between retry policy and the wire.
///
/// The production implementation is [`ReqwestSender`]; tests substitute
/// scripted senders.
#[async_trait]
pub trait HttpSend: Send + Sync {
    /// Issues one GET and returns the raw outcome. Policy (retries,
    /// status handling) lives above this seam.
    async fn send(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// Pooled `reqwest`-backed sender.
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    /// Builds the pooled client with connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TLS backend cannot be
    /// initialized.
    pub fn new(read_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(read_timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()
            .map_err(|e| Error::Config {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpSend for ReqwestSender {
    async fn send(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> std::result::Result<TransportResponse, TransportError> {
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await?;
        Ok(TransportResponse {
            status,
            retry_after_secs,
            body,
        })
    }
}

/// Pagination metadata inside `meta.results`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FdaPageMeta {
    /// Offset of the first returned record.
    #[serde(default)]
    pub skip: u64,
    /// Page size.
    #[serde(default)]
    pub limit: u64,
    /// Total matching records.
    #[serde(default)]
    pub total: u64,
}

/// The `meta` object every endpoint returns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FdaMeta {
    /// Dataset freshness stamp.
    #[serde(default)]
    pub last_updated: Option<String>,
    /// Pagination metadata; absent on aggregation responses.
    #[serde(default)]
    pub results: Option<FdaPageMeta>,
}

/// A decoded endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FdaResponse {
    /// Response metadata.
    #[serde(default)]
    pub meta: FdaMeta,
    /// Records, or `{term, count}` pairs for aggregation queries.
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

/// Query-string parameters for one endpoint request.
#[derive(Debug, Clone, Default)]
pub struct FdaQuery {
    /// Filter expression.
    pub search: Option<String>,
    /// Aggregation field (mutually exclusive with pagination in
    /// practice; openFDA ignores `skip` on counts).
    pub count: Option<String>,
    /// Page size.
    pub limit: Option<u32>,
    /// Page offset.
    pub skip: Option<u32>,
}

impl FdaQuery {
    /// Renders the request parameters, injecting the API key when
    /// configured.
    #[must_use]
    pub fn params(&self, api_key: Option<&str>) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(search) = &self.search {
            params.push(("search".to_string(), search.clone()));
        }
        if let Some(count) = &self.count {
            params.push(("count".to_string(), count.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(skip) = self.skip {
            params.push(("skip".to_string(), skip.to_string()));
        }
        if let Some(key) = api_key {
            params.push(("api_key".to_string(), key.to_string()));
        }
        params
    }
}

/// The shared openFDA client: pooled sender + retry policy + pacing.
///
/// Cheap to clone behind an [`Arc`]; safe to call concurrently from the
/// dispatcher's parallel tool tasks.
pub struct FdaClient {
    sender: Arc<dyn HttpSend>,
    api_key: Option<String>,
    max_retries: u32,
    base_url: String,
    backoff_base: Duration,
    limiter: DefaultDirectRateLimiter,
}

impl FdaClient {
    /// Builds the production client from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &OpenFdaConfig) -> Result<Self> {
        let sender = ReqwestSender::new(Duration::from_secs(config.timeout_seconds))?;
        Ok(Self::with_sender(
            Arc::new(sender),
            config.api_key.clone(),
            config.max_retries,
            DEFAULT_BASE_URL,
        ))
    }

    /// Builds a client over an arbitrary sender and base URL.
    #[must_use]
    pub fn with_sender(
        sender: Arc<dyn HttpSend>,
        api_key: Option<String>,
        max_retries: u32,
        base_url: &str,
    ) -> Self {
        let rate = if api_key.is_some() {
            REQUESTS_PER_MINUTE_WITH_KEY
        } else {
            REQUESTS_PER_MINUTE_ANONYMOUS
        };
        Self {
            sender,
            api_key,
            max_retries,
            base_url: base_url.to_string(),
            backoff_base: BACKOFF_BASE,
            limiter: RateLimiter::direct(Quota::per_minute(rate)),
        }
    }

    /// Overrides the exponential backoff base interval.
    #[must_use]
    pub const fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Issues one endpoint request, applying pacing and the retry
    /// policy, and decodes the response.
    ///
    /// A 404 decodes to an empty [`FdaResponse`]; that is the endpoint's
    /// no-matching-records shape, not an error.
    ///
    /// # Errors
    ///
    /// Returns transport errors once the retry budget is exhausted, a
    /// client-request error for non-429 4xx responses, or a cancellation
    /// error when the token fires.
    pub async fn fetch(
        &self,
        endpoint: Endpoint,
        query: &FdaQuery,
        cancel: &CancellationToken,
    ) -> Result<FdaResponse> {
        let url = endpoint.url(&self.base_url);
        let params = query.params(self.api_key.as_deref());

        let mut attempts: u32 = 0;
        let mut transport_retried = false;

        loop {
            attempts += 1;
            tokio::select! {
                () = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
                () = self.limiter.until_ready() => {}
            }

            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(AgentError::Cancelled.into()),
                outcome = self.sender.send(&url, &params) => outcome,
            };

            match outcome {
                Ok(response) => match response.status {
                    200 => {
                        return serde_json::from_str(&response.body).map_err(|e| {
                            TransportError::InvalidResponse {
                                reason: e.to_string(),
                            }
                            .into()
                        });
                    }
                    404 => return Ok(FdaResponse::default()),
                    429 => {
                        if attempts > self.max_retries {
                            return Err(TransportError::RateLimited { attempts }.into());
                        }
                        let delay = response
                            .retry_after_secs
                            .map_or_else(|| self.backoff_delay(attempts), Duration::from_secs);
                        tracing::warn!(endpoint = %endpoint, attempts, ?delay, "rate limited, backing off");
                        self.sleep_or_cancel(delay, cancel).await?;
                    }
                    status if status >= 500 => {
                        if attempts > self.max_retries {
                            return Err(TransportError::Server { status, attempts }.into());
                        }
                        let delay = self.backoff_delay(attempts);
                        tracing::warn!(endpoint = %endpoint, status, attempts, ?delay, "server error, retrying");
                        self.sleep_or_cancel(delay, cancel).await?;
                    }
                    status => {
                        return Err(TransportError::ClientRequest {
                            status,
                            message: extract_error_message(&response.body),
                        }
                        .into());
                    }
                },
                Err(err @ (TransportError::Timeout { .. } | TransportError::Connect { .. })) => {
                    if transport_retried {
                        return Err(err.into());
                    }
                    transport_retried = true;
                    tracing::warn!(endpoint = %endpoint, error = %err, "transport error, one retry");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Exponential backoff with ±25% jitter: `base * 2^(attempt-1)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(6);
        let base = self.backoff_base * 2_u32.pow(exponent);
        let jitter = rand::rng().random_range(0.75..=1.25);
        base.mul_f64(jitter)
    }

    async fn sleep_or_cancel(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            () = cancel.cancelled() => Err(AgentError::Cancelled.into()),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Pulls the `error.message` field out of an openFDA error body, falling
/// back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")
                .and_then(|m| m.as_str())
                .map(std::string::ToString::to_string)
        })
        .unwrap_or_else(|| {
            let mut raw = body.to_string();
            raw.truncate(200);
            raw
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted sender: pops responses front-to-back, counting calls.
    struct ScriptedSender {
        script: Mutex<Vec<std::result::Result<TransportResponse, TransportError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSender {
        fn new(script: Vec<std::result::Result<TransportResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpSend for ScriptedSender {
        async fn send(
            &self,
            _url: &str,
            _params: &[(String, String)],
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().remove(0)
        }
    }

    fn ok_response(body: &str) -> TransportResponse {
        TransportResponse {
            status: 200,
            retry_after_secs: None,
            body: body.to_string(),
        }
    }

    fn status_response(status: u16) -> TransportResponse {
        TransportResponse {
            status,
            retry_after_secs: None,
            body: String::new(),
        }
    }

    fn client(sender: Arc<ScriptedSender>) -> FdaClient {
        FdaClient::with_sender(sender, None, 3, "http://test")
            .with_backoff_base(Duration::from_millis(1))
    }

    const BODY: &str = r#"{
        "meta": {"last_updated": "2026-07-01", "results": {"skip": 0, "limit": 10, "total": 42}},
        "results": [{"device_name": "mask"}]
    }"#;

    #[tokio::test]
    async fn test_success_decodes() {
        let sender = Arc::new(ScriptedSender::new(vec![Ok(ok_response(BODY))]));
        let client = client(Arc::clone(&sender));
        let response = client
            .fetch(
                Endpoint::Classification,
                &FdaQuery::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.meta.results.unwrap().total, 42);
        assert_eq!(sender.calls(), 1);
    }

    #[tokio::test]
    async fn test_404_is_empty_not_error() {
        let sender = Arc::new(ScriptedSender::new(vec![Ok(TransportResponse {
            status: 404,
            retry_after_secs: None,
            body: r#"{"error": {"code": "NOT_FOUND", "message": "No matches found!"}}"#.to_string(),
        })]));
        let client = client(Arc::clone(&sender));
        let response = client
            .fetch(
                Endpoint::Enforcement,
                &FdaQuery::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert!(response.meta.results.is_none());
    }

    #[tokio::test]
    async fn test_429_retries_once_then_succeeds() {
        let sender = Arc::new(ScriptedSender::new(vec![
            Ok(TransportResponse {
                status: 429,
                retry_after_secs: Some(0),
                body: String::new(),
            }),
            Ok(ok_response(BODY)),
        ]));
        let client = client(Arc::clone(&sender));
        let response = client
            .fetch(
                Endpoint::Event,
                &FdaQuery::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(sender.calls(), 2, "exactly one retry");
    }

    #[tokio::test]
    async fn test_429_exhausts_budget() {
        let script = (0..4)
            .map(|_| {
                Ok(TransportResponse {
                    status: 429,
                    retry_after_secs: Some(0),
                    body: String::new(),
                })
            })
            .collect();
        let sender = Arc::new(ScriptedSender::new(script));
        let client = client(Arc::clone(&sender));
        let err = client
            .fetch(
                Endpoint::Event,
                &FdaQuery::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::RateLimited { attempts: 4 })
        ));
        assert_eq!(sender.calls(), 4, "initial attempt plus three retries");
    }

    #[tokio::test]
    async fn test_4xx_not_retried() {
        let sender = Arc::new(ScriptedSender::new(vec![Ok(TransportResponse {
            status: 400,
            retry_after_secs: None,
            body: r#"{"error": {"code": "BAD_REQUEST", "message": "bad search"}}"#.to_string(),
        })]));
        let client = client(Arc::clone(&sender));
        let err = client
            .fetch(
                Endpoint::Pma,
                &FdaQuery::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            Error::Transport(TransportError::ClientRequest { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad search");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sender.calls(), 1);
    }

    #[tokio::test]
    async fn test_5xx_retries_then_surfaces() {
        let script = (0..4).map(|_| Ok(status_response(503))).collect();
        let sender = Arc::new(ScriptedSender::new(script));
        let client = client(Arc::clone(&sender));
        let err = client
            .fetch(
                Endpoint::Udi,
                &FdaQuery::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Server {
                status: 503,
                attempts: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_timeout_retries_once() {
        let sender = Arc::new(ScriptedSender::new(vec![
            Err(TransportError::Timeout {
                url: "http://test".to_string(),
            }),
            Err(TransportError::Timeout {
                url: "http://test".to_string(),
            }),
        ]));
        let client = client(Arc::clone(&sender));
        let err = client
            .fetch(
                Endpoint::Classification,
                &FdaQuery::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Timeout { .. })
        ));
        assert_eq!(sender.calls(), 2, "one transport retry only");
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let sender = Arc::new(ScriptedSender::new(vec![Ok(ok_response(BODY))]));
        let client = client(Arc::clone(&sender));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .fetch(Endpoint::Classification, &FdaQuery::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::Cancelled)));
        assert_eq!(sender.calls(), 0);
    }

    #[test]
    fn test_query_params_inject_api_key() {
        let query = FdaQuery {
            search: Some("device_class:2".to_string()),
            count: None,
            limit: Some(5),
            skip: Some(0),
        };
        let params = query.params(Some("secret"));
        assert!(params.contains(&("search".to_string(), "device_class:2".to_string())));
        assert!(params.contains(&("api_key".to_string(), "secret".to_string())));

        let anonymous = query.params(None);
        assert!(!anonymous.iter().any(|(k, _)| k == "api_key"));
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error": {"code": "X", "message": "boom"}}"#),
            "boom"
        );
        assert_eq!(extract_error_message("plain text"), "plain text");
    }

    #[test]
    fn test_backoff_grows_with_jitter_bounds() {
        let sender = Arc::new(ScriptedSender::new(vec![]));
        let client = FdaClient::with_sender(sender, None, 3, "http://test");
        for attempt in 1..=3 {
            let base = BACKOFF_BASE * 2_u32.pow(attempt - 1);
            let delay = client.backoff_delay(attempt);
            assert!(delay >= base.mul_f64(0.75) && delay <= base.mul_f64(1.25));
        }
    }
}
