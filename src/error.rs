//! Error types for agent operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! agent operations including transport, storage, extraction, the LLM
//! callers and the controller itself.
//!
//! Tool-level failures are carried as values inside `ToolCall` (see
//! [`crate::core::provenance`]); only controller-level conditions
//! terminate an episode through these types.

use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for agent operations.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport errors (network, timeout, rate limiting, openFDA 4xx/5xx).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Storage-related errors (database operations, sessions).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// LLM provider errors (unavailable, structured-output parse failure).
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Parameter validation errors (malformed dates, identifiers).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Controller-level errors (usage cap, deadline, busy session).
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl Error {
    /// Returns a stable machine-readable code for this error.
    ///
    /// Carried in structured error responses so callers can branch
    /// without parsing display strings.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Storage(StorageError::SessionNotFound { .. }) => "session_not_found",
            Self::Storage(_) => "storage_error",
            Self::Llm(_) => "llm_error",
            Self::Validation(_) => "validation_error",
            Self::Agent(AgentError::UsageCapExceeded { .. }) => "usage_cap_exceeded",
            Self::Agent(AgentError::TurnDeadlineExceeded { .. }) => "turn_deadline_exceeded",
            Self::Agent(AgentError::SessionBusy { .. }) => "session_busy",
            Self::Agent(AgentError::Cancelled) => "cancelled",
            Self::Config { .. } => "config_error",
        }
    }
}

/// HTTP transport errors for openFDA calls.
///
/// Retryable conditions (429, 5xx, timeouts) are retried inside the
/// transport and surface here only once the retry budget is exhausted.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Request timed out after the configured read timeout.
    #[error("request timed out: {url}")]
    Timeout {
        /// URL of the timed-out request.
        url: String,
    },

    /// Connection could not be established.
    #[error("connection failed: {url}: {reason}")]
    Connect {
        /// URL of the failed request.
        url: String,
        /// Underlying failure description.
        reason: String,
    },

    /// 429 responses persisted past the retry budget.
    #[error("rate limited after {attempts} attempts")]
    RateLimited {
        /// Number of attempts made.
        attempts: u32,
    },

    /// 4xx response other than 429. Never retried.
    #[error("client request rejected ({status}): {message}")]
    ClientRequest {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// 5xx responses persisted past the retry budget.
    #[error("server error ({status}) after {attempts} attempts")]
    Server {
        /// HTTP status code of the final attempt.
        status: u16,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Response body could not be decoded into the expected shape.
    #[error("invalid response: {reason}")]
    InvalidResponse {
        /// Description of the decode failure.
        reason: String,
    },
}

/// Storage-specific errors for database and session operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Storage not initialized (init command not run).
    #[error("agent store not initialized. Run: openfda-agent init")]
    NotInitialized,

    /// Session not found by id. Returned as a 404-equivalent to callers.
    #[error("session not found: {id}")]
    SessionNotFound {
        /// Session id that was not found.
        id: String,
    },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Embedding generation error.
    #[error("embedding error: {0}")]
    Embedding(String),
}

/// LLM caller errors.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Provider returned an error or was unreachable.
    #[error("provider error: {reason}")]
    Provider {
        /// Description of the provider failure.
        reason: String,
    },

    /// Structured output could not be parsed after the retry.
    #[error("structured output parse failure: {reason}")]
    ParseFailure {
        /// Description of the parse failure.
        reason: String,
    },

    /// No API key configured for a provider that requires one.
    #[error("missing API key for provider: {provider}")]
    MissingApiKey {
        /// Provider name.
        provider: String,
    },

    /// Provider returned an empty completion.
    #[error("provider returned an empty completion")]
    EmptyCompletion,
}

/// Parameter validation errors from the extractor and tools.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Date could not be normalized to YYYYMMDD.
    #[error("invalid date: {input}")]
    InvalidDate {
        /// The rejected input.
        input: String,
    },

    /// Product code is not three uppercase letters.
    #[error("invalid product code: {input}")]
    InvalidProductCode {
        /// The rejected input.
        input: String,
    },

    /// K-number is not `K` followed by six digits.
    #[error("invalid 510(k) number: {input}")]
    InvalidKNumber {
        /// The rejected input.
        input: String,
    },

    /// PMA number is not `P` followed by six digits.
    #[error("invalid PMA number: {input}")]
    InvalidPmaNumber {
        /// The rejected input.
        input: String,
    },

    /// A tool was invoked without any of its required parameters.
    #[error("{tool} requires at least one of: {required}")]
    MissingFilter {
        /// Tool name.
        tool: &'static str,
        /// Human-readable list of acceptable parameters.
        required: &'static str,
    },

    /// A field value failed a tool-specific constraint.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Reason the value was rejected.
        reason: String,
    },
}

/// Controller-level errors that short-circuit an episode.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Session spend reached the configured cap; no LLM call was made.
    #[error("usage cap exceeded: ${spent_usd:.2} of ${limit_usd:.2} limit")]
    UsageCapExceeded {
        /// Amount already spent in USD.
        spent_usd: f64,
        /// Configured limit in USD.
        limit_usd: f64,
    },

    /// The per-turn deadline elapsed; nothing was persisted.
    #[error("turn deadline of {seconds}s exceeded")]
    TurnDeadlineExceeded {
        /// The configured deadline in seconds.
        seconds: u64,
    },

    /// A turn is already running on this session.
    #[error("session busy: {id}")]
    SessionBusy {
        /// Session id with an in-flight turn.
        id: String,
    },

    /// The caller cancelled the episode.
    #[error("episode cancelled")]
    Cancelled,
}

// Implement From traits for library errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map_or_else(String::new, std::string::ToString::to_string);
        if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_connect() {
            Self::Connect {
                url,
                reason: err.to_string(),
            }
        } else {
            Self::InvalidResponse {
                reason: err.to_string(),
            }
        }
    }
}
