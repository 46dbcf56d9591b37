//! OpenAI-compatible chat-completions caller.
//!
//! Serves openai, openrouter and ollama; they share the
//! `/chat/completions` wire shape and differ only in base URL and
//! whether a key is required.

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{LlmError, Result};
use crate::llm::{ChatMessage, Completion, LlmCaller, MAX_COMPLETION_TOKENS, TokenUsage};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Caller for `/chat/completions`-shaped providers.
pub struct OpenAiCompatCaller {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    provider: &'static str,
}

impl OpenAiCompatCaller {
    /// Builds the caller from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the provider requires a key
    /// and none is configured, or the HTTP client cannot be built.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let (default_base, provider, key_required) = match config.provider {
            LlmProvider::Openai => (OPENAI_BASE_URL, "openai", true),
            LlmProvider::Openrouter => (OPENROUTER_BASE_URL, "openrouter", true),
            _ => (OLLAMA_BASE_URL, "ollama", false),
        };

        if key_required && config.api_key.is_none() {
            return Err(LlmError::MissingApiKey {
                provider: provider.to_string(),
            }
            .into());
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| crate::error::Error::Config {
                message: format!("cannot build LLM HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string()),
            api_key: config.api_key.clone(),
            provider,
        })
    }
}

/// Builds the chat-completions request body.
fn build_request_body(model: &str, messages: &[ChatMessage], json_output: bool) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": MAX_COMPLETION_TOKENS,
        "temperature": 0.1,
    });
    if json_output {
        body["response_format"] = json!({"type": "json_object"});
    }
    body
}

/// Extracts the completion and usage from a response body.
fn parse_response(body: &Value) -> Result<Completion> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or(LlmError::EmptyCompletion)?
        .to_string();

    let usage = TokenUsage {
        input_tokens: body
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        output_tokens: body
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    };

    Ok(Completion { content, usage })
}

#[async_trait]
impl LlmCaller for OpenAiCompatCaller {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        json_output: bool,
    ) -> Result<Completion> {
        let body = build_request_body(model, messages, json_output);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| LlmError::Provider {
            reason: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::Provider {
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(LlmError::Provider {
                reason: format!("{} returned {status}: {text}", self.provider),
            }
            .into());
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| LlmError::Provider {
            reason: format!("invalid response JSON: {e}"),
        })?;
        parse_response(&value)
    }

    fn provider_name(&self) -> &'static str {
        self.provider
    }
}
