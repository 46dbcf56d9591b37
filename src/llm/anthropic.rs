//! Anthropic messages-API caller.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::{ChatMessage, ChatRole, Completion, LlmCaller, MAX_COMPLETION_TOKENS, TokenUsage};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Caller for the Anthropic `/v1/messages` API.
pub struct AnthropicCaller {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicCaller {
    /// Builds the caller from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no API key is configured or
    /// the HTTP client cannot be built.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| LlmError::MissingApiKey {
            provider: "anthropic".to_string(),
        })?;

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
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
            api_key,
        })
    }
}

/// Builds the messages-API request body.
///
/// System messages fold into the top-level `system` field; the
/// conversation keeps only user/assistant turns. When JSON output is
/// requested the instruction is appended to the system text (the
/// messages API has no response-format switch).
fn build_request_body(model: &str, messages: &[ChatMessage], json_output: bool) -> Value {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut conversation: Vec<Value> = Vec::new();

    for message in messages {
        match message.role {
            ChatRole::System => system_parts.push(&message.content),
            ChatRole::User | ChatRole::Assistant => conversation.push(json!({
                "role": message.role.as_str(),
                "content": message.content,
            })),
        }
    }

    let mut system = system_parts.join("\n\n");
    if json_output {
        if !system.is_empty() {
            system.push_str("\n\n");
        }
        system.push_str("Respond with a single JSON object and nothing else.");
    }

    let mut body = json!({
        "model": model,
        "max_tokens": MAX_COMPLETION_TOKENS,
        "messages": conversation,
    });
    if !system.is_empty() {
        body["system"] = json!(system);
    }
    body
}

/// Extracts the completion and usage from a response body.
fn parse_response(body: &Value) -> Result<Completion> {
    let content = body
        .pointer("/content/0/text")
        .and_then(Value::as_str)
        .ok_or(LlmError::EmptyCompletion)?
        .to_string();

    let usage = TokenUsage {
        input_tokens: body
            .pointer("/usage/input_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        output_tokens: body
            .pointer("/usage/output_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    };

    Ok(Completion { content, usage })
}

#[async_trait]
impl LlmCaller for AnthropicCaller {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        json_output: bool,
    ) -> Result<Completion> {
        let body = build_request_body(model, messages, json_output);
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::Provider {
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(LlmError::Provider {
                reason: format!("anthropic returned {status}: {text}"),
            }
            .into());
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| LlmError::Provider {
            reason: format!("invalid response JSON: {e}"),
        })?;
        parse_response(&value)
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    #[test]
    fn test_build_request_body_splits_system() {
        let messages = vec![
            ChatMessage::system("you are an FDA agent"),
            ChatMessage::user("Any recalls?"),
            ChatMessage::assistant("Checking."),
        ];
        let body = build_request_body("claude-sonnet-4-5", &messages, false);
        assert_eq!(body["system"], "you are an FDA agent");
        let conversation = body["messages"].as_array().unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0]["role"], "user");
        assert_eq!(conversation[1]["role"], "assistant");
    }

    #[test]
    fn test_build_request_body_json_instruction() {
        let body = build_request_body("m", &[ChatMessage::user("plan")], true);
        assert!(
            body["system"]
                .as_str()
                .unwrap()
                .contains("single JSON object")
        );
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "content": [{"type": "text", "text": "3 recalls found"}],
            "usage": {"input_tokens": 200, "output_tokens": 12}
        });
        let completion = parse_response(&body).unwrap();
        assert_eq!(completion.content, "3 recalls found");
        assert_eq!(completion.usage.input_tokens, 200);
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = LlmConfig {
            provider: LlmProvider::Anthropic,
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(AnthropicCaller::from_config(&config).is_err());
    }
}
