//! LLM provider abstraction.
//!
//! A single capability interface erases provider differences: the
//! OpenAI-compatible providers (openai, openrouter, ollama) share one
//! wire module, Anthropic's messages API gets its own. Provider
//! selection is a runtime configuration key.
//!
//! Failure policy (shared by all call sites): one retry, then the
//! caller's conservative fallback — the planner falls back to the
//! highest RAG hint, the guardrail passes the draft through unchanged.

mod anthropic;
mod openai;

pub use anthropic::AnthropicCaller;
pub use openai::OpenAiCompatCaller;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound on completion length requested from providers.
pub const MAX_COMPLETION_TOKENS: u32 = 4096;

/// Wire-level message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions.
    System,
    /// User content.
    User,
    /// Prior assistant output.
    Assistant,
}

impl ChatRole {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One wire-level chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt-side tokens.
    pub input_tokens: u64,
    /// Completion-side tokens.
    pub output_tokens: u64,
}

/// One completed LLM call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Completion text.
    pub content: String,
    /// Token accounting for this call.
    pub usage: TokenUsage,
}

/// The provider capability interface.
#[async_trait]
pub trait LlmCaller: Send + Sync {
    /// Completes a conversation. When `json_output` is set, the
    /// provider is asked for a JSON object response where the wire
    /// protocol supports it.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::error::LlmError`] variant on provider or
    /// decode failure.
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        json_output: bool,
    ) -> Result<Completion>;

    /// Provider name for logging and cost attribution.
    fn provider_name(&self) -> &'static str;
}

/// Builds the configured provider's caller.
///
/// # Errors
///
/// Returns a configuration error for providers this build cannot reach
/// (bedrock) or when a required API key is absent.
pub fn build_caller(config: &LlmConfig) -> Result<Arc<dyn LlmCaller>> {
    match config.provider {
        LlmProvider::Openai | LlmProvider::Openrouter | LlmProvider::Ollama => Ok(Arc::new(
            OpenAiCompatCaller::from_config(config)?,
        )),
        LlmProvider::Anthropic => Ok(Arc::new(AnthropicCaller::from_config(config)?)),
        LlmProvider::Bedrock => Err(Error::Config {
            message: "llm.provider = bedrock is recognized but not wired in this build; \
                      use openrouter, openai, anthropic or ollama"
                .to_string(),
        }),
    }
}

/// Calls the provider with the one-retry policy applied.
///
/// # Errors
///
/// Returns the second failure when both attempts fail.
pub async fn complete_with_retry(
    caller: &dyn LlmCaller,
    model: &str,
    messages: &[ChatMessage],
    json_output: bool,
) -> Result<Completion> {
    match caller.complete(model, messages, json_output).await {
        Ok(completion) => Ok(completion),
        Err(first) => {
            tracing::warn!(provider = caller.provider_name(), error = %first, "llm call failed, retrying once");
            caller.complete(model, messages, json_output).await
        }
    }
}
