//! Runtime configuration.
//!
//! Configuration is loaded from an optional TOML file and then overlaid
//! with environment variables, so deployments can keep secrets out of
//! files. Every recognized key has a default; `Config::load(None)` with
//! no environment yields a fully usable offline configuration (no API
//! key, lower openFDA rate limit).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default openFDA read timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Default HTTP retry budget for retryable responses.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default agent-level re-plan budget (distinct from HTTP retries).
pub const DEFAULT_AGENT_RETRIES: u32 = 2;

/// Default per-turn deadline in seconds.
pub const DEFAULT_TURN_DEADLINE_SECONDS: u64 = 60;

/// Default soft usage cap per session in USD.
pub const DEFAULT_SOFT_CAP_USD: f64 = 1.50;

/// Default hard usage cap per session in USD.
pub const DEFAULT_HARD_CAP_USD: f64 = 25.00;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// openFDA transport settings.
    pub openfda: OpenFdaConfig,
    /// LLM provider settings.
    pub llm: LlmConfig,
    /// Usage cap settings.
    pub usage: UsageConfig,
    /// Session store settings.
    pub session: SessionConfig,
    /// Agent retry settings.
    pub retry: RetryConfig,
    /// Per-turn settings.
    pub turn: TurnConfig,
    /// Region name to country-code memberships for the location resolver.
    ///
    /// Keys are lowercase region names ("europe"); values are ISO 3166-1
    /// alpha-2 codes. Defaults ship for Europe, APAC and North America.
    pub regions: BTreeMap<String, Vec<String>>,
}

/// openFDA transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenFdaConfig {
    /// Optional API key. Absent means the lower anonymous rate limit.
    pub api_key: Option<String>,
    /// Read timeout per request in seconds (1-300).
    pub timeout_seconds: u64,
    /// Retry budget for 429/5xx responses.
    pub max_retries: u32,
}

impl Default for OpenFdaConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenRouter (OpenAI-compatible).
    Openrouter,
    /// OpenAI.
    Openai,
    /// Anthropic messages API.
    Anthropic,
    /// AWS Bedrock. Recognized but not wired in this build.
    Bedrock,
    /// Local Ollama (OpenAI-compatible).
    Ollama,
}

impl LlmProvider {
    /// Returns the lowercase provider name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openrouter => "openrouter",
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Bedrock => "bedrock",
            Self::Ollama => "ollama",
        }
    }
}

/// LLM provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which provider to call.
    pub provider: LlmProvider,
    /// Model used for planning and answer drafting.
    pub model: String,
    /// Optional smaller model for the guardrail pass. Defaults to `model`.
    pub guard_model: Option<String>,
    /// API key for the provider (not needed for ollama).
    pub api_key: Option<String>,
    /// Base URL override (e.g. a local OpenAI-compatible endpoint).
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Openrouter,
            model: "openai/gpt-4o".to_string(),
            guard_model: None,
            api_key: None,
            base_url: None,
        }
    }
}

impl LlmConfig {
    /// Returns the model to use for the guardrail pass.
    #[must_use]
    pub fn guard_model(&self) -> &str {
        self.guard_model.as_deref().unwrap_or(&self.model)
    }
}

/// Usage cap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Soft cap per session in USD; new turns are refused at this spend.
    pub soft_cap_usd: f64,
    /// Ceiling the operator passphrase can extend the limit to.
    pub hard_cap_usd: f64,
    /// Operator passphrase that unlocks the hard cap.
    pub override_passphrase: Option<String>,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            soft_cap_usd: DEFAULT_SOFT_CAP_USD,
            hard_cap_usd: DEFAULT_HARD_CAP_USD,
            override_passphrase: None,
        }
    }
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path to the agent database file.
    pub store_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_url: crate::storage::DEFAULT_DB_PATH.to_string(),
        }
    }
}

/// Agent retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum re-plans per question after an insufficient assessment.
    pub max: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max: DEFAULT_AGENT_RETRIES,
        }
    }
}

/// Per-turn settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Deadline for a whole episode in seconds.
    pub deadline_seconds: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: DEFAULT_TURN_DEADLINE_SECONDS,
        }
    }
}

/// Default region memberships for the location resolver.
///
/// Overridable via the `[regions]` table in the config file.
#[must_use]
pub fn default_regions() -> BTreeMap<String, Vec<String>> {
    let to_codes = |codes: &[&str]| codes.iter().map(|c| (*c).to_string()).collect();
    let mut map = BTreeMap::new();
    map.insert(
        "europe".to_string(),
        to_codes(&[
            "AT", "BE", "BG", "CH", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GB", "GR", "HR",
            "HU", "IE", "IT", "LT", "LU", "LV", "NL", "NO", "PL", "PT", "RO", "SE", "SI", "SK",
        ]),
    );
    map.insert(
        "apac".to_string(),
        to_codes(&[
            "AU", "CN", "HK", "ID", "IN", "JP", "KR", "MY", "NZ", "PH", "SG", "TH", "TW", "VN",
        ]),
    );
    map.insert(
        "north america".to_string(),
        to_codes(&["US", "CA", "MX"]),
    );
    map
}

impl Config {
    /// Loads configuration from an optional TOML file plus environment
    /// overrides, then validates it.
    ///
    /// Environment overrides: `OPENFDA_API_KEY`, `OPENFDA_TIMEOUT_SECONDS`,
    /// `LLM_PROVIDER`, `LLM_MODEL`, `LLM_GUARD_MODEL`, `LLM_API_KEY`,
    /// `LLM_BASE_URL`, `AGENT_DB_PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a value is out of
    /// range.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p).map_err(|e| Error::Config {
                    message: format!("cannot read {}: {e}", p.display()),
                })?;
                toml::from_str(&text).map_err(|e| Error::Config {
                    message: format!("cannot parse {}: {e}", p.display()),
                })?
            }
            _ => Self::default(),
        };

        if config.regions.is_empty() {
            config.regions = default_regions();
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Applies environment-variable overrides.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENFDA_API_KEY") {
            self.openfda.api_key = Some(key);
        }
        if let Ok(secs) = std::env::var("OPENFDA_TIMEOUT_SECONDS")
            && let Ok(parsed) = secs.parse()
        {
            self.openfda.timeout_seconds = parsed;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            let quoted = format!("\"{}\"", provider.to_lowercase());
            if let Ok(parsed) = serde_json::from_str(&quoted) {
                self.llm.provider = parsed;
            }
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(model) = std::env::var("LLM_GUARD_MODEL") {
            self.llm.guard_model = Some(model);
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Ok(path) = std::env::var("AGENT_DB_PATH") {
            self.session.store_url = path;
        }
    }

    /// Validates value ranges.
    fn validate(&self) -> Result<()> {
        if !(1..=300).contains(&self.openfda.timeout_seconds) {
            return Err(Error::Config {
                message: format!(
                    "openfda.timeout_seconds must be 1-300, got {}",
                    self.openfda.timeout_seconds
                ),
            });
        }
        if self.usage.soft_cap_usd <= 0.0 || self.usage.hard_cap_usd < self.usage.soft_cap_usd {
            return Err(Error::Config {
                message: format!(
                    "usage caps must satisfy 0 < soft ({}) <= hard ({})",
                    self.usage.soft_cap_usd, self.usage.hard_cap_usd
                ),
            });
        }
        if self.turn.deadline_seconds == 0 {
            return Err(Error::Config {
                message: "turn.deadline_seconds must be positive".to_string(),
            });
        }
        Ok(())
    }
}
