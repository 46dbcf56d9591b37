//! Token and cost accounting.
//!
//! Counters are atomics: tool tasks and LLM calls record concurrently,
//! and the soft-cap check reads-then-decides without a lock (a small
//! overshoot is acceptable by design of the cap).
//!
//! Costs are tracked in micro-dollars so they fit lock-free integer
//! atomics.

use crate::core::SessionUsage;
use crate::error::{AgentError, Result};
use crate::llm::TokenUsage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

const MICRO: f64 = 1_000_000.0;

/// Published per-million-token rates for a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRates {
    /// USD per million input tokens.
    pub input_per_mtok: f64,
    /// USD per million output tokens.
    pub output_per_mtok: f64,
}

/// Rate table keyed by model-name substring, most specific first.
const RATE_TABLE: &[(&str, ModelRates)] = &[
    (
        "gpt-4o-mini",
        ModelRates {
            input_per_mtok: 0.15,
            output_per_mtok: 0.60,
        },
    ),
    (
        "gpt-4o",
        ModelRates {
            input_per_mtok: 2.50,
            output_per_mtok: 10.00,
        },
    ),
    (
        "claude-opus",
        ModelRates {
            input_per_mtok: 15.00,
            output_per_mtok: 75.00,
        },
    ),
    (
        "claude-sonnet",
        ModelRates {
            input_per_mtok: 3.00,
            output_per_mtok: 15.00,
        },
    ),
    (
        "claude-haiku",
        ModelRates {
            input_per_mtok: 0.80,
            output_per_mtok: 4.00,
        },
    ),
    (
        "llama",
        ModelRates {
            input_per_mtok: 0.0,
            output_per_mtok: 0.0,
        },
    ),
];

/// Fallback for models not in the table.
const DEFAULT_RATES: ModelRates = ModelRates {
    input_per_mtok: 1.00,
    output_per_mtok: 3.00,
};

/// Looks up rates by model-name substring.
#[must_use]
pub fn rates_for(model: &str) -> ModelRates {
    let lower = model.to_ascii_lowercase();
    RATE_TABLE
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map_or(DEFAULT_RATES, |(_, rates)| *rates)
}

/// Per-turn usage emitted with each answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnUsage {
    /// Input tokens this turn.
    pub tokens_in: u64,
    /// Output tokens this turn.
    pub tokens_out: u64,
    /// Cost of this turn in USD.
    pub cost_usd: f64,
}

/// Per-session usage tracker with cap enforcement.
pub struct UsageTracker {
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    cost_micro: AtomicU64,
    request_count: AtomicU64,
    turn_input: AtomicU64,
    turn_output: AtomicU64,
    turn_cost_micro: AtomicU64,
    limit_micro: AtomicU64,
    hard_cap_micro: u64,
}

impl UsageTracker {
    /// Creates a tracker with the configured caps.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(soft_cap_usd: f64, hard_cap_usd: f64) -> Self {
        Self {
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            cost_micro: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
            turn_input: AtomicU64::new(0),
            turn_output: AtomicU64::new(0),
            turn_cost_micro: AtomicU64::new(0),
            limit_micro: AtomicU64::new((soft_cap_usd * MICRO) as u64),
            hard_cap_micro: (hard_cap_usd * MICRO) as u64,
        }
    }

    /// Seeds the tracker from a persisted session's usage.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn hydrate(&self, usage: &SessionUsage) {
        self.input_tokens.store(usage.input_tokens, Ordering::SeqCst);
        self.output_tokens
            .store(usage.output_tokens, Ordering::SeqCst);
        self.cost_micro
            .store((usage.total_cost_usd * MICRO) as u64, Ordering::SeqCst);
        self.request_count
            .store(usage.request_count, Ordering::SeqCst);
        if usage.limit_usd > 0.0 {
            self.limit_micro
                .store((usage.limit_usd * MICRO) as u64, Ordering::SeqCst);
        }
    }

    /// Resets the per-turn counters.
    pub fn begin_turn(&self) {
        self.turn_input.store(0, Ordering::SeqCst);
        self.turn_output.store(0, Ordering::SeqCst);
        self.turn_cost_micro.store(0, Ordering::SeqCst);
    }

    /// Records one LLM call's tokens at the model's published rates.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn record(&self, model: &str, usage: TokenUsage) {
        let rates = rates_for(model);
        let cost_micro = (usage.input_tokens as f64 * rates.input_per_mtok
            + usage.output_tokens as f64 * rates.output_per_mtok) as u64;

        self.input_tokens
            .fetch_add(usage.input_tokens, Ordering::SeqCst);
        self.output_tokens
            .fetch_add(usage.output_tokens, Ordering::SeqCst);
        self.cost_micro.fetch_add(cost_micro, Ordering::SeqCst);
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.turn_input
            .fetch_add(usage.input_tokens, Ordering::SeqCst);
        self.turn_output
            .fetch_add(usage.output_tokens, Ordering::SeqCst);
        self.turn_cost_micro.fetch_add(cost_micro, Ordering::SeqCst);
    }

    /// Refuses the turn when spend has reached the active limit.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UsageCapExceeded`] with a stable code the
    /// UI can present.
    #[allow(clippy::cast_precision_loss)]
    pub fn check_cap(&self) -> Result<()> {
        let spent = self.cost_micro.load(Ordering::SeqCst);
        let limit = self.limit_micro.load(Ordering::SeqCst);
        if spent >= limit {
            return Err(AgentError::UsageCapExceeded {
                spent_usd: spent as f64 / MICRO,
                limit_usd: limit as f64 / MICRO,
            }
            .into());
        }
        Ok(())
    }

    /// Extends the active limit to the hard cap when the operator
    /// passphrase matches. Returns whether the unlock happened.
    pub fn unlock(&self, passphrase: &str, configured: Option<&str>) -> bool {
        if configured.is_some_and(|expected| expected == passphrase) {
            self.limit_micro.store(self.hard_cap_micro, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// This turn's usage so far.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn turn_usage(&self) -> TurnUsage {
        TurnUsage {
            tokens_in: self.turn_input.load(Ordering::SeqCst),
            tokens_out: self.turn_output.load(Ordering::SeqCst),
            cost_usd: self.turn_cost_micro.load(Ordering::SeqCst) as f64 / MICRO,
        }
    }

    /// The session-level snapshot for persistence.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn snapshot(&self) -> SessionUsage {
        SessionUsage {
            input_tokens: self.input_tokens.load(Ordering::SeqCst),
            output_tokens: self.output_tokens.load(Ordering::SeqCst),
            total_cost_usd: self.cost_micro.load(Ordering::SeqCst) as f64 / MICRO,
            request_count: self.request_count.load(Ordering::SeqCst),
            limit_usd: self.limit_micro.load(Ordering::SeqCst) as f64 / MICRO,
        }
    }
}
