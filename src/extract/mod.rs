//! Structured parameter extraction.
//!
//! Two phases: a deterministic regex pre-pass for identifiers, then an
//! LLM structured-output pass for everything else. Regex always wins
//! for the fields it captures. Normalization and per-field confidence
//! scoring run after both phases.

mod normalize;
mod patterns;

pub use normalize::{
    ClassIntent, DateBound, classify_class_intent, normalize_country, normalize_date,
    normalize_device_class, normalize_recall_class,
};
pub use patterns::{RegexHits, has_class_token, has_temporal_token};

use crate::core::ExtractedParameters;
use crate::error::Result;
use crate::llm::{ChatMessage, LlmCaller, complete_with_retry};
use crate::usage::UsageTracker;
use serde::Deserialize;
use std::sync::Arc;

/// Confidence assigned to regex hits.
pub const CONFIDENCE_REGEX: f32 = 1.0;

/// Confidence for LLM fields whose value appears verbatim in the
/// question.
pub const CONFIDENCE_TEXTUAL: f32 = 0.9;

/// Confidence for LLM-inferred fields without textual evidence.
pub const CONFIDENCE_INFERRED: f32 = 0.6;

/// System prompt for the extraction pass.
const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract search parameters from questions about FDA medical device data.

Return a single JSON object. Every field is optional; omit fields the question does not support. Fields:

- "device_class": device risk class, one of 1, 2, 3
- "recall_class": recall severity, one of "Class I", "Class II", "Class III"
- "product_code": three uppercase letters (e.g. "FXX")
- "k_number": letter K followed by six digits (e.g. "K123456")
- "pma_number": letter P followed by six digits (e.g. "P970004")
- "firm_name": manufacturer or recalling firm name
- "applicant": 510(k)/PMA applicant name
- "device_name": device type or name in plain words
- "regulation_number": CFR regulation, digits like "878.4040"
- "country": country mentioned (any form)
- "state": US state name or two-letter code
- "fei_number": FDA establishment identifier, digits
- "date_start": range start, any common date form or a year
- "date_end": range end, any common date form or a year
- "limit": requested number of results, an integer
- "event_type": one of "Malfunction", "Injury", "Death", "Other"

Phrases like "since 2023" set date_start only. "Top 5" or "show me 5" set limit.
Do not invent identifiers that are not in the question.
Return ONLY the JSON object."#;

/// Tolerant deserialization target for the LLM pass. String-or-number
/// fields decode as JSON values and coerce later.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawExtraction {
    device_class: Option<serde_json::Value>,
    recall_class: Option<String>,
    product_code: Option<String>,
    k_number: Option<String>,
    pma_number: Option<String>,
    firm_name: Option<String>,
    applicant: Option<String>,
    device_name: Option<String>,
    regulation_number: Option<String>,
    country: Option<String>,
    state: Option<String>,
    fei_number: Option<String>,
    date_start: Option<String>,
    date_end: Option<String>,
    limit: Option<serde_json::Value>,
    event_type: Option<String>,
}

/// Extraction result: parameters plus the validation issues that were
/// dropped on the way. The planner may react to issues by asking the
/// retriever for the endpoint's field list and re-extracting.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// The extracted, normalized, confidence-scored parameters.
    pub params: ExtractedParameters,
    /// Human-readable validation issues (dropped fields).
    pub issues: Vec<String>,
}

/// Two-phase parameter extractor.
pub struct ParameterExtractor {
    llm: Arc<dyn LlmCaller>,
    model: String,
}

impl ParameterExtractor {
    /// Creates an extractor bound to the planning model.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmCaller>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Extracts parameters from a question.
    ///
    /// `field_hint` carries the canonical field list of the routed
    /// endpoint when this is a constrained re-extraction after a
    /// low-confidence report.
    ///
    /// # Errors
    ///
    /// Never fails on LLM trouble (falls back to the regex-only pass);
    /// propagates nothing else currently.
    pub async fn extract(
        &self,
        question: &str,
        field_hint: Option<&[String]>,
        usage: &UsageTracker,
    ) -> Result<ExtractionOutcome> {
        let hits = RegexHits::scan(question);

        let raw = match self.llm_pass(question, field_hint, usage).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "extraction LLM pass failed, using regex-only parameters");
                RawExtraction::default()
            }
        };

        let mut outcome = assemble(question, &hits, raw);
        outcome.issues.dedup();
        Ok(outcome)
    }

    /// Runs the structured-output pass, with one re-ask on a JSON parse
    /// failure (provider failures already retry inside
    /// `complete_with_retry`).
    async fn llm_pass(
        &self,
        question: &str,
        field_hint: Option<&[String]>,
        usage: &UsageTracker,
    ) -> Result<RawExtraction> {
        let mut user = format!("Question: {question}");
        if let Some(fields) = field_hint
            && !fields.is_empty()
        {
            user.push_str(&format!(
                "\nCanonical endpoint fields: {}",
                fields.join(", ")
            ));
        }
        let messages = [
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(user),
        ];

        let completion = complete_with_retry(&*self.llm, &self.model, &messages, true).await?;
        usage.record(&self.model, completion.usage);
        match parse_json_object::<RawExtraction>(&completion.content) {
            Ok(raw) => Ok(raw),
            Err(_) => {
                let retry = complete_with_retry(&*self.llm, &self.model, &messages, true).await?;
                usage.record(&self.model, retry.usage);
                parse_json_object(&retry.content)
            }
        }
    }
}

/// Parses a JSON object out of a completion, tolerating fenced or
/// prefixed output.
///
/// # Errors
///
/// Returns a parse-failure error when no object decodes.
pub fn parse_json_object<T: serde::de::DeserializeOwned>(content: &str) -> Result<T> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    // Fall back to the outermost brace span
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str(&trimmed[start..=end])
    {
        return Ok(value);
    }
    Err(crate::error::LlmError::ParseFailure {
        reason: format!("no JSON object in completion ({} chars)", content.len()),
    }
    .into())
}

/// Merges the regex and LLM passes, normalizes and scores confidence.
fn assemble(question: &str, hits: &RegexHits, raw: RawExtraction) -> ExtractionOutcome {
    let mut params = ExtractedParameters::default();
    let mut issues = Vec::new();
    let question_lower = question.to_ascii_lowercase();

    let set_text = |params: &mut ExtractedParameters,
                        field: &str,
                        value: Option<String>,
                        slot: fn(&mut ExtractedParameters, String)| {
        if let Some(value) = value {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                return;
            }
            let confidence = if question_lower.contains(&trimmed.to_ascii_lowercase()) {
                CONFIDENCE_TEXTUAL
            } else {
                CONFIDENCE_INFERRED
            };
            slot(params, trimmed);
            params.set_confidence(field, confidence);
        }
    };

    set_text(&mut params, "firm_name", raw.firm_name, |p, v| {
        p.firm_name = Some(v);
    });
    set_text(&mut params, "applicant", raw.applicant, |p, v| {
        p.applicant = Some(v);
    });
    set_text(&mut params, "device_name", raw.device_name, |p, v| {
        p.device_name = Some(v);
    });
    set_text(
        &mut params,
        "regulation_number",
        raw.regulation_number,
        |p, v| {
            p.regulation_number = Some(v);
        },
    );
    set_text(&mut params, "state", raw.state, |p, v| {
        p.state = Some(v);
    });
    set_text(&mut params, "fei_number", raw.fei_number, |p, v| {
        p.fei_number = Some(v);
    });
    set_text(&mut params, "event_type", raw.event_type, |p, v| {
        p.event_type = Some(v);
    });

    // Country canonicalizes to the full name; tools convert per endpoint
    if let Some(country) = raw.country {
        let trimmed = country.trim();
        if !trimmed.is_empty() {
            let canonical = normalize_country(trimmed);
            let confidence = if question_lower.contains(&trimmed.to_ascii_lowercase()) {
                CONFIDENCE_TEXTUAL
            } else {
                CONFIDENCE_INFERRED
            };
            params.country = Some(canonical);
            params.set_confidence("country", confidence);
        }
    }

    // Identifiers from the LLM pass validate before acceptance
    if let Some(code) = raw.product_code {
        let upper = code.trim().to_ascii_uppercase();
        if upper.len() == 3 && upper.chars().all(|c| c.is_ascii_alphabetic()) {
            params.product_code = Some(upper);
            params.set_confidence("product_code", CONFIDENCE_TEXTUAL);
        } else {
            issues.push(format!("invalid product code: {code}"));
        }
    }
    if let Some(k_number) = raw.k_number {
        let upper = k_number.trim().to_ascii_uppercase();
        if upper.len() == 7 && upper.starts_with('K') && upper[1..].chars().all(|c| c.is_ascii_digit())
        {
            params.k_number = Some(upper);
            params.set_confidence("k_number", CONFIDENCE_TEXTUAL);
        } else {
            issues.push(format!("invalid 510(k) number: {k_number}"));
        }
    }
    if let Some(pma_number) = raw.pma_number {
        let upper = pma_number.trim().to_ascii_uppercase();
        if upper.len() == 7 && upper.starts_with('P') && upper[1..].chars().all(|c| c.is_ascii_digit())
        {
            params.pma_number = Some(upper);
            params.set_confidence("pma_number", CONFIDENCE_TEXTUAL);
        } else {
            issues.push(format!("invalid PMA number: {pma_number}"));
        }
    }

    // Dates flex-parse; failures drop the field and record the issue
    for (value, bound, field) in [
        (raw.date_start, DateBound::Start, "date_start"),
        (raw.date_end, DateBound::End, "date_end"),
    ] {
        if let Some(value) = value {
            match normalize_date(&value, bound) {
                Ok(normalized) => {
                    if field == "date_start" {
                        params.date_start = Some(normalized);
                    } else {
                        params.date_end = Some(normalized);
                    }
                    params.set_confidence(field, CONFIDENCE_TEXTUAL);
                }
                Err(err) => issues.push(err.to_string()),
            }
        }
    }

    // Class intent decides which class field the token lands in
    let class_token = hits
        .class_token
        .clone()
        .or_else(|| raw.recall_class.clone())
        .or_else(|| raw.device_class.as_ref().map(value_to_token));
    if let Some(token) = class_token {
        let confidence = if hits.class_token.is_some() {
            CONFIDENCE_REGEX
        } else {
            CONFIDENCE_TEXTUAL
        };
        match classify_class_intent(question) {
            ClassIntent::Recall => {
                if let Some(class) = normalize_recall_class(&token) {
                    params.recall_class = Some(class);
                    params.set_confidence("recall_class", confidence);
                } else {
                    issues.push(format!("unrecognized recall class: {token}"));
                }
            }
            ClassIntent::Device => {
                if let Some(class) = normalize_device_class(&token) {
                    params.device_class = Some(class);
                    params.set_confidence("device_class", confidence);
                } else {
                    issues.push(format!("unrecognized device class: {token}"));
                }
            }
        }
    }

    // Limit coerces from number or string
    if let Some(limit) = raw.limit {
        match coerce_u32(&limit) {
            Some(value) => {
                params.limit = Some(value.min(crate::core::MAX_LIMIT));
                params.set_confidence("limit", CONFIDENCE_TEXTUAL);
            }
            None => issues.push(format!("invalid limit: {limit}")),
        }
    }

    // Regex hits force-write last: regex always wins
    if let Some(k_number) = &hits.k_number {
        params.k_number = Some(k_number.clone());
        params.set_confidence("k_number", CONFIDENCE_REGEX);
    }
    if let Some(pma_number) = &hits.pma_number {
        params.pma_number = Some(pma_number.clone());
        params.set_confidence("pma_number", CONFIDENCE_REGEX);
    }
    if let Some(code) = &hits.product_code {
        params.product_code = Some(code.clone());
        params.set_confidence("product_code", CONFIDENCE_REGEX);
    }

    ExtractionOutcome { params, issues }
}

fn value_to_token(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_u32(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
