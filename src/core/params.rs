//! Extracted query parameters.
//!
//! One schema shared by all endpoint tools. Every field is optional and
//! carries a per-field confidence in `[0, 1]` assigned by the extractor:
//! 1.0 for regex hits, 0.9 for explicit textual matches, 0.6 for fields
//! the LLM inferred without textual evidence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum `limit` any endpoint accepts.
pub const MAX_LIMIT: u32 = 1000;

/// Confidence below which a field is reported to the planner for a
/// possible RAG-assisted re-extraction.
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// FDA recall classification (enforcement severity tier).
///
/// Distinct from the numeric device class: recall classes render
/// Roman-prefixed ("Class I"), device classes render numeric (1-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecallClass {
    /// Most serious: reasonable probability of serious harm.
    #[serde(rename = "Class I")]
    ClassI,
    /// May cause temporary or reversible harm.
    #[serde(rename = "Class II")]
    ClassII,
    /// Not likely to cause harm.
    #[serde(rename = "Class III")]
    ClassIII,
}

impl RecallClass {
    /// Parses a recall class from user phrasing.
    ///
    /// Accepts Roman or Arabic forms in any case: "class i", "Class I",
    /// "class 1", "Class 1" all map to `ClassI`.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let token = input
            .trim()
            .to_ascii_lowercase()
            .strip_prefix("class")
            .map(str::trim)
            .map(std::string::ToString::to_string)
            .unwrap_or_else(|| input.trim().to_ascii_lowercase());
        match token.as_str() {
            "i" | "1" => Some(Self::ClassI),
            "ii" | "2" => Some(Self::ClassII),
            "iii" | "3" => Some(Self::ClassIII),
            _ => None,
        }
    }

    /// Returns the numeric tier (1-3).
    #[must_use]
    pub const fn tier(self) -> u8 {
        match self {
            Self::ClassI => 1,
            Self::ClassII => 2,
            Self::ClassIII => 3,
        }
    }
}

impl fmt::Display for RecallClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClassI => "Class I",
            Self::ClassII => "Class II",
            Self::ClassIII => "Class III",
        };
        f.write_str(s)
    }
}

/// Parameters extracted from a user question.
///
/// All fields optional; dates are `YYYYMMDD`; `country` holds the
/// canonical full English name and is converted per endpoint by the
/// tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedParameters {
    /// Device risk class 1-3 (classification/510k/PMA/UDI questions).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<u8>,

    /// Recall severity class (enforcement questions).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall_class: Option<RecallClass>,

    /// Three-letter FDA product code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,

    /// Several product codes at once (resolver-injected; rendered as an
    /// OR group by tools that support it).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_codes: Option<Vec<String>>,

    /// 510(k) number: `K` + six digits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k_number: Option<String>,

    /// PMA number: `P` + six digits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pma_number: Option<String>,

    /// Recalling / manufacturing firm name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firm_name: Option<String>,

    /// 510(k)/PMA applicant name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant: Option<String>,

    /// Free-text device name or type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// Regulation number in `ddd.dddd` form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulation_number: Option<String>,

    /// Country, canonical full English name ("China").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// US state, two-letter code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// FDA Establishment Identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fei_number: Option<String>,

    /// UDI device identifier (GUDID primary DI).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udi: Option<String>,

    /// Range start, `YYYYMMDD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_start: Option<String>,

    /// Range end, `YYYYMMDD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_end: Option<String>,

    /// Result cap, at most [`MAX_LIMIT`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Pagination offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,

    /// MAUDE event type (e.g. "Malfunction", "Injury", "Death").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Per-field confidence scores keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub confidence: BTreeMap<String, f32>,
}

impl ExtractedParameters {
    /// Records a confidence score for a field, clamped to `[0, 1]`.
    pub fn set_confidence(&mut self, field: &str, score: f32) {
        self.confidence
            .insert(field.to_string(), score.clamp(0.0, 1.0));
    }

    /// Returns the confidence recorded for a field, if any.
    #[must_use]
    pub fn confidence_of(&self, field: &str) -> Option<f32> {
        self.confidence.get(field).copied()
    }

    /// Fields whose confidence sits below [`LOW_CONFIDENCE_THRESHOLD`].
    #[must_use]
    pub fn low_confidence_fields(&self) -> Vec<&str> {
        self.confidence
            .iter()
            .filter(|(_, score)| **score < LOW_CONFIDENCE_THRESHOLD)
            .map(|(field, _)| field.as_str())
            .collect()
    }

    /// Effective result limit: the extracted value capped at
    /// [`MAX_LIMIT`], or the given default when absent.
    #[must_use]
    pub fn effective_limit(&self, default: u32) -> u32 {
        self.limit.unwrap_or(default).min(MAX_LIMIT)
    }

    /// True when no queryable field is set (confidence map excluded).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.device_class.is_none()
            && self.recall_class.is_none()
            && self.product_code.is_none()
            && self.product_codes.is_none()
            && self.k_number.is_none()
            && self.pma_number.is_none()
            && self.firm_name.is_none()
            && self.applicant.is_none()
            && self.device_name.is_none()
            && self.regulation_number.is_none()
            && self.country.is_none()
            && self.state.is_none()
            && self.fei_number.is_none()
            && self.udi.is_none()
            && self.date_start.is_none()
            && self.date_end.is_none()
            && self.event_type.is_none()
    }

    /// Merges fields from `other`, overwriting only where `other` has a
    /// value. Confidence entries from `other` win on collision.
    pub fn merge_from(&mut self, other: &Self) {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field.clone();
                }
            };
        }
        take!(device_class);
        take!(recall_class);
        take!(product_code);
        take!(product_codes);
        take!(k_number);
        take!(pma_number);
        take!(firm_name);
        take!(applicant);
        take!(device_name);
        take!(regulation_number);
        take!(country);
        take!(state);
        take!(fei_number);
        take!(udi);
        take!(date_start);
        take!(date_end);
        take!(limit);
        take!(skip);
        take!(event_type);
        for (field, score) in &other.confidence {
            self.confidence.insert(field.clone(), *score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("class i" => Some(RecallClass::ClassI); "lowercase roman")]
    #[test_case("Class I" => Some(RecallClass::ClassI); "capital roman")]
    #[test_case("class 1" => Some(RecallClass::ClassI); "lowercase arabic")]
    #[test_case("Class 1" => Some(RecallClass::ClassI); "capital arabic")]
    #[test_case("II" => Some(RecallClass::ClassII); "bare roman two")]
    #[test_case("3" => Some(RecallClass::ClassIII); "bare arabic three")]
    #[test_case("class iv" => None; "class four rejected")]
    #[test_case("classy" => None; "not a class")]
    fn test_recall_class_parse(input: &str) -> Option<RecallClass> {
        RecallClass::parse(input)
    }

    #[test]
    fn test_recall_class_display() {
        assert_eq!(RecallClass::ClassI.to_string(), "Class I");
        assert_eq!(RecallClass::ClassII.to_string(), "Class II");
        assert_eq!(RecallClass::ClassIII.to_string(), "Class III");
    }

    #[test]
    fn test_recall_class_serde_rename() {
        let json = serde_json::to_string(&RecallClass::ClassI).unwrap();
        assert_eq!(json, "\"Class I\"");
        let back: RecallClass = serde_json::from_str("\"Class II\"").unwrap();
        assert_eq!(back, RecallClass::ClassII);
    }

    #[test]
    fn test_effective_limit_caps() {
        let mut params = ExtractedParameters::default();
        assert_eq!(params.effective_limit(10), 10);
        params.limit = Some(5000);
        assert_eq!(params.effective_limit(10), MAX_LIMIT);
        params.limit = Some(5);
        assert_eq!(params.effective_limit(10), 5);
    }

    #[test]
    fn test_low_confidence_fields() {
        let mut params = ExtractedParameters::default();
        params.set_confidence("device_name", 0.6);
        params.set_confidence("k_number", 1.0);
        params.set_confidence("country", 0.79);
        let mut low = params.low_confidence_fields();
        low.sort_unstable();
        assert_eq!(low, vec!["country", "device_name"]);
    }

    #[test]
    fn test_confidence_clamped() {
        let mut params = ExtractedParameters::default();
        params.set_confidence("firm_name", 1.7);
        assert_eq!(params.confidence_of("firm_name"), Some(1.0));
        params.set_confidence("firm_name", -0.2);
        assert_eq!(params.confidence_of("firm_name"), Some(0.0));
    }

    #[test]
    fn test_is_empty() {
        let mut params = ExtractedParameters::default();
        assert!(params.is_empty());
        params.set_confidence("device_name", 0.6);
        assert!(params.is_empty(), "confidence alone is not a field");
        params.device_name = Some("pacemaker".to_string());
        assert!(!params.is_empty());
    }

    #[test]
    fn test_merge_from_overwrites_only_present() {
        let mut base = ExtractedParameters {
            device_name: Some("mask".to_string()),
            limit: Some(5),
            ..Default::default()
        };
        let incoming = ExtractedParameters {
            device_name: Some("respirator".to_string()),
            firm_name: Some("3M".to_string()),
            ..Default::default()
        };
        base.merge_from(&incoming);
        assert_eq!(base.device_name.as_deref(), Some("respirator"));
        assert_eq!(base.firm_name.as_deref(), Some("3M"));
        assert_eq!(base.limit, Some(5));
    }

    #[test]
    fn test_serde_skips_absent_fields() {
        let params = ExtractedParameters {
            k_number: Some("K123456".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"k_number":"K123456"}"#);
    }
}
