//! Deterministic regex pre-pass over user questions.
//!
//! These patterns always win over LLM output for the fields they
//! capture: a regex hit is written with confidence 1.0 after the LLM
//! pass, overwriting whatever the model produced.

use regex::Regex;
use std::sync::LazyLock;

/// `K` + six digits on word boundaries ("K123456", not "TOK123456").
static K_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bK\d{6}\b").expect("pattern compiles"));

/// `P` + six digits on word boundaries.
static PMA_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bP\d{6}\b").expect("pattern compiles"));

/// Three uppercase letters ONLY when introduced by "product code".
static PRODUCT_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:product\s+codes?)\s*:?\s*([A-Z]{3})\b").expect("pattern compiles")
});

/// "Class I/II/III" or "Class 1/2/3" mentions, captured for later
/// normalization into either a recall class or a device class.
static CLASS_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bclass\s+(iii|ii|i|[123])\b").expect("pattern compiles"));

/// Temporal vocabulary for the sufficiency check.
static TEMPORAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(since|before|after|between|until|recent|recently|last\s+(year|month|week)|this\s+(year|month)|\d{4})\b",
    )
    .expect("pattern compiles")
});

/// Deterministic identifiers found in a question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegexHits {
    /// First `K`-number mention.
    pub k_number: Option<String>,
    /// First PMA-number mention.
    pub pma_number: Option<String>,
    /// First product code introduced by "product code".
    pub product_code: Option<String>,
    /// First class token ("I", "2", ...) awaiting normalization.
    pub class_token: Option<String>,
}

impl RegexHits {
    /// Runs every pattern over the question.
    #[must_use]
    pub fn scan(question: &str) -> Self {
        Self {
            k_number: K_NUMBER_RE
                .find(question)
                .map(|m| m.as_str().to_string()),
            pma_number: PMA_NUMBER_RE
                .find(question)
                .map(|m| m.as_str().to_string()),
            product_code: PRODUCT_CODE_RE
                .captures(question)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
            class_token: CLASS_TOKEN_RE
                .captures(question)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
        }
    }
}

/// True when the question carries a class mention (device or recall).
#[must_use]
pub fn has_class_token(question: &str) -> bool {
    CLASS_TOKEN_RE.is_match(question)
}

/// True when the question carries date or temporal vocabulary.
#[must_use]
pub fn has_temporal_token(question: &str) -> bool {
    TEMPORAL_RE.is_match(question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_k_number_word_boundary() {
        assert_eq!(
            RegexHits::scan("Show me K123456").k_number.as_deref(),
            Some("K123456")
        );
        assert_eq!(RegexHits::scan("TOK123456 is not one").k_number, None);
        assert_eq!(RegexHits::scan("K12345 too short").k_number, None);
        assert_eq!(RegexHits::scan("K1234567 too long").k_number, None);
    }

    #[test]
    fn test_pma_number() {
        assert_eq!(
            RegexHits::scan("what about P970004?").pma_number.as_deref(),
            Some("P970004")
        );
        assert_eq!(RegexHits::scan("UPS970004").pma_number, None);
    }

    #[test]
    fn test_product_code_requires_context() {
        assert_eq!(
            RegexHits::scan("devices with product code FXX")
                .product_code
                .as_deref(),
            Some("FXX")
        );
        assert_eq!(
            RegexHits::scan("Product Code: DXY please")
                .product_code
                .as_deref(),
            Some("DXY")
        );
        // Bare three uppercase letters without the introducer are ignored
        assert_eq!(RegexHits::scan("tell me about FXX").product_code, None);
        // Lowercase codes are not codes
        assert_eq!(RegexHits::scan("product code fxx").product_code, None);
    }

    #[test_case("Any Class I recalls?" => Some("I".to_string()); "roman one")]
    #[test_case("class iii devices" => Some("iii".to_string()); "roman three lowercase")]
    #[test_case("Show Class 2 devices" => Some("2".to_string()); "arabic two")]
    #[test_case("classy devices" => None; "no token")]
    fn test_class_token(question: &str) -> Option<String> {
        RegexHits::scan(question).class_token
    }

    #[test]
    fn test_determinism() {
        let question = "Class I recalls for product code FXX since 2023, see K123456";
        let a = RegexHits::scan(question);
        let b = RegexHits::scan(question);
        assert_eq!(a, b);
        assert_eq!(a.k_number.as_deref(), Some("K123456"));
        assert_eq!(a.product_code.as_deref(), Some("FXX"));
        assert_eq!(a.class_token.as_deref(), Some("I"));
    }

    #[test]
    fn test_temporal_tokens() {
        assert!(has_temporal_token("recalls since 2023"));
        assert!(has_temporal_token("events from last year"));
        assert!(has_temporal_token("between March and June"));
        assert!(!has_temporal_token("any recalls for masks"));
        assert!(
            !has_temporal_token("events from Chinese manufacturers"),
            "bare 'from' is not temporal"
        );
    }

    #[test]
    fn test_class_token_predicate() {
        assert!(has_class_token("class ii"));
        assert!(!has_class_token("first-class service"));
    }
}
