//! Field normalizers applied after both extraction phases.
//!
//! Class mentions split by intent: classification/510(k)/PMA/UDI
//! questions get a numeric device class, recall/enforcement questions
//! get the Roman-prefixed recall class. Dates flex-parse to `YYYYMMDD`.
//! Countries canonicalize to the full English name; the tools convert
//! per endpoint at render time.

use crate::core::RecallClass;
use crate::error::{Result, ValidationError};
use crate::fda::country_name;
use chrono::NaiveDate;

/// Which kind of class the question is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassIntent {
    /// Recall severity ("Class I" recalls).
    Recall,
    /// Device risk class (numeric 1-3).
    Device,
}

/// Decides the class intent from question vocabulary.
///
/// Recall/enforcement vocabulary wins; anything referencing the
/// classification, 510(k), PMA or UDI surfaces is a device-class
/// question. Defaults to device when nothing decides.
#[must_use]
pub fn classify_class_intent(question: &str) -> ClassIntent {
    let lower = question.to_ascii_lowercase();
    if lower.contains("recall") || lower.contains("enforcement") {
        ClassIntent::Recall
    } else {
        ClassIntent::Device
    }
}

/// Normalizes a class token ("I", "ii", "3") to the numeric tier.
#[must_use]
pub fn normalize_device_class(token: &str) -> Option<u8> {
    RecallClass::parse(token).map(RecallClass::tier)
}

/// Normalizes a class token to the Roman-prefixed recall class.
#[must_use]
pub fn normalize_recall_class(token: &str) -> Option<RecallClass> {
    RecallClass::parse(token)
}

/// Which end of a date range a value anchors; bare years and months
/// snap to the matching boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    /// Range start: bare years become Jan 1.
    Start,
    /// Range end: bare years become Dec 31.
    End,
}

/// Flex-parses a date into `YYYYMMDD`.
///
/// Accepts `YYYYMMDD`, `YYYY-MM-DD`, `MM/DD/YYYY`, `YYYY/MM/DD`,
/// month-name forms ("March 5, 2024") and bare years.
///
/// # Errors
///
/// Returns a validation error when nothing parses.
pub fn normalize_date(input: &str, bound: DateBound) -> Result<String> {
    let trimmed = input.trim();

    // Bare year
    if trimmed.len() == 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(match bound {
            DateBound::Start => format!("{trimmed}0101"),
            DateBound::End => format!("{trimmed}1231"),
        });
    }

    const FORMATS: &[&str] = &["%Y%m%d", "%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y", "%B %d %Y"];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date.format("%Y%m%d").to_string());
        }
    }

    Err(ValidationError::InvalidDate {
        input: input.to_string(),
    }
    .into())
}

/// Canonicalizes a country term to its full English name, passing
/// unknown terms through unchanged (the endpoint may still match).
#[must_use]
pub fn normalize_country(term: &str) -> String {
    country_name(term).map_or_else(|| term.to_string(), std::string::ToString::to_string)
}
