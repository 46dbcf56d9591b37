//! Manufacturer resolver.
//!
//! FDA records spell the same company many ways ("MEDTRONIC INC",
//! "Medtronic, Inc.", "MEDTRONIC PLC"). This resolver queries the
//! registration-listing endpoint for a firm term, groups the returned
//! records by normalized name, and picks the most frequent surface form
//! as the canonical name with the rest listed as variants.

use crate::core::{
    ExtractedParameters, ManufacturerGroup, ResultMeta, StructuredResult, ToolResult,
};
use crate::error::Result;
use crate::fda::EndpointTools;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Registration records pulled per resolution.
const REGISTRATION_POOL: u32 = 100;

/// Resolver over the registration-listing endpoint.
pub struct ManufacturerResolver {
    tools: Arc<EndpointTools>,
}

impl ManufacturerResolver {
    /// Creates a resolver over the shared tool suite.
    #[must_use]
    pub const fn new(tools: Arc<EndpointTools>) -> Self {
        Self { tools }
    }

    /// Resolves a company term to canonical-name groupings.
    ///
    /// # Errors
    ///
    /// Returns the underlying tool error when the endpoint call fails.
    pub async fn resolve(&self, term: &str, cancel: &CancellationToken) -> Result<ToolResult> {
        let params = ExtractedParameters {
            firm_name: Some(term.to_string()),
            limit: Some(REGISTRATION_POOL),
            ..ExtractedParameters::default()
        };
        let registrations = self.tools.search_registrations(&params, cancel).await?;

        let names = registrations
            .results
            .iter()
            .filter_map(extract_firm_name)
            .collect::<Vec<String>>();
        let groups = group_variants(&names);

        Ok(ToolResult {
            endpoint: "resolve_manufacturer".to_string(),
            query_expression: registrations.query_expression,
            meta: ResultMeta {
                total: groups.iter().map(|g| g.device_count).sum(),
                last_updated: registrations.meta.last_updated,
                ..ResultMeta::default()
            },
            results: Vec::new(),
            structured: Some(StructuredResult::Manufacturers(groups)),
        })
    }
}

/// Pulls the firm name out of a registration record.
fn extract_firm_name(record: &serde_json::Value) -> Option<String> {
    record
        .pointer("/registration/name")
        .or_else(|| record.pointer("/proprietary_name"))
        .and_then(serde_json::Value::as_str)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Groups surface forms by normalized name; the most frequent form in
/// each group becomes canonical.
fn group_variants(names: &[String]) -> Vec<ManufacturerGroup> {
    // normalized key -> surface form -> occurrences
    let mut groups: HashMap<String, HashMap<String, u64>> = HashMap::new();
    for name in names {
        let key = normalize_name(name);
        *groups
            .entry(key)
            .or_default()
            .entry(name.clone())
            .or_insert(0) += 1;
    }

    let mut result: Vec<ManufacturerGroup> = groups
        .into_values()
        .map(|forms| {
            let device_count: u64 = forms.values().sum();
            let canonical_name = forms
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(name, _)| name.clone())
                .unwrap_or_default();
            let mut fda_variants: Vec<String> = forms
                .into_keys()
                .filter(|name| *name != canonical_name)
                .collect();
            fda_variants.sort();
            ManufacturerGroup {
                canonical_name,
                fda_variants,
                device_count,
            }
        })
        .collect();
    result.sort_by(|a, b| {
        b.device_count
            .cmp(&a.device_count)
            .then_with(|| a.canonical_name.cmp(&b.canonical_name))
    });
    result
}

/// Normalizes a firm name for grouping: uppercase alphanumerics only,
/// legal suffixes stripped.
fn normalize_name(name: &str) -> String {
    let upper: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let mut words: Vec<&str> = upper.split_whitespace().collect();
    while let Some(last) = words.last() {
        if matches!(*last, "INC" | "LLC" | "LTD" | "CORP" | "CO" | "PLC" | "GMBH" | "SA") {
            words.pop();
        } else {
            break;
        }
    }
    words.join(" ")
}
