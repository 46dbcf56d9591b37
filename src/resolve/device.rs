//! Device resolver over the local GUDID catalog.
//!
//! Maps a free-text device term ("surgical mask", "3M respirator",
//! "FXX") to product codes plus metadata. Stages run in order and stop
//! at the first one that matches:
//!
//! 1. exact case-insensitive brand-name equality (confidence 1.0)
//! 2. direct product-code lookup for `^[A-Z]{3}$` input (1.0)
//! 3. full-text search over brand/company/description (0.6-0.95)
//! 4. fuzzy brand match with edit distance <= 2 (0.4-0.6)

use crate::core::{
    CatalogDevice, ManufacturerCount, ResolvedDevices, ResultMeta, StructuredResult, ToolResult,
};
use crate::error::Result;
use crate::storage::SqliteStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// Matches pulled from the FTS stage before aggregation.
const FTS_POOL: usize = 100;

/// Brand pool scanned by the fuzzy stage.
const FUZZY_BRAND_POOL: usize = 10_000;

/// Resolver over the local device catalog.
pub struct DeviceResolver {
    store: Arc<Mutex<SqliteStore>>,
}

impl DeviceResolver {
    /// Creates a resolver over the shared store.
    #[must_use]
    pub fn new(store: Arc<Mutex<SqliteStore>>) -> Self {
        Self { store }
    }

    /// Resolves a device term. Always succeeds with a (possibly empty)
    /// resolution; storage failures are real errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    pub fn resolve(&self, term: &str) -> Result<ToolResult> {
        let store = self.store.lock().map_err(|_| {
            crate::error::StorageError::Database("store lock poisoned".to_string())
        })?;

        let trimmed = term.trim();

        // Stage 1: exact brand equality
        let exact = store.devices_by_brand_exact(trimmed)?;
        if !exact.is_empty() {
            return Ok(envelope(trimmed, aggregate(trimmed, &exact, 1.0)));
        }

        // Stage 2: the term IS a product code
        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_uppercase()) {
            let by_code = store.devices_by_product_code(trimmed)?;
            if !by_code.is_empty() {
                return Ok(envelope(trimmed, aggregate(trimmed, &by_code, 1.0)));
            }
        }

        // Stage 3: full-text over brand, company, description
        let fts = store.search_devices(trimmed, FTS_POOL)?;
        if !fts.is_empty() {
            let confidence = fts_confidence(&fts);
            let devices: Vec<CatalogDevice> = fts.into_iter().map(|(d, _)| d).collect();
            return Ok(envelope(trimmed, aggregate(trimmed, &devices, confidence)));
        }

        // Stage 4: fuzzy brand match
        let mut best: Option<(usize, String)> = None;
        for brand in store.distinct_brands(FUZZY_BRAND_POOL)? {
            let distance = strsim::levenshtein(
                &brand.to_ascii_lowercase(),
                &trimmed.to_ascii_lowercase(),
            );
            if distance <= 2 && best.as_ref().is_none_or(|(d, _)| distance < *d) {
                best = Some((distance, brand));
            }
        }
        if let Some((distance, brand)) = best {
            let matches = store.devices_by_brand_exact(&brand)?;
            #[allow(clippy::cast_precision_loss)]
            let confidence = 0.6 - 0.1 * distance as f32;
            return Ok(envelope(trimmed, aggregate(trimmed, &matches, confidence)));
        }

        Ok(envelope(trimmed, aggregate(trimmed, &[], 0.0)))
    }
}

/// Confidence for the FTS stage: 0.6 base plus up to 0.35 by how much
/// of the pool scores close to the best hit.
#[allow(clippy::cast_precision_loss)]
fn fts_confidence(matches: &[(CatalogDevice, f64)]) -> f32 {
    let best = matches.first().map_or(0.0, |(_, score)| *score);
    if best <= 0.0 {
        return 0.6;
    }
    let strong = matches
        .iter()
        .filter(|(_, score)| *score >= best * 0.5)
        .count();
    let fraction = strong as f32 / matches.len() as f32;
    0.6 + 0.35 * fraction
}

/// Aggregates matched records: distinct product codes, manufacturers by
/// record count, total match count.
fn aggregate(query: &str, matches: &[CatalogDevice], confidence: f32) -> ResolvedDevices {
    let mut product_codes = BTreeSet::new();
    let mut manufacturers: HashMap<String, u64> = HashMap::new();
    for device in matches {
        if !device.product_code.is_empty() {
            product_codes.insert(device.product_code.clone());
        }
        *manufacturers.entry(device.company_name.clone()).or_insert(0) += 1;
    }

    let mut top_manufacturers: Vec<ManufacturerCount> = manufacturers
        .into_iter()
        .map(|(name, count)| ManufacturerCount { name, count })
        .collect();
    top_manufacturers.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    top_manufacturers.truncate(5);

    ResolvedDevices {
        query: query.to_string(),
        product_codes,
        top_manufacturers,
        match_count: matches.len() as u64,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

fn envelope(term: &str, resolved: ResolvedDevices) -> ToolResult {
    ToolResult {
        endpoint: "resolve_device".to_string(),
        query_expression: format!("catalog:{term}"),
        meta: ResultMeta {
            total: resolved.match_count,
            ..ResultMeta::default()
        },
        results: Vec::new(),
        structured: Some(StructuredResult::Devices(resolved)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with_catalog() -> DeviceResolver {
        let mut store = SqliteStore::in_memory().unwrap();
        store.init().unwrap();
        store
            .insert_devices(&[
                CatalogDevice {
                    id: None,
                    brand_name: "AcmeMask Pro".to_string(),
                    company_name: "Acme Medical".to_string(),
                    description: "Single-use surgical mask".to_string(),
                    product_code: "FXX".to_string(),
                    gmdn_term: Some("Surgical face mask".to_string()),
                    identifier: None,
                },
                CatalogDevice {
                    id: None,
                    brand_name: "BreathSafe".to_string(),
                    company_name: "Acme Medical".to_string(),
                    description: "Surgical mask with ear loops".to_string(),
                    product_code: "FXX".to_string(),
                    gmdn_term: None,
                    identifier: None,
                },
                CatalogDevice {
                    id: None,
                    brand_name: "CardioPace 3000".to_string(),
                    company_name: "PulseWorks".to_string(),
                    description: "Implantable cardiac pacemaker".to_string(),
                    product_code: "DXY".to_string(),
                    gmdn_term: None,
                    identifier: None,
                },
            ])
            .unwrap();
        DeviceResolver::new(Arc::new(Mutex::new(store)))
    }

    fn resolved(result: &ToolResult) -> &ResolvedDevices {
        match result.structured.as_ref().unwrap() {
            StructuredResult::Devices(devices) => devices,
            other => panic!("unexpected aggregate: {other:?}"),
        }
    }

    #[test]
    fn test_exact_brand_match() {
        let resolver = resolver_with_catalog();
        let result = resolver.resolve("acmemask pro").unwrap();
        let devices = resolved(&result);
        assert!((devices.confidence - 1.0).abs() < f32::EPSILON);
        assert!(devices.product_codes.contains("FXX"));
        assert_eq!(devices.match_count, 1);
    }

    #[test]
    fn test_product_code_direct() {
        let resolver = resolver_with_catalog();
        let result = resolver.resolve("DXY").unwrap();
        let devices = resolved(&result);
        assert!((devices.confidence - 1.0).abs() < f32::EPSILON);
        assert_eq!(devices.product_codes.iter().next().unwrap(), "DXY");
    }

    #[test]
    fn test_full_text_stage() {
        let resolver = resolver_with_catalog();
        let result = resolver.resolve("surgical mask").unwrap();
        let devices = resolved(&result);
        assert_eq!(devices.match_count, 2);
        assert!(devices.confidence >= 0.6 && devices.confidence <= 0.95);
        assert_eq!(devices.top_manufacturers[0].name, "Acme Medical");
        assert_eq!(devices.top_manufacturers[0].count, 2);
    }

    #[test]
    fn test_fuzzy_stage() {
        let resolver = resolver_with_catalog();
        // One edit away from "BreathSafe"
        let result = resolver.resolve("BreathSafee").unwrap();
        let devices = resolved(&result);
        assert_eq!(devices.match_count, 1);
        assert!(devices.confidence >= 0.4 && devices.confidence <= 0.6);
    }

    #[test]
    fn test_no_match() {
        let resolver = resolver_with_catalog();
        let result = resolver.resolve("quantum flux capacitor").unwrap();
        let devices = resolved(&result);
        assert_eq!(devices.match_count, 0);
        assert!(devices.product_codes.is_empty());
    }

    #[test]
    fn test_envelope_shape() {
        let resolver = resolver_with_catalog();
        let result = resolver.resolve("FXX").unwrap();
        assert_eq!(result.endpoint, "resolve_device");
        assert_eq!(result.query_expression, "catalog:FXX");
        assert_eq!(result.meta.total, 2);
    }
}
