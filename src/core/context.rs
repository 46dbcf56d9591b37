//! Shared resolver context.
//!
//! Structured entities produced by the resolver tools and reused by
//! subsequent turns in a session. All fields are optional and
//! monotonically enriched: a merge replaces fields the incoming context
//! sets and leaves the rest intact. Only an explicit reset clears a
//! field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;

/// A manufacturer with a record count, ordered by count descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerCount {
    /// Manufacturer name as it appears in the catalog.
    pub name: String,
    /// Number of matched records for this manufacturer.
    pub count: u64,
}

/// Device resolution result for one query term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDevices {
    /// The free-text term that was resolved.
    pub query: String,
    /// Distinct three-letter product codes across matches.
    pub product_codes: BTreeSet<String>,
    /// Top manufacturers by record count.
    pub top_manufacturers: Vec<ManufacturerCount>,
    /// Total matched catalog records.
    pub match_count: u64,
    /// Resolution confidence in `[0, 1]` by match stage.
    pub confidence: f32,
}

/// A canonical manufacturer grouping across FDA surface forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerGroup {
    /// Most frequent name variant.
    pub canonical_name: String,
    /// Other surface forms observed in FDA records.
    pub fda_variants: Vec<String>,
    /// Records across all variants.
    pub device_count: u64,
}

/// A country with a manufacturer count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCount {
    /// ISO 3166-1 alpha-2 code.
    pub code: String,
    /// Full English name.
    pub name: String,
    /// Manufacturer count for this country.
    pub count: u64,
}

/// Geographic resolution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationContext {
    /// Normalized region/country/state label.
    pub normalized_region: String,
    /// Countries in scope with manufacturer counts, ordered by count.
    pub countries: Vec<CountryCount>,
    /// Top companies across the scope.
    pub top_companies: Vec<String>,
    /// Top device types across the scope.
    pub top_device_types: Vec<String>,
}

/// Selector for one resolver-context field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverField {
    /// The device resolution.
    Devices,
    /// The manufacturer groupings.
    Manufacturers,
    /// The location context.
    Location,
}

/// Shared, mutation-by-merge resolver state for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverContext {
    /// Most recent device resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<ResolvedDevices>,
    /// Most recent manufacturer groupings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturers: Option<Vec<ManufacturerGroup>>,
    /// Most recent location resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationContext>,
}

impl ResolverContext {
    /// True when no field is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.devices.is_none() && self.manufacturers.is_none() && self.location.is_none()
    }

    /// Merges `other` into `self` field-wise: fields `other` sets
    /// replace the current value, absent fields leave prior values
    /// intact.
    pub fn merge(&mut self, other: Self) {
        if other.devices.is_some() {
            self.devices = other.devices;
        }
        if other.manufacturers.is_some() {
            self.manufacturers = other.manufacturers;
        }
        if other.location.is_some() {
            self.location = other.location;
        }
    }

    /// Clears one field. Used by the explicit per-field reset command.
    pub fn reset(&mut self, field: ResolverField) {
        match field {
            ResolverField::Devices => self.devices = None,
            ResolverField::Manufacturers => self.manufacturers = None,
            ResolverField::Location => self.location = None,
        }
    }

    /// Renders a compact summary for the planner prompt.
    ///
    /// Empty string when nothing is resolved.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        if let Some(devices) = &self.devices {
            let codes: Vec<&str> = devices
                .product_codes
                .iter()
                .take(8)
                .map(String::as_str)
                .collect();
            let _ = writeln!(
                out,
                "resolved devices: \"{}\" -> product codes [{}], {} records",
                devices.query,
                codes.join(", "),
                devices.match_count
            );
        }
        if let Some(groups) = &self.manufacturers {
            let names: Vec<&str> = groups
                .iter()
                .take(5)
                .map(|g| g.canonical_name.as_str())
                .collect();
            let _ = writeln!(out, "resolved manufacturers: [{}]", names.join(", "));
        }
        if let Some(location) = &self.location {
            let countries: Vec<&str> = location
                .countries
                .iter()
                .take(8)
                .map(|c| c.code.as_str())
                .collect();
            let _ = writeln!(
                out,
                "resolved location: {} -> countries [{}]",
                location.normalized_region,
                countries.join(", ")
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(query: &str) -> ResolvedDevices {
        ResolvedDevices {
            query: query.to_string(),
            product_codes: BTreeSet::from(["FXX".to_string()]),
            top_manufacturers: vec![ManufacturerCount {
                name: "Acme Medical".to_string(),
                count: 12,
            }],
            match_count: 12,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_merge_replaces_only_set_fields() {
        let mut ctx = ResolverContext {
            devices: Some(devices("mask")),
            manufacturers: Some(vec![ManufacturerGroup {
                canonical_name: "Medtronic".to_string(),
                fda_variants: vec!["MEDTRONIC INC".to_string()],
                device_count: 40,
            }]),
            location: None,
        };

        ctx.merge(ResolverContext {
            devices: Some(devices("pacemaker")),
            ..Default::default()
        });

        assert_eq!(ctx.devices.as_ref().unwrap().query, "pacemaker");
        assert!(ctx.manufacturers.is_some(), "untouched field preserved");
        assert!(ctx.location.is_none());
    }

    #[test]
    fn test_reset_single_field() {
        let mut ctx = ResolverContext {
            devices: Some(devices("mask")),
            ..Default::default()
        };
        ctx.reset(ResolverField::Devices);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_summary_mentions_codes() {
        let ctx = ResolverContext {
            devices: Some(devices("mask")),
            ..Default::default()
        };
        let summary = ctx.summary();
        assert!(summary.contains("FXX"));
        assert!(summary.contains("mask"));
    }

    #[test]
    fn test_summary_empty() {
        assert!(ResolverContext::default().summary().is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let ctx = ResolverContext {
            devices: Some(devices("mask")),
            ..Default::default()
        };
        let json = serde_json::to_string(&ctx).unwrap();
        let back: ResolverContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
