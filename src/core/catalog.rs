//! Local GUDID device catalog rows.
//!
//! The catalog mirrors a public GUDID snapshot with three searchable
//! surfaces per device: brand name, company name, description. The
//! bulk-ingest pipeline that produces it is external; this crate only
//! reads it (plus a CSV import convenience for development).

use serde::{Deserialize, Serialize};

/// One device record in the local catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDevice {
    /// Storage id, `None` before insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Brand name as labeled.
    pub brand_name: String,
    /// Labeler / manufacturer name.
    pub company_name: String,
    /// Device description.
    pub description: String,
    /// Three-letter FDA product code.
    pub product_code: String,
    /// GMDN preferred term, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gmdn_term: Option<String>,
    /// Primary device identifier (UDI-DI), when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let device = CatalogDevice {
            id: Some(1),
            brand_name: "AcmeMask Pro".to_string(),
            company_name: "Acme Medical".to_string(),
            description: "Single-use surgical mask".to_string(),
            product_code: "FXX".to_string(),
            gmdn_term: Some("Surgical face mask".to_string()),
            identifier: Some("00812345678905".to_string()),
        };
        let json = serde_json::to_string(&device).unwrap();
        let back: CatalogDevice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, device);
    }
}
