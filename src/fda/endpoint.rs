//! The seven openFDA device endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base URL of the openFDA device API family.
pub const DEFAULT_BASE_URL: &str = "https://api.fda.gov/device";

/// How an endpoint expects country values rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryFormat {
    /// ISO 3166-1 alpha-2 code ("CN").
    IsoCode,
    /// Full English name ("China").
    FullName,
}

/// One of the seven openFDA device datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Device classifications (risk class, product codes, regulations).
    Classification,
    /// 510(k) premarket notifications.
    Clearance510k,
    /// Premarket approvals.
    Pma,
    /// Enforcement reports (recalls).
    Enforcement,
    /// Adverse event reports (MAUDE).
    Event,
    /// Unique device identification records.
    Udi,
    /// Establishment registrations and device listings.
    RegistrationListing,
}

impl Endpoint {
    /// All endpoints, in routing-priority order.
    pub const ALL: [Self; 7] = [
        Self::Classification,
        Self::Clearance510k,
        Self::Pma,
        Self::Enforcement,
        Self::Event,
        Self::Udi,
        Self::RegistrationListing,
    ];

    /// Resource name as it appears in the endpoint URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Clearance510k => "510k",
            Self::Pma => "pma",
            Self::Enforcement => "enforcement",
            Self::Event => "event",
            Self::Udi => "udi",
            Self::RegistrationListing => "registrationlisting",
        }
    }

    /// Full request URL under the given base.
    #[must_use]
    pub fn url(self, base: &str) -> String {
        format!("{}/{}.json", base.trim_end_matches('/'), self.path())
    }

    /// The endpoint's country filter field and expected value format.
    ///
    /// `None` for endpoints without a country dimension. The exact field
    /// names are part of the openFDA contract and must not drift.
    #[must_use]
    pub const fn country_field(self) -> Option<(&'static str, CountryFormat)> {
        match self {
            Self::Event => Some(("device.manufacturer_d_country", CountryFormat::IsoCode)),
            Self::Enforcement => Some(("country", CountryFormat::FullName)),
            Self::RegistrationListing => Some(("iso_country_code", CountryFormat::IsoCode)),
            _ => None,
        }
    }

    /// Whether this endpoint carries a product-code field.
    ///
    /// Enforcement reports do not; the recalls tool must never emit a
    /// `product_code:` filter.
    #[must_use]
    pub const fn has_product_code(self) -> bool {
        !matches!(self, Self::Enforcement)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" | "classifications" => Ok(Self::Classification),
            "510k" | "510(k)" => Ok(Self::Clearance510k),
            "pma" => Ok(Self::Pma),
            "enforcement" | "recall" | "recalls" => Ok(Self::Enforcement),
            "event" | "events" | "maude" => Ok(Self::Event),
            "udi" | "gudid" => Ok(Self::Udi),
            "registrationlisting" | "registration" => Ok(Self::RegistrationListing),
            other => Err(format!("unknown endpoint: {other}")),
        }
    }
}
