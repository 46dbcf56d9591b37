//! Location resolver.
//!
//! Classifies a geographic term as a country, a configured
//! multi-country region ("Europe", "APAC") or a US state, then fans out
//! one manufacturer-count probe per country in scope (optionally
//! filtered by a device-type term) plus one device-type probe across
//! the scope.

use crate::core::{CountryCount, LocationContext, ResultMeta, StructuredResult, ToolResult};
use crate::error::Result;
use crate::fda::{Endpoint, EndpointTools, QueryBuilder, country_name, country_to_iso, state_code};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Countries probed per region before the fan-out is cut off.
const MAX_COUNTRIES_PER_REGION: usize = 12;

/// Top companies / device types kept in the context.
const TOP_N: usize = 10;

/// Resolver dispatching aggregation probes per country.
pub struct LocationResolver {
    tools: Arc<EndpointTools>,
    regions: BTreeMap<String, Vec<String>>,
}

impl LocationResolver {
    /// Creates a resolver with the configured region memberships.
    #[must_use]
    pub const fn new(tools: Arc<EndpointTools>, regions: BTreeMap<String, Vec<String>>) -> Self {
        Self { tools, regions }
    }

    /// Resolves a geographic term, optionally scoped to a device type.
    ///
    /// # Errors
    ///
    /// Returns an error only when every probe fails; individual country
    /// probe failures are skipped.
    pub async fn resolve(
        &self,
        term: &str,
        device_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let scope = self.classify(term);

        match scope {
            Scope::State(code) => self.resolve_state(term, code, device_type, cancel).await,
            Scope::Countries(label, codes) => {
                self.resolve_countries(&label, &codes, device_type, cancel)
                    .await
            }
        }
    }

    /// Classifies the term: configured region first, then country, then
    /// US state; unknown terms probe as a single pass-through country.
    fn classify(&self, term: &str) -> Scope {
        let lower = term.trim().to_ascii_lowercase();
        if let Some(codes) = self.regions.get(&lower) {
            let mut codes = codes.clone();
            codes.truncate(MAX_COUNTRIES_PER_REGION);
            return Scope::Countries(term.trim().to_string(), codes);
        }
        if let Some(code) = country_to_iso(term) {
            return Scope::Countries(
                country_name(code).unwrap_or(term).to_string(),
                vec![code.to_string()],
            );
        }
        if let Some(code) = state_code(term) {
            return Scope::State(code);
        }
        Scope::Countries(term.trim().to_string(), vec![term.trim().to_string()])
    }

    async fn resolve_state(
        &self,
        term: &str,
        code: &'static str,
        device_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let mut search = QueryBuilder::new().field("registration.state_code", code);
        if let Some(device) = device_type {
            search = search.field("products.openfda.device_name", device);
        }
        let expression = search.build();

        let companies = self
            .tools
            .probe_count(
                Endpoint::RegistrationListing,
                "registration.name",
                Some(&expression),
                cancel,
            )
            .await?;
        let device_types = self
            .tools
            .probe_count(
                Endpoint::RegistrationListing,
                "products.openfda.device_name",
                Some(&expression),
                cancel,
            )
            .await?;

        let company_counts = counts_of(&companies);
        let context = LocationContext {
            normalized_region: format!("US-{code}"),
            countries: vec![CountryCount {
                code: "US".to_string(),
                name: "United States".to_string(),
                count: company_counts.len() as u64,
            }],
            top_companies: top_terms(&company_counts),
            top_device_types: top_terms(&counts_of(&device_types)),
        };
        Ok(envelope(term, expression, context, companies.meta.last_updated))
    }

    async fn resolve_countries(
        &self,
        label: &str,
        codes: &[String],
        device_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        // One manufacturer probe per country, in parallel
        let probes = codes.iter().map(|code| {
            let tools = Arc::clone(&self.tools);
            let cancel = cancel.clone();
            let mut search = QueryBuilder::new().field("iso_country_code", code);
            if let Some(device) = device_type {
                search = search.field("products.openfda.device_name", device);
            }
            let expression = search.build();
            async move {
                let outcome = tools
                    .probe_count(
                        Endpoint::RegistrationListing,
                        "registration.name",
                        Some(&expression),
                        &cancel,
                    )
                    .await;
                (code.clone(), outcome)
            }
        });
        let outcomes = join_all(probes).await;

        let mut countries = Vec::new();
        let mut all_companies: Vec<(String, u64)> = Vec::new();
        let mut last_updated = None;
        let mut last_error = None;
        for (code, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    let counts = counts_of(&result);
                    countries.push(CountryCount {
                        name: country_name(&code).unwrap_or(&code).to_string(),
                        count: counts.len() as u64,
                        code,
                    });
                    all_companies.extend(counts);
                    if last_updated.is_none() {
                        last_updated = result.meta.last_updated;
                    }
                }
                Err(err) => {
                    tracing::warn!(country = %code, error = %err, "country probe failed, skipping");
                    last_error = Some(err);
                }
            }
        }
        if countries.is_empty()
            && let Some(err) = last_error
        {
            return Err(err);
        }
        countries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));

        // One device-type probe across the whole scope
        let scope_expression = QueryBuilder::new()
            .any_of("iso_country_code", codes)
            .build();
        let top_device_types = match self
            .tools
            .probe_count(
                Endpoint::RegistrationListing,
                "products.openfda.device_name",
                (!scope_expression.is_empty()).then_some(scope_expression.as_str()),
                cancel,
            )
            .await
        {
            Ok(result) => top_terms(&counts_of(&result)),
            Err(err) => {
                tracing::warn!(error = %err, "device-type probe failed, skipping");
                Vec::new()
            }
        };

        all_companies.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        all_companies.truncate(TOP_N);

        let context = LocationContext {
            normalized_region: label.to_string(),
            countries,
            top_companies: all_companies.into_iter().map(|(name, _)| name).collect(),
            top_device_types,
        };
        Ok(envelope(label, scope_expression, context, last_updated))
    }
}

enum Scope {
    Countries(String, Vec<String>),
    State(&'static str),
}

/// Pulls the term/count pairs out of a probe result.
fn counts_of(result: &ToolResult) -> Vec<(String, u64)> {
    match &result.structured {
        Some(StructuredResult::Counts(counts)) => counts
            .iter()
            .map(|c| (c.term.clone(), c.count))
            .collect(),
        _ => Vec::new(),
    }
}

fn top_terms(counts: &[(String, u64)]) -> Vec<String> {
    let mut sorted = counts.to_vec();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(TOP_N);
    sorted.into_iter().map(|(term, _)| term).collect()
}

fn envelope(
    term: &str,
    expression: String,
    context: LocationContext,
    last_updated: Option<String>,
) -> ToolResult {
    ToolResult {
        endpoint: "resolve_location".to_string(),
        query_expression: if expression.is_empty() {
            format!("location:{term}")
        } else {
            expression
        },
        meta: ResultMeta {
            total: context.countries.iter().map(|c| c.count).sum(),
            last_updated,
            ..ResultMeta::default()
        },
        results: Vec::new(),
        structured: Some(StructuredResult::Location(context)),
    }
}
