//! The seven endpoint tools, the aggregation helper and the bounded
//! pagination helper.
//!
//! Each tool accepts a subset of [`ExtractedParameters`], renders the
//! endpoint's filter expression, issues the request through the shared
//! client and returns the normalized [`ToolResult`] envelope with the
//! composed expression recorded for provenance.
//!
//! Invariants enforced here rather than upstream:
//! - `limit` is capped at 1000 on every tool.
//! - `search_recalls` never emits a `product_code:` filter; enforcement
//!   records have no such field.
//! - `search_events` requires at least one of device name, product
//!   code, country or firm name.
//! - country values render per endpoint: ISO codes for MAUDE and
//!   registrations, full names for enforcement.

use crate::core::{ExtractedParameters, ResultMeta, StructuredResult, TermCount, ToolResult};
use crate::error::{Result, ValidationError};
use crate::fda::countries::render_country;
use crate::fda::endpoint::{CountryFormat, Endpoint};
use crate::fda::query::QueryBuilder;
use crate::fda::transport::{FdaClient, FdaQuery, FdaResponse};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default page size when the question does not name one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Hard stop for the pagination helper.
pub const PAGINATE_CAP: usize = 1000;

/// Typed wrappers over the seven openFDA device endpoints.
pub struct EndpointTools {
    client: Arc<FdaClient>,
}

impl EndpointTools {
    /// Creates the tool suite over a shared client.
    #[must_use]
    pub const fn new(client: Arc<FdaClient>) -> Self {
        Self { client }
    }

    /// Searches device classifications.
    ///
    /// Auto-detects the query mode from `device_name` when no explicit
    /// identifier is present: three uppercase letters route to a
    /// product-code query, a `ddd.dddd` form routes to a
    /// regulation-number query, anything else is a device-name match.
    ///
    /// # Errors
    ///
    /// Returns validation errors for malformed parameters and transport
    /// errors once retries are exhausted.
    pub async fn search_classifications(
        &self,
        params: &ExtractedParameters,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let mut query = QueryBuilder::new();

        if let Some(code) = &params.product_code {
            query = query.field("product_code", &validate_product_code(code)?);
        }
        if let Some(regulation) = &params.regulation_number {
            query = query.field("regulation_number", regulation);
        }
        if let Some(name) = &params.device_name {
            query = match detect_classification_mode(name) {
                ClassificationMode::ProductCode => {
                    query.field("product_code", &name.to_ascii_uppercase())
                }
                ClassificationMode::RegulationNumber => query.field("regulation_number", name),
                ClassificationMode::DeviceName => query.field("device_name", name),
            };
        }
        if let Some(class) = params.device_class {
            query = query.field("device_class", &class.to_string());
        }

        self.run_search(Endpoint::Classification, query, params, cancel)
            .await
    }

    /// Searches 510(k) premarket notifications.
    ///
    /// A `K` + six digits value (whether passed as `k_number` or typed
    /// where a device name would go) becomes an exact `k_number` match.
    ///
    /// # Errors
    ///
    /// Returns validation errors for malformed parameters and transport
    /// errors once retries are exhausted.
    pub async fn search_510k(
        &self,
        params: &ExtractedParameters,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let mut query = QueryBuilder::new();

        if let Some(k_number) = &params.k_number {
            query = query.field("k_number", &validate_k_number(k_number)?);
        } else if let Some(name) = &params.device_name
            && is_k_number(name)
        {
            query = query.field("k_number", &name.to_ascii_uppercase());
        } else if let Some(name) = &params.device_name {
            query = query.field("device_name", name);
        }
        if let Some(applicant) = &params.applicant {
            query = query.field("applicant", applicant);
        }
        if let Some(code) = &params.product_code {
            query = query.field("product_code", &validate_product_code(code)?);
        }
        query = query.date_range(
            "decision_date",
            params.date_start.as_deref(),
            params.date_end.as_deref(),
        );

        self.run_search(Endpoint::Clearance510k, query, params, cancel)
            .await
    }

    /// Searches premarket approvals.
    ///
    /// A `P` + six digits value becomes an exact `pma_number` match.
    ///
    /// # Errors
    ///
    /// Returns validation errors for malformed parameters and transport
    /// errors once retries are exhausted.
    pub async fn search_pma(
        &self,
        params: &ExtractedParameters,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let mut query = QueryBuilder::new();

        if let Some(pma_number) = &params.pma_number {
            query = query.field("pma_number", &validate_pma_number(pma_number)?);
        } else if let Some(name) = &params.device_name
            && is_pma_number(name)
        {
            query = query.field("pma_number", &name.to_ascii_uppercase());
        } else if let Some(name) = &params.device_name {
            query = query.field("trade_name", name);
        }
        if let Some(applicant) = &params.applicant {
            query = query.field("applicant", applicant);
        }
        if let Some(code) = &params.product_code {
            query = query.field("product_code", &validate_product_code(code)?);
        }
        query = query.date_range(
            "decision_date",
            params.date_start.as_deref(),
            params.date_end.as_deref(),
        );

        self.run_search(Endpoint::Pma, query, params, cancel).await
    }

    /// Searches enforcement reports (recalls).
    ///
    /// Enforcement records carry no product-code field, so a
    /// `product_code` parameter is dropped (with a warning) rather than
    /// rendered. Country values render as full English names.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no usable filter remains and
    /// transport errors once retries are exhausted.
    pub async fn search_recalls(
        &self,
        params: &ExtractedParameters,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        if params.product_code.is_some() {
            tracing::warn!("enforcement has no product-code field; dropping product_code filter");
        }

        let mut query = QueryBuilder::new()
            .opt_field("recalling_firm", params.firm_name.as_deref())
            .opt_field("product_description", params.device_name.as_deref());
        if let Some(class) = params.recall_class {
            query = query.field("classification", &class.to_string());
        }
        if let Some(country) = &params.country {
            query = query.field("country", render_country(country, CountryFormat::FullName));
        }
        query = query.date_range(
            "recall_initiation_date",
            params.date_start.as_deref(),
            params.date_end.as_deref(),
        );

        if query.is_empty() {
            return Err(ValidationError::MissingFilter {
                tool: "search_recalls",
                required: "firm_name, device_name, recall_class, country, date range",
            }
            .into());
        }

        self.run_search(Endpoint::Enforcement, query, params, cancel)
            .await
    }

    /// Searches MAUDE adverse event reports.
    ///
    /// Country values render as ISO codes in the
    /// `device.manufacturer_d_country` field. At least one of device
    /// name, product code, country or firm name must be present.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no anchoring filter is present
    /// and transport errors once retries are exhausted.
    pub async fn search_events(
        &self,
        params: &ExtractedParameters,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        if params.device_name.is_none()
            && params.product_code.is_none()
            && params.product_codes.is_none()
            && params.country.is_none()
            && params.firm_name.is_none()
        {
            return Err(ValidationError::MissingFilter {
                tool: "search_events",
                required: "device_name, product_code, country, firm_name",
            }
            .into());
        }

        let mut query = QueryBuilder::new()
            .opt_field("device.generic_name", params.device_name.as_deref())
            .opt_field("device.manufacturer_d_name", params.firm_name.as_deref());
        if let Some(code) = &params.product_code {
            query = query.field(
                "device.device_report_product_code",
                &validate_product_code(code)?,
            );
        } else if let Some(codes) = &params.product_codes {
            query = query.any_of("device.device_report_product_code", codes);
        }
        if let Some(country) = &params.country {
            query = query.field(
                "device.manufacturer_d_country",
                render_country(country, CountryFormat::IsoCode),
            );
        }
        if let Some(event_type) = &params.event_type {
            query = query.field("event_type", event_type);
        }
        query = query.date_range(
            "date_received",
            params.date_start.as_deref(),
            params.date_end.as_deref(),
        );

        self.run_search(Endpoint::Event, query, params, cancel).await
    }

    /// Searches UDI records.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no filter is present and
    /// transport errors once retries are exhausted.
    pub async fn search_udi(
        &self,
        params: &ExtractedParameters,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let query = QueryBuilder::new()
            .opt_field("brand_name", params.device_name.as_deref())
            .opt_field("company_name", params.firm_name.as_deref())
            .opt_field("identifiers.id", params.udi.as_deref());

        if query.is_empty() {
            return Err(ValidationError::MissingFilter {
                tool: "search_udi",
                required: "device_name, firm_name, udi",
            }
            .into());
        }

        self.run_search(Endpoint::Udi, query, params, cancel).await
    }

    /// Searches establishment registrations and listings.
    ///
    /// # Errors
    ///
    /// Returns validation errors for malformed parameters and transport
    /// errors once retries are exhausted.
    pub async fn search_registrations(
        &self,
        params: &ExtractedParameters,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let mut query = QueryBuilder::new()
            .opt_field("registration.name", params.firm_name.as_deref())
            .opt_field("products.openfda.device_name", params.device_name.as_deref())
            .opt_field("registration.fei_number", params.fei_number.as_deref())
            .opt_field("registration.state_code", params.state.as_deref());
        if let Some(code) = &params.product_code {
            query = query.field("products.product_code", &validate_product_code(code)?);
        } else if let Some(codes) = &params.product_codes {
            query = query.any_of("products.product_code", codes);
        }
        if let Some(country) = &params.country {
            query = query.field(
                "iso_country_code",
                render_country(country, CountryFormat::IsoCode),
            );
        }

        self.run_search(Endpoint::RegistrationListing, query, params, cancel)
            .await
    }

    /// Aggregation helper: returns `{term, count}` pairs for a field.
    ///
    /// Used when the intent is counting or distribution rather than
    /// listing. Empty results come back as an empty `Counts` aggregate;
    /// they are never retried.
    ///
    /// # Errors
    ///
    /// Returns transport errors once retries are exhausted.
    pub async fn probe_count(
        &self,
        endpoint: Endpoint,
        field: &str,
        search: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let query = FdaQuery {
            search: search.map(std::string::ToString::to_string),
            count: Some(field.to_string()),
            limit: None,
            skip: None,
        };
        let response = self.client.fetch(endpoint, &query, cancel).await?;

        let counts: Vec<TermCount> = response
            .results
            .iter()
            .filter_map(|value| {
                let term = value.get("term")?.as_str()?.to_string();
                let count = value.get("count")?.as_u64()?;
                Some(TermCount { term, count })
            })
            .collect();

        let expression = search.map_or_else(
            || format!("count={field}"),
            |s| format!("{s} count={field}"),
        );

        Ok(ToolResult {
            endpoint: endpoint.path().to_string(),
            query_expression: expression,
            meta: ResultMeta {
                total: counts.iter().map(|c| c.count).sum(),
                skip: 0,
                limit: 0,
                last_updated: response.meta.last_updated,
            },
            results: response.results,
            structured: Some(StructuredResult::Counts(counts)),
        })
    }

    /// Bounded pagination: follows `skip += limit` until the endpoint
    /// runs dry or `cap` records are collected. The cap is a hard stop.
    ///
    /// # Errors
    ///
    /// Returns the underlying tool error from any page.
    pub async fn paginate(
        &self,
        endpoint: Endpoint,
        params: &ExtractedParameters,
        cap: usize,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let cap = cap.min(PAGINATE_CAP);
        let mut page_params = params.clone();
        let mut skip = params.skip.unwrap_or(0);
        let mut combined: Option<ToolResult> = None;

        loop {
            page_params.skip = Some(skip);
            let page = self.dispatch_endpoint(endpoint, &page_params, cancel).await?;
            let page_len = page.results.len();
            let limit = page.meta.limit.max(1);

            match &mut combined {
                None => combined = Some(page),
                Some(acc) => {
                    acc.results.extend(page.results);
                    acc.meta.total = page.meta.total;
                }
            }

            let collected = combined.as_ref().map_or(0, |c| c.results.len());
            if page_len == 0 || collected >= cap {
                break;
            }
            skip = skip.saturating_add(u32::try_from(limit).unwrap_or(u32::MAX));
        }

        let mut result = combined.unwrap_or_else(|| ToolResult::empty(endpoint.path(), ""));
        result.results.truncate(cap);
        Ok(result)
    }

    /// Routes a search to the tool for `endpoint`.
    async fn dispatch_endpoint(
        &self,
        endpoint: Endpoint,
        params: &ExtractedParameters,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        match endpoint {
            Endpoint::Classification => self.search_classifications(params, cancel).await,
            Endpoint::Clearance510k => self.search_510k(params, cancel).await,
            Endpoint::Pma => self.search_pma(params, cancel).await,
            Endpoint::Enforcement => self.search_recalls(params, cancel).await,
            Endpoint::Event => self.search_events(params, cancel).await,
            Endpoint::Udi => self.search_udi(params, cancel).await,
            Endpoint::RegistrationListing => self.search_registrations(params, cancel).await,
        }
    }

    /// Shared search path: render, fetch, envelope.
    async fn run_search(
        &self,
        endpoint: Endpoint,
        query: QueryBuilder,
        params: &ExtractedParameters,
        cancel: &CancellationToken,
    ) -> Result<ToolResult> {
        let expression = query.build();
        let limit = params.effective_limit(DEFAULT_LIMIT);
        let fda_query = FdaQuery {
            search: (!expression.is_empty()).then(|| expression.clone()),
            count: None,
            limit: Some(limit),
            skip: params.skip,
        };

        tracing::debug!(endpoint = %endpoint, search = %expression, limit, "endpoint search");
        let response = self.client.fetch(endpoint, &fda_query, cancel).await?;
        Ok(envelope(endpoint, expression, limit, params.skip, response))
    }
}

/// Wraps a decoded response into the normalized envelope.
fn envelope(
    endpoint: Endpoint,
    query_expression: String,
    limit: u32,
    skip: Option<u32>,
    response: FdaResponse,
) -> ToolResult {
    let page = response.meta.results.unwrap_or_default();
    ToolResult {
        endpoint: endpoint.path().to_string(),
        query_expression,
        meta: ResultMeta {
            total: page.total,
            skip: if page.skip > 0 {
                page.skip
            } else {
                u64::from(skip.unwrap_or(0))
            },
            limit: if page.limit > 0 {
                page.limit
            } else {
                u64::from(limit)
            },
            last_updated: response.meta.last_updated,
        },
        results: response.results,
        structured: None,
    }
}

/// Classification query mode detected from a free-text term.
enum ClassificationMode {
    ProductCode,
    RegulationNumber,
    DeviceName,
}

fn detect_classification_mode(term: &str) -> ClassificationMode {
    let trimmed = term.trim();
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_uppercase()) {
        ClassificationMode::ProductCode
    } else if is_regulation_number(trimmed) {
        ClassificationMode::RegulationNumber
    } else {
        ClassificationMode::DeviceName
    }
}

fn is_regulation_number(term: &str) -> bool {
    let mut parts = term.splitn(2, '.');
    let (Some(head), Some(tail)) = (parts.next(), parts.next()) else {
        return false;
    };
    head.len() == 3
        && tail.len() == 4
        && head.chars().all(|c| c.is_ascii_digit())
        && tail.chars().all(|c| c.is_ascii_digit())
}

fn is_k_number(term: &str) -> bool {
    let trimmed = term.trim();
    trimmed.len() == 7
        && (trimmed.starts_with('K') || trimmed.starts_with('k'))
        && trimmed[1..].chars().all(|c| c.is_ascii_digit())
}

fn is_pma_number(term: &str) -> bool {
    let trimmed = term.trim();
    trimmed.len() == 7
        && (trimmed.starts_with('P') || trimmed.starts_with('p'))
        && trimmed[1..].chars().all(|c| c.is_ascii_digit())
}

fn validate_product_code(code: &str) -> Result<String> {
    let upper = code.trim().to_ascii_uppercase();
    if upper.len() == 3 && upper.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(upper)
    } else {
        Err(ValidationError::InvalidProductCode {
            input: code.to_string(),
        }
        .into())
    }
}

fn validate_k_number(number: &str) -> Result<String> {
    let upper = number.trim().to_ascii_uppercase();
    if is_k_number(&upper) {
        Ok(upper)
    } else {
        Err(ValidationError::InvalidKNumber {
            input: number.to_string(),
        }
        .into())
    }
}

fn validate_pma_number(number: &str) -> Result<String> {
    let upper = number.trim().to_ascii_uppercase();
    if is_pma_number(&upper) {
        Ok(upper)
    } else {
        Err(ValidationError::InvalidPmaNumber {
            input: number.to_string(),
        }
        .into())
    }
}
