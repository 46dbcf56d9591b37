//! The DISPATCH node.
//!
//! Executes one iteration's planned calls. Resolver calls run first
//! (their output feeds the searches); independent calls inside each
//! phase run concurrently as a fan-out/fan-in. Tool failures are
//! captured as values inside the `ToolCall` records so the rest of the
//! iteration completes.
//!
//! DISPATCH is the only writer of the episode's resolver context; the
//! planner and assessor observe snapshots.

use crate::agent::planner::{Plan, PlannedCall};
use crate::agent::state::{AgentEvent, AgentState, Strategy};
use crate::core::{ExtractedParameters, StructuredResult, ToolCall};
use crate::error::{AgentError, Result, ValidationError};
use crate::fda::{Endpoint, EndpointTools, QueryBuilder, render_country};
use crate::resolve::{DeviceResolver, LocationResolver, ManufacturerResolver};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Resolver tool names (run before searches).
const RESOLVER_TOOLS: &[&str] = &["resolve_device", "resolve_manufacturer", "resolve_location"];

/// The DISPATCH node.
pub struct Dispatcher {
    tools: Arc<EndpointTools>,
    devices: Arc<DeviceResolver>,
    manufacturers: Arc<ManufacturerResolver>,
    locations: Arc<LocationResolver>,
}

impl Dispatcher {
    /// Creates a dispatcher over the tool suite and resolvers.
    #[must_use]
    pub const fn new(
        tools: Arc<EndpointTools>,
        devices: Arc<DeviceResolver>,
        manufacturers: Arc<ManufacturerResolver>,
        locations: Arc<LocationResolver>,
    ) -> Self {
        Self {
            tools,
            devices,
            manufacturers,
            locations,
        }
    }

    /// Executes the plan's calls, appending `ToolCall` records to the
    /// state and merging resolver output into the shared context.
    ///
    /// # Errors
    ///
    /// Returns only cancellation; tool failures are values inside the
    /// records.
    pub async fn execute(
        &self,
        plan: &Plan,
        state: &mut AgentState,
        cancel: &CancellationToken,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<()> {
        let (resolver_calls, search_calls): (Vec<&PlannedCall>, Vec<&PlannedCall>) = plan
            .calls
            .iter()
            .partition(|call| RESOLVER_TOOLS.contains(&call.tool.as_str()));

        // Phase 1: resolvers, concurrently
        let resolved = self.run_phase(&resolver_calls, cancel, events).await;
        for record in resolved {
            if let Some(StructuredResult::Devices(devices)) =
                record.result.as_ref().and_then(|r| r.structured.as_ref())
            {
                state.resolver_context.devices = Some(devices.clone());
            }
            if let Some(StructuredResult::Manufacturers(groups)) =
                record.result.as_ref().and_then(|r| r.structured.as_ref())
            {
                state.resolver_context.manufacturers = Some(groups.clone());
            }
            if let Some(StructuredResult::Location(location)) =
                record.result.as_ref().and_then(|r| r.structured.as_ref())
            {
                state.resolver_context.location = Some(location.clone());
            }
            state.tool_calls.push(record);
        }

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled.into());
        }

        // Phase 2: searches, with resolver output injected
        let injected: Vec<PlannedCall> = search_calls
            .into_iter()
            .map(|call| inject_context(call, state))
            .collect();
        let injected_refs: Vec<&PlannedCall> = injected.iter().collect();
        let searched = self.run_phase(&injected_refs, cancel, events).await;
        state.tool_calls.extend(searched);

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled.into());
        }

        // Safety-dossier follow-up: when the direct hits are all empty,
        // pull related device types from the classification dataset
        if plan.strategy == Strategy::SafetyDossier
            && state.result_total() == 0
            && let Some(device_name) = related_device_term(state)
        {
            let params = ExtractedParameters {
                device_name: Some(device_name),
                ..ExtractedParameters::default()
            };
            let follow_up = PlannedCall {
                tool: "search_classifications".to_string(),
                endpoint: None,
                count_field: None,
                params,
            };
            let records = self.run_phase(&[&follow_up], cancel, events).await;
            state.tool_calls.extend(records);
        }

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled.into());
        }
        Ok(())
    }

    /// Runs one phase's calls concurrently, returning completed records
    /// in call order.
    async fn run_phase(
        &self,
        calls: &[&PlannedCall],
        cancel: &CancellationToken,
        events: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Vec<ToolCall> {
        let futures = calls.iter().map(|call| {
            let call = (*call).clone();
            let cancel = cancel.clone();
            async move {
                if let Some(sender) = events {
                    let _ = sender
                        .send(AgentEvent::ToolCall {
                            tool_name: call.tool.clone(),
                        })
                        .await;
                }

                let record = ToolCall::begin(&call.tool, call.params.clone());
                let outcome = self.run_one(&call, &cancel).await;
                let record = match outcome {
                    Ok(result) => record.succeed(result),
                    Err(err) => {
                        tracing::warn!(tool = %call.tool, error = %err, "tool call failed");
                        record.fail(err.code(), err.to_string())
                    }
                };

                if let Some(sender) = events {
                    let _ = sender
                        .send(AgentEvent::ToolResult {
                            tool_name: record.tool_name.clone(),
                            result_count: record.result_count(),
                            error: record.error.as_ref().map(|e| e.reason.clone()),
                        })
                        .await;
                }
                record
            }
        });
        join_all(futures).await
    }

    /// Routes one call to its tool.
    async fn run_one(
        &self,
        call: &PlannedCall,
        cancel: &CancellationToken,
    ) -> Result<crate::core::ToolResult> {
        let params = &call.params;
        match call.tool.as_str() {
            "search_classifications" => self.tools.search_classifications(params, cancel).await,
            "search_510k" => self.tools.search_510k(params, cancel).await,
            "search_pma" => self.tools.search_pma(params, cancel).await,
            "search_recalls" => self.tools.search_recalls(params, cancel).await,
            "search_events" => self.tools.search_events(params, cancel).await,
            "search_udi" => self.tools.search_udi(params, cancel).await,
            "search_registrations" => self.tools.search_registrations(params, cancel).await,
            "probe_count" => {
                let endpoint = call.endpoint.unwrap_or(Endpoint::Classification);
                let field = call.count_field.as_deref().ok_or(
                    ValidationError::MissingFilter {
                        tool: "probe_count",
                        required: "count_field",
                    },
                )?;
                let filter = probe_filter(endpoint, params);
                self.tools
                    .probe_count(endpoint, field, filter.as_deref(), cancel)
                    .await
            }
            "resolve_device" => {
                let term = params
                    .device_name
                    .as_deref()
                    .or(params.product_code.as_deref())
                    .ok_or(ValidationError::MissingFilter {
                        tool: "resolve_device",
                        required: "device_name",
                    })?;
                self.devices.resolve(term)
            }
            "resolve_manufacturer" => {
                let term =
                    params
                        .firm_name
                        .as_deref()
                        .ok_or(ValidationError::MissingFilter {
                            tool: "resolve_manufacturer",
                            required: "firm_name",
                        })?;
                self.manufacturers.resolve(term, cancel).await
            }
            "resolve_location" => {
                let term = params
                    .country
                    .as_deref()
                    .or(params.state.as_deref())
                    .ok_or(ValidationError::MissingFilter {
                        tool: "resolve_location",
                        required: "country or state",
                    })?;
                self.locations
                    .resolve(term, params.device_name.as_deref(), cancel)
                    .await
            }
            other => Err(ValidationError::InvalidField {
                field: "tool",
                reason: format!("unknown tool: {other}"),
            }
            .into()),
        }
    }
}

/// Injects resolver output into a search call's parameters: resolved
/// product codes anchor endpoints that accept them when the planner
/// left no device anchor of its own.
fn inject_context(call: &PlannedCall, state: &AgentState) -> PlannedCall {
    let mut call = call.clone();
    if matches!(
        call.tool.as_str(),
        "search_events" | "search_registrations" | "search_510k" | "search_pma"
    ) && call.params.product_code.is_none()
        && call.params.product_codes.is_none()
        && let Some(devices) = &state.resolver_context.devices
        && !devices.product_codes.is_empty()
    {
        let codes: Vec<String> = devices.product_codes.iter().take(8).cloned().collect();
        if codes.len() == 1 {
            call.params.product_code = codes.into_iter().next();
        } else {
            call.params.product_codes = Some(codes);
        }
        // The free-text device term did its job during resolution
        if call.tool == "search_events" {
            call.params.device_name = None;
        }
    }
    call
}

/// Builds the aggregation filter for a planner-issued `probe_count`.
fn probe_filter(endpoint: Endpoint, params: &ExtractedParameters) -> Option<String> {
    let mut query = QueryBuilder::new();
    if endpoint == Endpoint::Classification {
        if let Some(class) = params.device_class {
            query = query.field("device_class", &class.to_string());
        }
        query = query.opt_field("device_name", params.device_name.as_deref());
    }
    if let Some((field, format)) = endpoint.country_field()
        && let Some(country) = params.country.as_deref()
    {
        query = query.field(field, render_country(country, format));
    }
    (!query.is_empty()).then(|| query.build())
}

/// Picks the device term for the dossier follow-up.
fn related_device_term(state: &AgentState) -> Option<String> {
    state
        .resolver_context
        .devices
        .as_ref()
        .map(|devices| devices.query.clone())
        .or_else(|| state.extracted.device_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ResolvedDevices, ResolverContext};
    use std::collections::BTreeSet;

    fn planned(tool: &str, params: ExtractedParameters) -> PlannedCall {
        PlannedCall {
            tool: tool.to_string(),
            endpoint: None,
            count_field: None,
            params,
        }
    }

    fn state_with_codes(codes: &[&str]) -> AgentState {
        AgentState {
            resolver_context: ResolverContext {
                devices: Some(ResolvedDevices {
                    query: "pacemaker".to_string(),
                    product_codes: codes.iter().map(|c| (*c).to_string()).collect::<BTreeSet<_>>(),
                    top_manufacturers: Vec::new(),
                    match_count: 3,
                    confidence: 0.9,
                }),
                ..ResolverContext::default()
            },
            ..AgentState::default()
        }
    }

    #[test]
    fn test_inject_single_code() {
        let call = planned(
            "search_events",
            ExtractedParameters {
                device_name: Some("pacemaker".to_string()),
                ..Default::default()
            },
        );
        let injected = inject_context(&call, &state_with_codes(&["DXY"]));
        assert_eq!(injected.params.product_code.as_deref(), Some("DXY"));
        assert_eq!(injected.params.device_name, None);
    }

    #[test]
    fn test_inject_multiple_codes_as_group() {
        let call = planned("search_events", ExtractedParameters::default());
        let injected = inject_context(&call, &state_with_codes(&["DXY", "LWP"]));
        assert_eq!(
            injected.params.product_codes,
            Some(vec!["DXY".to_string(), "LWP".to_string()])
        );
    }

    #[test]
    fn test_inject_respects_planner_code() {
        let call = planned(
            "search_events",
            ExtractedParameters {
                product_code: Some("FXX".to_string()),
                ..Default::default()
            },
        );
        let injected = inject_context(&call, &state_with_codes(&["DXY"]));
        assert_eq!(injected.params.product_code.as_deref(), Some("FXX"));
    }

    #[test]
    fn test_inject_skips_recalls() {
        // Recalls have no product-code field; nothing to inject
        let call = planned("search_recalls", ExtractedParameters::default());
        let injected = inject_context(&call, &state_with_codes(&["DXY"]));
        assert_eq!(injected.params.product_code, None);
        assert_eq!(injected.params.product_codes, None);
    }

    #[test]
    fn test_probe_filter_classification() {
        let params = ExtractedParameters {
            device_class: Some(3),
            ..Default::default()
        };
        assert_eq!(
            probe_filter(Endpoint::Classification, &params).as_deref(),
            Some("device_class:3")
        );
        assert_eq!(probe_filter(Endpoint::Classification, &ExtractedParameters::default()), None);
    }

    #[test]
    fn test_probe_filter_country_per_endpoint_format() {
        let params = ExtractedParameters {
            country: Some("China".to_string()),
            ..Default::default()
        };
        // ISO-code endpoints convert the canonical full name
        assert_eq!(
            probe_filter(Endpoint::Event, &params).as_deref(),
            Some("device.manufacturer_d_country:CN")
        );
        assert_eq!(
            probe_filter(Endpoint::RegistrationListing, &params).as_deref(),
            Some("iso_country_code:CN")
        );
        // Enforcement keeps the full English name
        assert_eq!(
            probe_filter(Endpoint::Enforcement, &params).as_deref(),
            Some("country:China")
        );
    }

    #[test]
    fn test_related_device_term_prefers_resolution() {
        let mut state = state_with_codes(&["DXY"]);
        state.extracted.device_name = Some("cardiac pacer".to_string());
        assert_eq!(related_device_term(&state).as_deref(), Some("pacemaker"));

        let empty = AgentState::default();
        assert_eq!(related_device_term(&empty), None);
    }
}
