//! openFDA device endpoint layer.
//!
//! One typed wrapper per FDA endpoint over a shared retrying transport,
//! plus the aggregation helper (`probe_count`) and a bounded pagination
//! helper. Tools are pure functions over transport + parameters; they
//! never read the resolver context (the planner decides what to pass).

mod countries;
mod endpoint;
mod query;
mod tools;
mod transport;

pub use countries::{country_name, country_to_iso, is_us_state, render_country, state_code};
pub use endpoint::{CountryFormat, Endpoint};
pub use query::QueryBuilder;
pub use tools::{EndpointTools, PAGINATE_CAP};
pub use transport::{FdaClient, FdaQuery, FdaResponse, HttpSend, ReqwestSender, TransportResponse};
