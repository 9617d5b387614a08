// src/services/core/upstream/mod.rs

//! Upstream funding-agency API access: transport, auth, resilient client,
//! endpoint pagination and the guarded read path used by HTTP callers.

pub mod api_client;
pub mod auth;
pub mod funding_api;
pub mod guarded_query;
pub mod transport;

pub use api_client::{ApiClientConfig, ResilientApiClient};
pub use auth::{ClientCredentials, ClientCredentialsTokenProvider, TokenProvider};
pub use funding_api::{FundingApi, FundingEndpoint, FundingPage, FundingQuery};
pub use guarded_query::{GuardedQueryConfig, GuardedQueryService, QueryOutcome};
pub use transport::{HttpTransport, ReqwestTransport, TransportError, UpstreamRequest, UpstreamResponse};
