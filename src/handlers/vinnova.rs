// Read-through passthrough for the three upstream endpoints.

use worker::{Request, Response, Result};

use super::JsonReply;
use crate::services::core::upstream::funding_api::{FundingEndpoint, FundingQuery};
use crate::services::core::GrantSyncService;
use crate::utils::SyncError;

pub const VINNOVA_ROUTE_PREFIX: &str = "/api/vinnova/";

/// One page of `endpoint_name`. The body is the sanitized page with its
/// `stale` flag, not wrapped in the API envelope.
pub async fn vinnova_query(
    service: &GrantSyncService,
    endpoint_name: &str,
    pairs: &[(String, String)],
) -> JsonReply {
    let Some(endpoint) = FundingEndpoint::from_name(endpoint_name) else {
        return JsonReply::from_error(&SyncError::not_found(format!(
            "Unknown endpoint '{}'",
            endpoint_name
        )));
    };
    let query = match FundingQuery::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    {
        Ok(query) => query,
        Err(e) => return JsonReply::from_error(&e),
    };
    match service.query(endpoint, &query).await {
        Ok(outcome) => JsonReply::json(200, &outcome),
        Err(e) => JsonReply::from_error(&e),
    }
}

pub async fn handle_vinnova_query(
    req: &Request,
    service: &GrantSyncService,
    endpoint_name: &str,
) -> Result<Response> {
    let url = req.url()?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    vinnova_query(service, endpoint_name, &pairs)
        .await
        .into_response()
}
