// Cron-triggered routes: full sync and failure replay. Both require the shared
// cron secret in the `x-cron-secret` header.

use worker::{Request, Response, Result};

use super::JsonReply;
use crate::services::core::GrantSyncService;
use crate::types::EntityKind;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

fn reject_unauthorized(service: &GrantSyncService, provided: Option<&str>) -> Option<JsonReply> {
    if provided.is_some_and(|secret| service.config().cron_secret_matches(secret)) {
        return None;
    }
    crate::log_warn!("Rejected cron request with missing or invalid secret");
    Some(JsonReply::failure(401, "Unauthorized"))
}

pub async fn cron_sync(service: &GrantSyncService, provided: Option<&str>) -> JsonReply {
    if let Some(rejection) = reject_unauthorized(service, provided) {
        return rejection;
    }
    match service.run_scheduled_sync().await {
        Ok(outcome) => JsonReply::success(outcome),
        Err(e) => JsonReply::from_error(&e),
    }
}

pub async fn retry_failures(
    service: &GrantSyncService,
    provided: Option<&str>,
    entity: Option<&str>,
) -> JsonReply {
    if let Some(rejection) = reject_unauthorized(service, provided) {
        return rejection;
    }
    let Some(entity) = entity.and_then(EntityKind::parse) else {
        return JsonReply::failure(
            400,
            "entity must be one of grants, applications, activities",
        );
    };
    match service.retry_failed_syncs(entity).await {
        Ok(report) => JsonReply::success(report),
        Err(e) => JsonReply::from_error(&e),
    }
}

pub async fn handle_cron_sync(req: &Request, service: &GrantSyncService) -> Result<Response> {
    let secret = req.headers().get(CRON_SECRET_HEADER)?;
    cron_sync(service, secret.as_deref()).await.into_response()
}

pub async fn handle_retry_failures(req: &Request, service: &GrantSyncService) -> Result<Response> {
    let secret = req.headers().get(CRON_SECRET_HEADER)?;
    let url = req.url()?;
    let entity = url
        .query_pairs()
        .find(|(key, _)| key == "entity")
        .map(|(_, value)| value.into_owned());
    retry_failures(service, secret.as_deref(), entity.as_deref())
        .await
        .into_response()
}
