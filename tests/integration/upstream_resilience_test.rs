//! Upstream failure handling as seen by HTTP callers: client retries, the
//! query circuit breaker, stale fallbacks and credential headers.

#[path = "../common/mod.rs"]
mod common;

use common::mock_services::{fast_config, harness, harness_with};
use common::test_data::*;
use grant_sync::handlers::vinnova_query;
use grant_sync::services::core::infrastructure::retry::RetryPolicy;
use grant_sync::services::core::upstream::api_client::SUBSCRIPTION_KEY_HEADER;
use grant_sync::services::core::upstream::guarded_query::STALE_WARNING;
use grant_sync::services::core::upstream::{ClientCredentials, UpstreamResponse};
use grant_sync::GrantSyncConfig;
use secrecy::SecretString;
use serde_json::json;

/// One attempt per layer, so each query costs exactly one upstream request.
fn single_shot_config() -> GrantSyncConfig {
    let mut config = fast_config();
    config.api.retry = RetryPolicy::api_client().with_max_attempts(1);
    config.query.retry = RetryPolicy::fetch_wrapper().with_max_attempts(1);
    config
}

#[tokio::test]
async fn test_transient_errors_are_retried_until_success() {
    let h = harness();
    for _ in 0..3 {
        h.upstream.respond(CALLS_PATH, 503, json!({}));
    }
    h.upstream.respond(CALLS_PATH, 200, calls_page());

    let reply = vinnova_query(&h.service, "utlysningar", &[]).await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body["stale"], false);
    assert_eq!(reply.body["data"]["results"].as_array().map(Vec::len), Some(2));
    assert_eq!(h.upstream.requests_to(CALLS_PATH).len(), 4);
}

#[tokio::test]
async fn test_rate_limit_waits_for_retry_after() {
    let h = harness();
    h.upstream.respond_raw(
        APPLICATIONS_PATH,
        UpstreamResponse::new(429, "").with_header("Retry-After", "0"),
    );
    h.upstream.respond(APPLICATIONS_PATH, 200, mixed_applications_page());

    let reply = vinnova_query(&h.service, "ansokningar", &[]).await;
    assert_eq!(reply.status, 200);
    assert_eq!(h.upstream.requests_to(APPLICATIONS_PATH).len(), 2);
}

#[tokio::test]
async fn test_rejected_credentials_are_not_retried() {
    let h = harness();
    h.upstream.respond(CALLS_PATH, 401, json!({"message": "Access denied"}));

    let reply = vinnova_query(&h.service, "utlysningar", &[]).await;
    assert_eq!(reply.status, 502);
    assert_eq!(reply.body["code"], "AUTH_ERROR");
    assert_eq!(h.upstream.request_count(), 1);
}

#[tokio::test]
async fn test_open_circuit_answers_503_without_calling_upstream() {
    let h = harness_with(single_shot_config());
    h.upstream.respond(ACTIVITIES_PATH, 500, json!({}));

    for _ in 0..3 {
        let reply = vinnova_query(&h.service, "finansieradeaktiviteter", &[]).await;
        assert_eq!(reply.status, 502);
    }
    assert_eq!(h.upstream.request_count(), 3);

    let reply = vinnova_query(&h.service, "finansieradeaktiviteter", &[]).await;
    assert_eq!(reply.status, 503);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(h.upstream.request_count(), 3);

    // Other endpoints have their own breaker
    let calls = vinnova_query(&h.service, "utlysningar", &[]).await;
    assert_eq!(calls.status, 200);
}

#[tokio::test]
async fn test_failure_after_success_serves_stale_copy() {
    let h = harness_with(single_shot_config());
    h.upstream.respond(CALLS_PATH, 200, calls_page());
    h.upstream.respond(CALLS_PATH, 500, json!({}));

    let fresh = vinnova_query(&h.service, "utlysningar", &[]).await;
    assert_eq!(fresh.body["stale"], false);

    let stale = vinnova_query(&h.service, "utlysningar", &[]).await;
    assert_eq!(stale.status, 200);
    assert_eq!(stale.body["stale"], true);
    assert_eq!(stale.body["warning"], STALE_WARNING);
    assert_eq!(stale.body["data"], fresh.body["data"]);
}

#[tokio::test]
async fn test_subscription_key_is_sent() {
    let mut config = fast_config();
    config.subscription_key = Some(SecretString::new("sub-key-123".to_string()));
    let h = harness_with(config);

    h.service.sync_activities().await;
    let sent = h.upstream.requests_to(ACTIVITIES_PATH);
    assert_eq!(sent[0].header(SUBSCRIPTION_KEY_HEADER), Some("sub-key-123"));
}

#[tokio::test]
async fn test_oauth_token_is_fetched_once_and_reused() {
    let mut config = fast_config();
    config.oauth = Some(ClientCredentials {
        tenant_id: "tenant-1".to_string(),
        client_id: "client".to_string(),
        client_secret: SecretString::new("secret".to_string()),
        scope: "https://data.example/.default".to_string(),
    });
    let h = harness_with(config);
    h.upstream.respond(
        "/oauth2/v2.0/token",
        200,
        json!({"access_token": "tok-abc", "expires_in": 3600}),
    );

    h.service.sync_grants().await;
    h.service.sync_applications().await;

    assert_eq!(h.upstream.requests_to("/oauth2/v2.0/token").len(), 1);
    let calls = h.upstream.requests_to(CALLS_PATH);
    assert_eq!(calls[0].header("Authorization"), Some("Bearer tok-abc"));
    let applications = h.upstream.requests_to(APPLICATIONS_PATH);
    assert_eq!(applications[0].header("Authorization"), Some("Bearer tok-abc"));
}
