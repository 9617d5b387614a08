//! Resilient client for the funding-agency API.
//!
//! Every request goes through [`RetryPolicy`] with the upstream error taxonomy:
//!
//! * `401`/`403` fail at once as `AuthError`
//! * `429` is retried after `Retry-After` seconds, else `2^attempt` seconds,
//!   capped at the policy's `max_delay_ms`
//! * `5xx` and transport failures are retried with exponential backoff
//! * any other `4xx` fails at once as a generic `ApiError`
//!
//! Successful GETs can be served from a short-lived in-memory cache. Cache
//! hits never touch the network and do not extend the entry's lifetime.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::auth::TokenProvider;
use super::transport::{HttpMethod, HttpTransport, UpstreamRequest, UpstreamResponse};
use crate::services::core::infrastructure::response_cache::{request_cache_key, TtlCache};
use crate::services::core::infrastructure::retry::{retry_transient, RetryPolicy};
use crate::utils::logger::{logger, Logger};
use crate::utils::time::current_timestamp_ms;
use crate::utils::{SyncError, SyncResult};

pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiClientConfig {
    pub base_url: String,
    /// Per-request timeout applied by the transport
    pub timeout_ms: u64,
    pub cache_ttl_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://data.vinnova.se/api".to_string(),
            timeout_ms: 15_000,
            cache_ttl_ms: 2 * 60 * 1_000,
            retry: RetryPolicy::api_client(),
        }
    }
}

impl ApiClientConfig {
    pub fn validate(&self) -> SyncResult<()> {
        url::Url::parse(&self.base_url)?;
        if self.timeout_ms == 0 {
            return Err(SyncError::config_error("Timeout must be greater than 0"));
        }
        self.retry.validate()
    }
}

pub struct ResilientApiClient {
    config: ApiClientConfig,
    transport: Arc<dyn HttpTransport>,
    subscription_key: Option<SecretString>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    cache: TtlCache<Value>,
    logger: Logger,
}

impl ResilientApiClient {
    pub fn new(config: ApiClientConfig, transport: Arc<dyn HttpTransport>) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            cache: TtlCache::new(config.cache_ttl_ms),
            config,
            transport,
            subscription_key: None,
            token_provider: None,
            logger: logger().component("api_client"),
        })
    }

    pub fn with_subscription_key(mut self, key: SecretString) -> Self {
        self.subscription_key = Some(key);
        self
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    pub async fn get(&self, endpoint: &str, params: &BTreeMap<String, String>) -> SyncResult<Value> {
        self.request(HttpMethod::Get, endpoint, params, None, true)
            .await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> SyncResult<Value> {
        self.request(HttpMethod::Post, endpoint, &BTreeMap::new(), Some(body), false)
            .await
    }

    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http") {
            endpoint.to_string()
        } else {
            format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
        }
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: &BTreeMap<String, String>,
        body: Option<Value>,
        use_cache: bool,
    ) -> SyncResult<Value> {
        let url = self.resolve_url(endpoint);
        let cacheable = use_cache && method == HttpMethod::Get;
        let cache_key = request_cache_key(method.as_str(), &url, params);

        if cacheable {
            if let Some(hit) = self.cache.get(&cache_key) {
                self.logger.debug_with_meta(
                    "Cache hit",
                    Some(&serde_json::json!({ "method": method.as_str(), "url": url })),
                );
                return Ok(hit);
            }
        }

        let request = self.build_request(method, &url, params, body).await?;
        let label = format!("{} {}", method.as_str(), url);

        let result = self
            .config
            .retry
            .execute(
                &label,
                |attempt| self.attempt(request.clone(), attempt),
                retry_transient,
            )
            .await;

        match result {
            Ok(value) => {
                if cacheable {
                    self.cache.insert(cache_key, value.clone());
                }
                Ok(value)
            }
            Err(err) => {
                self.logger.error_with_meta(
                    "Upstream request failed",
                    Some(&serde_json::json!({
                        "method": method.as_str(),
                        "url": url,
                        "kind": err.kind.as_str(),
                        "status": err.status,
                        "error": err.message,
                    })),
                );
                Err(err)
            }
        }
    }

    async fn build_request(
        &self,
        method: HttpMethod,
        url: &str,
        params: &BTreeMap<String, String>,
        body: Option<Value>,
    ) -> SyncResult<UpstreamRequest> {
        let mut request = UpstreamRequest::new(method, url)
            .with_query(
                params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
            .with_header("Accept", "application/json");

        if let Some(key) = &self.subscription_key {
            request = request.with_header(SUBSCRIPTION_KEY_HEADER, key.expose_secret().clone());
        }
        if let Some(provider) = &self.token_provider {
            let token = provider.access_token().await?;
            request = request.with_header("Authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.with_json(body);
        }
        Ok(request)
    }

    async fn attempt(&self, request: UpstreamRequest, attempt: u32) -> SyncResult<Value> {
        let method = request.method;
        let url = request.url.clone();
        self.logger.info_with_meta(
            "Upstream request",
            Some(&serde_json::json!({ "method": method.as_str(), "url": url, "attempt": attempt })),
        );

        let started = current_timestamp_ms();
        let response = self.transport.send(request).await?;
        self.logger.info_with_meta(
            "Upstream response",
            Some(&serde_json::json!({
                "method": method.as_str(),
                "url": url,
                "status": response.status,
                "durationMs": current_timestamp_ms() - started,
            })),
        );

        categorize_response(response, attempt)
    }
}

/// Maps an HTTP response to a body or a categorized error.
pub fn categorize_response(response: UpstreamResponse, attempt: u32) -> SyncResult<Value> {
    let status = response.status;
    match status {
        200..=299 => {
            if response.body.trim().is_empty() {
                Ok(Value::Null)
            } else {
                response.json::<Value>().map_err(|e| {
                    SyncError::api_error(format!("Upstream returned invalid JSON: {}", e))
                        .with_status(status)
                        .with_detail("body", Value::String(truncate(&response.body, 200)))
                })
            }
        }
        401 | 403 => Err(SyncError::auth_error(
            "Unauthorized: invalid API key or credentials",
        )
        .with_status(status)),
        429 => {
            let retry_after_ms = response
                .header("retry-after")
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1_000))
                .unwrap_or_else(|| 2u64.saturating_pow(attempt).saturating_mul(1_000));
            Err(SyncError::rate_limit_error(format!(
                "Rate limited, retry after {}ms",
                retry_after_ms
            ))
            .with_retry_after_ms(retry_after_ms))
        }
        500..=599 => {
            Err(SyncError::server_error(format!("Server error: {}", status)).with_status(status))
        }
        _ => Err(SyncError::api_error(format!(
            "Upstream API error: {} - {}",
            status,
            truncate(&response.body, 200)
        ))
        .with_status(status)),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
