// Read path for callers: breaker -> retry -> upstream page, with a stale-cache fallback.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::funding_api::{FundingApi, FundingEndpoint, FundingQuery};
use crate::services::core::infrastructure::circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry,
};
use crate::services::core::infrastructure::response_cache::TtlCache;
use crate::services::core::infrastructure::retry::{retry_unless_fatal, RetryPolicy};
use crate::utils::logger::{logger, Logger};
use crate::utils::{ErrorKind, SyncError, SyncResult};

pub const STALE_WARNING: &str = "Data may be outdated due to upstream issues.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardedQueryConfig {
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    pub stale_ttl_ms: u64,
}

impl Default for GuardedQueryConfig {
    fn default() -> Self {
        Self {
            breaker: CircuitBreakerConfig::upstream_query(),
            retry: RetryPolicy::fetch_wrapper(),
            stale_ttl_ms: 5 * 60 * 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub data: Value,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Fields exposed to callers per endpoint
pub fn whitelist(endpoint: FundingEndpoint) -> &'static [&'static str] {
    match endpoint {
        FundingEndpoint::Calls => &["Diarienummer", "Titel", "Beskrivning", "Publiceringsdatum"],
        FundingEndpoint::Applications => &["Diarienummer", "Titel", "Status", "Beslutsdatum"],
        FundingEndpoint::Activities => &[
            "AktivitetsID",
            "Aktivitetsnamn",
            "Beskrivning",
            "Startdatum",
            "Slutdatum",
        ],
    }
}

/// Keeps whitelisted fields of every result; other top-level fields pass through.
pub fn sanitize_page(endpoint: FundingEndpoint, body: Value) -> Value {
    let allowed = whitelist(endpoint);
    let pick = |item: &Value| -> Value {
        let mut out = Map::new();
        if let Some(obj) = item.as_object() {
            for field in allowed {
                if let Some(value) = obj.get(*field) {
                    out.insert((*field).to_string(), value.clone());
                }
            }
        }
        Value::Object(out)
    };

    match body {
        Value::Array(items) => {
            serde_json::json!({ "results": items.iter().map(pick).collect::<Vec<_>>() })
        }
        Value::Object(mut map) => {
            let results = match map.get("results") {
                Some(Value::Array(items)) => items.iter().map(pick).collect(),
                _ => Vec::new(),
            };
            map.insert("results".to_string(), Value::Array(results));
            Value::Object(map)
        }
        _ => serde_json::json!({ "results": [] }),
    }
}

pub struct GuardedQueryService {
    api: Arc<FundingApi>,
    breakers: Arc<CircuitBreakerRegistry>,
    config: GuardedQueryConfig,
    stale_cache: TtlCache<Value>,
    logger: Logger,
}

impl GuardedQueryService {
    pub fn new(
        api: Arc<FundingApi>,
        breakers: Arc<CircuitBreakerRegistry>,
        config: GuardedQueryConfig,
    ) -> SyncResult<Self> {
        config.breaker.validate()?;
        config.retry.validate()?;
        Ok(Self {
            stale_cache: TtlCache::new(config.stale_ttl_ms),
            api,
            breakers,
            config,
            logger: logger().component("guarded_query"),
        })
    }

    fn cache_key(endpoint: FundingEndpoint, query: &FundingQuery) -> String {
        format!(
            "{}:{}",
            endpoint.name(),
            serde_json::to_string(query).unwrap_or_default()
        )
    }

    pub async fn query(
        &self,
        endpoint: FundingEndpoint,
        query: &FundingQuery,
    ) -> SyncResult<QueryOutcome> {
        query.validate()?;
        let breaker = self
            .breakers
            .get_or_create(&format!("query:{}", endpoint.name()), &self.config.breaker)?;
        let key = Self::cache_key(endpoint, query);

        let result = breaker
            .exec(|| {
                self.config.retry.execute(
                    endpoint.path(),
                    |_| self.api.get_page(endpoint, query),
                    retry_unless_fatal,
                )
            })
            .await;

        match result {
            Ok(body) => {
                let data = sanitize_page(endpoint, body);
                self.stale_cache.insert(key, data.clone());
                Ok(QueryOutcome {
                    data,
                    stale: false,
                    warning: None,
                })
            }
            Err(err) => {
                let meta = serde_json::json!({
                    "endpoint": endpoint.path(),
                    "kind": err.kind.as_str(),
                    "error": err.message,
                });
                if let Some(cached) = self.stale_cache.get(&key) {
                    self.logger
                        .warn_with_meta("Serving stale data after upstream failure", Some(&meta));
                    return Ok(QueryOutcome {
                        data: cached,
                        stale: true,
                        warning: Some(STALE_WARNING.to_string()),
                    });
                }
                if err.kind == ErrorKind::CircuitOpen {
                    self.logger
                        .warn_with_meta("Upstream circuit open, nothing cached", Some(&meta));
                    return Err(SyncError::service_unavailable(
                        "Upstream API temporarily unavailable due to repeated failures. Please try again later.",
                    ));
                }
                Err(err)
            }
        }
    }
}
