use serde_json::json;
use worker::{Response, Result};

use super::JsonReply;
use crate::services::core::infrastructure::circuit_breaker::CircuitBreakerState;
use crate::services::core::GrantSyncService;

/// Liveness plus breaker states. Any breaker that is not closed marks the
/// service degraded.
pub fn health_report(service: &GrantSyncService) -> JsonReply {
    let breakers = service.breaker_states();
    let degraded = breakers
        .iter()
        .any(|breaker| breaker.state != CircuitBreakerState::Closed);
    JsonReply::success(json!({
        "status": if degraded { "degraded" } else { "healthy" },
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "syncRunning": service.is_sync_running(),
        "breakers": breakers,
    }))
}

pub async fn handle_health(service: &GrantSyncService) -> Result<Response> {
    health_report(service).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::core::infrastructure::record_store::InMemoryStore;
    use crate::services::core::upstream::funding_api::{FundingEndpoint, FundingQuery};
    use crate::services::core::upstream::transport::UpstreamResponse;
    use crate::test_utils::{test_service, MockTransport};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_reports_open_breaker_as_degraded() {
        let transport = Arc::new(MockTransport::with_handler(|_| {
            Ok(UpstreamResponse::new(500, ""))
        }));
        let service = test_service(transport, Arc::new(InMemoryStore::new()), None);
        assert_eq!(health_report(&service).body["data"]["status"], "healthy");

        for _ in 0..5 {
            let _ = service
                .query(FundingEndpoint::Calls, &FundingQuery::default())
                .await;
        }
        let report = health_report(&service);
        assert_eq!(report.status, 200);
        assert_eq!(report.body["data"]["status"], "degraded");
        assert_eq!(report.body["data"]["syncRunning"], false);
    }
}
