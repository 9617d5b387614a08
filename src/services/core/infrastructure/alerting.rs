// Alert sinks. Alerts are best-effort: delivery failures are logged, never raised.

use async_trait::async_trait;
use std::sync::Arc;

use crate::services::core::upstream::transport::{HttpTransport, UpstreamRequest};
use crate::utils::logger::logger;

#[async_trait(?Send)]
pub trait AlertSink {
    async fn send_alert(&self, message: &str);
}

/// Posts `{"text": message}` to a Slack-compatible incoming webhook.
pub struct SlackWebhookAlertSink {
    webhook_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl SlackWebhookAlertSink {
    pub fn new(webhook_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            transport,
        }
    }
}

#[async_trait(?Send)]
impl AlertSink for SlackWebhookAlertSink {
    async fn send_alert(&self, message: &str) {
        let request = UpstreamRequest::post(&self.webhook_url)
            .with_json(serde_json::json!({ "text": message }));

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {}
            Ok(response) => logger().error_with_meta(
                "Alert webhook rejected message",
                Some(&serde_json::json!({ "status": response.status })),
            ),
            Err(err) => logger().error_with_meta(
                "Failed to send alert",
                Some(&serde_json::json!({ "error": err.to_string() })),
            ),
        }
    }
}

/// Fallback when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait(?Send)]
impl AlertSink for LogAlertSink {
    async fn send_alert(&self, message: &str) {
        logger().warn_with_meta("ALERT", Some(&serde_json::json!({ "alert": message })));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::core::upstream::transport::{
        RequestBody, TransportError, UpstreamResponse,
    };
    use crate::test_utils::MockTransport;

    #[tokio::test]
    async fn test_slack_sink_posts_text_payload() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(UpstreamResponse::new(200, "ok"));
        let sink = SlackWebhookAlertSink::new("https://hooks.example/abc", transport.clone());

        sink.send_alert("grants sync failed").await;

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://hooks.example/abc");
        assert_eq!(
            sent[0].body,
            Some(RequestBody::Json(serde_json::json!({"text": "grants sync failed"})))
        );
    }

    #[tokio::test]
    async fn test_slack_sink_swallows_transport_errors() {
        let transport = Arc::new(MockTransport::new());
        transport.push_error(TransportError::Connect("refused".to_string()));
        let sink = SlackWebhookAlertSink::new("https://hooks.example/abc", transport.clone());

        sink.send_alert("still returns").await;
        assert_eq!(transport.request_count(), 1);
    }
}
