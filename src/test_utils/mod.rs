//! Shared test doubles for unit tests.

pub mod mock_store;
pub mod mock_transport;

pub use mock_store::{FaultyStore, RecordingAlertSink};
pub use mock_transport::MockTransport;

use secrecy::SecretString;
use std::sync::Arc;

use crate::config::GrantSyncConfig;
use crate::services::core::infrastructure::record_store::RecordStore;
use crate::services::core::infrastructure::retry::RetryPolicy;
use crate::services::core::GrantSyncService;

/// Service against a mock upstream with millisecond backoff.
pub fn test_service(
    transport: Arc<MockTransport>,
    store: Arc<dyn RecordStore>,
    cron_secret: Option<&str>,
) -> GrantSyncService {
    let mut config = GrantSyncConfig::default();
    config.api.base_url = "https://data.example/api".to_string();
    config.api.retry = RetryPolicy::api_client().with_base_delay_ms(1);
    config.sync.fetch_retry = RetryPolicy::fetch_wrapper().with_base_delay_ms(1);
    config.query.retry = RetryPolicy::fetch_wrapper().with_base_delay_ms(1);
    config.cron_secret = cron_secret.map(|s| SecretString::new(s.to_string()));
    GrantSyncService::new(config, store, transport, Arc::new(RecordingAlertSink::new()))
        .expect("test service")
}
