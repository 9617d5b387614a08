// Mock Service Implementations
// Upstream and alerting doubles for driving the service without network access

#![allow(dead_code)]

use async_trait::async_trait;
use grant_sync::services::core::infrastructure::alerting::AlertSink;
use grant_sync::services::core::infrastructure::record_store::{
    InMemoryStore, RecordStore, Row, StoreError, StoreResult,
};
use grant_sync::services::core::infrastructure::retry::RetryPolicy;
use grant_sync::services::core::upstream::{
    HttpTransport, TransportError, UpstreamRequest, UpstreamResponse,
};
use grant_sync::{GrantSyncConfig, GrantSyncService};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// Upstream stub keyed by URL path suffix. Each route replays its queued
/// responses and then repeats the last one. Unknown routes answer `[]`.
#[derive(Default)]
pub struct UpstreamStub {
    routes: Mutex<HashMap<String, VecDeque<Result<UpstreamResponse, TransportError>>>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl UpstreamStub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.push(path, Ok(UpstreamResponse::new(status, body.to_string())));
    }

    pub fn respond_raw(&self, path: &str, response: UpstreamResponse) {
        self.push(path, Ok(response));
    }

    pub fn fail(&self, path: &str, error: TransportError) {
        self.push(path, Err(error));
    }

    fn push(&self, path: &str, outcome: Result<UpstreamResponse, TransportError>) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn requests_to(&self, path: &str) -> Vec<UpstreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|request| request.url.ends_with(path))
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait(?Send)]
impl HttpTransport for UpstreamStub {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = routes
            .iter_mut()
            .find(|(path, _)| request.url.ends_with(path.as_str()))
            .map(|(_, queue)| queue);
        match queue {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Ok(UpstreamResponse::new(200, "[]"))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(UpstreamResponse::new(200, "[]"))),
            None => Ok(UpstreamResponse::new(200, "[]")),
        }
    }
}

#[derive(Default)]
pub struct CollectingAlertSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingAlertSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait(?Send)]
impl AlertSink for CollectingAlertSink {
    async fn send_alert(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

/// In-memory store whose upserts into selected tables can be made to fail.
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    failing_tables: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            failing_tables: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_writes_to(&self, table: &str) {
        self.failing_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_string());
    }

    pub fn heal(&self) {
        self.failing_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn check(&self, table: &str) -> StoreResult<()> {
        if self
            .failing_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(table)
        {
            return Err(StoreError::Query(format!("disk I/O error writing {}", table)));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl RecordStore for FlakyStore {
    async fn select_one(&self, table: &str, key_column: &str, key: &str) -> StoreResult<Row> {
        self.inner.select_one(table, key_column, key).await
    }

    async fn select_many(&self, table: &str, filters: &[(&str, Value)]) -> StoreResult<Vec<Row>> {
        self.inner.select_many(table, filters).await
    }

    async fn upsert(&self, table: &str, record: &Row, conflict_key: &str) -> StoreResult<()> {
        self.check(table)?;
        self.inner.upsert(table, record, conflict_key).await
    }

    async fn insert(&self, table: &str, record: &Row) -> StoreResult<()> {
        self.check(table)?;
        self.inner.insert(table, record).await
    }

    async fn update(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        patch: &Row,
    ) -> StoreResult<u64> {
        self.check(table)?;
        self.inner.update(table, key_column, key, patch).await
    }

    async fn delete(&self, table: &str, key_column: &str, key: &str) -> StoreResult<u64> {
        self.inner.delete(table, key_column, key).await
    }
}

pub struct TestHarness {
    pub upstream: Arc<UpstreamStub>,
    /// Backing rows, for assertions
    pub store: Arc<InMemoryStore>,
    /// What the service writes through
    pub flaky: Arc<FlakyStore>,
    pub alerts: Arc<CollectingAlertSink>,
    pub service: GrantSyncService,
}

/// Config with millisecond backoff and no response caching.
pub fn fast_config() -> GrantSyncConfig {
    let mut config = GrantSyncConfig::default();
    config.api.base_url = "https://data.example/api".to_string();
    config.api.cache_ttl_ms = 0;
    config.api.retry = RetryPolicy::api_client().with_base_delay_ms(1);
    config.sync.fetch_retry = RetryPolicy::fetch_wrapper().with_base_delay_ms(1);
    config.query.retry = RetryPolicy::fetch_wrapper().with_base_delay_ms(1);
    config
}

pub fn harness_with(config: GrantSyncConfig) -> TestHarness {
    let upstream = UpstreamStub::new();
    let store = Arc::new(InMemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(store.clone()));
    let alerts = Arc::new(CollectingAlertSink::default());
    let service = GrantSyncService::new(config, flaky.clone(), upstream.clone(), alerts.clone())
        .expect("service should build from test config");
    TestHarness {
        upstream,
        store,
        flaky,
        alerts,
        service,
    }
}

pub fn harness() -> TestHarness {
    harness_with(fast_config())
}
