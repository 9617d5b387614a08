//! Grant sync service
//!
//! Wires the upstream client, record store, breakers and alerting into the
//! operations exposed to the scheduler and the HTTP routes. One instance is
//! meant to live for the whole process so caches and breakers are shared.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::GrantSyncConfig;
use crate::services::core::infrastructure::alerting::{
    AlertSink, LogAlertSink, SlackWebhookAlertSink,
};
use crate::services::core::infrastructure::circuit_breaker::{
    CircuitBreakerRegistry, CircuitBreakerStateInfo,
};
use crate::services::core::infrastructure::data_synchronization::{
    CheckpointStore, ConflictResolver, EntityPipeline, FailureLedger, ProgressTracker,
    SyncCoordinator, SyncLease,
};
use crate::services::core::infrastructure::record_store::RecordStore;
use crate::services::core::upstream::api_client::ResilientApiClient;
use crate::services::core::upstream::auth::ClientCredentialsTokenProvider;
use crate::services::core::upstream::funding_api::{FundingApi, FundingEndpoint, FundingQuery};
use crate::services::core::upstream::guarded_query::{GuardedQueryService, QueryOutcome};
use crate::services::core::upstream::transport::HttpTransport;
use crate::types::{EntityKind, RetryFailuresReport, SyncReport};
use crate::utils::logger::{logger, Logger};
use crate::utils::{ErrorKind, SyncResult};

/// Lease name for the scheduled full sync
pub const SCHEDULED_SYNC_JOB: &str = "vinnova_sync_all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScheduledSyncOutcome {
    Completed { reports: Vec<SyncReport> },
    Skipped { reason: String },
}

/// Slack sink when a webhook is configured, log sink otherwise.
pub fn alert_sink_for(
    config: &GrantSyncConfig,
    transport: Arc<dyn HttpTransport>,
) -> Arc<dyn AlertSink> {
    match &config.slack_webhook_url {
        Some(url) => Arc::new(SlackWebhookAlertSink::new(url.clone(), transport)),
        None => Arc::new(LogAlertSink),
    }
}

pub struct GrantSyncService {
    config: GrantSyncConfig,
    api: Arc<FundingApi>,
    breakers: Arc<CircuitBreakerRegistry>,
    coordinator: SyncCoordinator,
    query: GuardedQueryService,
    lease: SyncLease,
    logger: Logger,
}

impl GrantSyncService {
    /// Credentials are moved out of `config` into the API client.
    pub fn new(
        mut config: GrantSyncConfig,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn HttpTransport>,
        alerts: Arc<dyn AlertSink>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let mut client = ResilientApiClient::new(config.api.clone(), transport.clone())?;
        if let Some(key) = config.subscription_key.take() {
            client = client.with_subscription_key(key);
        }
        if let Some(credentials) = config.oauth.take() {
            client = client.with_token_provider(Arc::new(ClientCredentialsTokenProvider::new(
                credentials,
                transport,
            )));
        }
        let api = Arc::new(
            FundingApi::new(Arc::new(client)).with_paging(config.page_size, config.max_pages),
        );

        let breakers = Arc::new(CircuitBreakerRegistry::new());
        let coordinator = SyncCoordinator::new(
            Arc::new(ConflictResolver::new(store.clone(), config.resolver.clone())),
            CheckpointStore::new(store.clone()),
            ProgressTracker::new(store.clone()),
            Arc::new(FailureLedger::new(store.clone())),
            breakers.clone(),
            alerts,
            config.sync.clone(),
        )?;
        let query = GuardedQueryService::new(api.clone(), breakers.clone(), config.query.clone())?;
        let lease = SyncLease::new(store, config.lease_ttl_minutes)?;

        Ok(Self {
            config,
            api,
            breakers,
            coordinator,
            query,
            lease,
            logger: logger().component("grant_sync_service"),
        })
    }

    pub fn config(&self) -> &GrantSyncConfig {
        &self.config
    }

    pub fn breaker_states(&self) -> Vec<CircuitBreakerStateInfo> {
        self.breakers.states()
    }

    pub fn is_sync_running(&self) -> bool {
        self.coordinator.is_running()
    }

    pub async fn sync_entity(&self, entity: EntityKind) -> SyncReport {
        let pipeline = EntityPipeline::for_entity(entity);
        let api: &FundingApi = &self.api;
        self.coordinator
            .sync_entity(&pipeline, move |since| api.fetch_entity(entity, since), None)
            .await
    }

    pub async fn sync_grants(&self) -> SyncReport {
        self.sync_entity(EntityKind::Grants).await
    }

    pub async fn sync_applications(&self) -> SyncReport {
        self.sync_entity(EntityKind::Applications).await
    }

    pub async fn sync_activities(&self) -> SyncReport {
        self.sync_entity(EntityKind::Activities).await
    }

    /// All three entity syncs, run concurrently.
    pub async fn sync_all(&self) -> Vec<SyncReport> {
        let (grants, applications, activities) = futures::join!(
            self.sync_grants(),
            self.sync_applications(),
            self.sync_activities()
        );
        vec![grants, applications, activities]
    }

    pub async fn retry_failed_syncs(&self, entity: EntityKind) -> SyncResult<RetryFailuresReport> {
        let pipeline = EntityPipeline::for_entity(entity);
        self.coordinator
            .ledger()
            .retry_failed(entity, pipeline.validate, self.coordinator.resolver())
            .await
    }

    pub async fn query(
        &self,
        endpoint: FundingEndpoint,
        query: &FundingQuery,
    ) -> SyncResult<QueryOutcome> {
        self.query.query(endpoint, query).await
    }

    /// Full sync under the in-process guard and the store lease. A call
    /// rejected by the guard never touches the lease, which stays with the
    /// run in progress.
    pub async fn run_scheduled_sync(&self) -> SyncResult<ScheduledSyncOutcome> {
        match self.coordinator.run_guarded(|| self.sync_all_under_lease()).await {
            Ok(outcome) => outcome,
            Err(e) if e.kind == ErrorKind::ServiceUnavailable => {
                Ok(ScheduledSyncOutcome::Skipped { reason: e.message })
            }
            Err(e) => Err(e),
        }
    }

    async fn sync_all_under_lease(&self) -> SyncResult<ScheduledSyncOutcome> {
        if !self.lease.acquire(SCHEDULED_SYNC_JOB).await? {
            return Ok(ScheduledSyncOutcome::Skipped {
                reason: "Sync lease is held by another instance".to_string(),
            });
        }

        let reports = self.sync_all().await;

        if let Err(e) = self.lease.release(SCHEDULED_SYNC_JOB).await {
            self.logger.error_with_meta(
                "Failed to release sync lease",
                Some(&serde_json::json!({ "job": SCHEDULED_SYNC_JOB, "error": e.message })),
            );
        }

        Ok(ScheduledSyncOutcome::Completed { reports })
    }
}
