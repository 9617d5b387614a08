//! Sync Coordinator
//!
//! Runs one entity sync pass: read the checkpoint, fetch changed upstream
//! records behind a circuit breaker and retry policy, normalize, then validate
//! and resolve records in fixed-size batches. Records run concurrently inside a
//! batch and batches run strictly one after another. Every pass returns a
//! [`SyncReport`]; failures are reported, not raised.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::checkpoint::{CheckpointStore, ProgressTracker};
use super::conflict_resolver::{ConflictResolver, ResolutionAction};
use super::failure_ledger::FailureLedger;
use crate::services::core::infrastructure::alerting::AlertSink;
use crate::services::core::infrastructure::circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerRegistry,
};
use crate::services::core::infrastructure::retry::{retry_unless_fatal, RetryPolicy};
use crate::services::core::normalization::field_map::{self, EntityFieldMap};
use crate::services::core::normalization::{self as normalization, Activity, Application, CanonicalRecord, Grant};
use crate::types::{EntityKind, SyncErrorEntry, SyncProgress, SyncReport};
use crate::utils::logger::{logger, Logger};
use crate::utils::time::now_utc;
use crate::utils::{SyncError, SyncResult};

pub const MALFORMED_RECORD_ERROR: &str = "Malformed or missing id";
pub const VALIDATION_FAILED_ERROR: &str = "Validation failed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncCoordinatorConfig {
    pub batch_size: usize,
    /// Keep the old checkpoint when every fetched record failed
    pub hold_checkpoint_on_total_failure: bool,
    pub breaker: CircuitBreakerConfig,
    pub fetch_retry: RetryPolicy,
}

impl Default for SyncCoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            hold_checkpoint_on_total_failure: true,
            breaker: CircuitBreakerConfig::default(),
            fetch_retry: RetryPolicy::fetch_wrapper(),
        }
    }
}

impl SyncCoordinatorConfig {
    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_size == 0 {
            return Err(SyncError::config_error("batch_size must be greater than 0"));
        }
        self.breaker.validate()?;
        self.fetch_retry.validate()
    }
}

fn normalize_canonical<T: CanonicalRecord>(raw: &Value) -> Option<Value> {
    normalization::normalize::<T>(raw).map(|record| record.to_value())
}

/// Everything the coordinator needs to know about one entity type.
#[derive(Clone, Copy)]
pub struct EntityPipeline {
    pub entity: EntityKind,
    pub table: &'static str,
    pub id_field: &'static str,
    pub field_map: &'static EntityFieldMap,
    pub normalize: fn(&Value) -> Option<Value>,
    pub validate: fn(&Value) -> bool,
}

impl EntityPipeline {
    pub fn of<T: CanonicalRecord>() -> Self {
        Self {
            entity: T::ENTITY,
            table: T::ENTITY.table(),
            id_field: "id",
            field_map: T::field_map(),
            normalize: normalize_canonical::<T>,
            validate: normalization::validate::<T>,
        }
    }

    pub fn grants() -> Self {
        Self::of::<Grant>()
    }

    pub fn applications() -> Self {
        Self::of::<Application>()
    }

    pub fn activities() -> Self {
        Self::of::<Activity>()
    }

    pub fn for_entity(entity: EntityKind) -> Self {
        match entity {
            EntityKind::Grants => Self::grants(),
            EntityKind::Applications => Self::applications(),
            EntityKind::Activities => Self::activities(),
        }
    }
}

enum RecordOutcome {
    Resolved(ResolutionAction),
    Failed(SyncErrorEntry),
}

pub struct SyncCoordinator {
    resolver: Arc<ConflictResolver>,
    checkpoints: CheckpointStore,
    progress: ProgressTracker,
    ledger: Arc<FailureLedger>,
    breakers: Arc<CircuitBreakerRegistry>,
    alerts: Arc<dyn AlertSink>,
    config: SyncCoordinatorConfig,
    running: AtomicBool,
    logger: Logger,
}

impl SyncCoordinator {
    pub fn new(
        resolver: Arc<ConflictResolver>,
        checkpoints: CheckpointStore,
        progress: ProgressTracker,
        ledger: Arc<FailureLedger>,
        breakers: Arc<CircuitBreakerRegistry>,
        alerts: Arc<dyn AlertSink>,
        config: SyncCoordinatorConfig,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            resolver,
            checkpoints,
            progress,
            ledger,
            breakers,
            alerts,
            config,
            running: AtomicBool::new(false),
            logger: logger().component("sync_coordinator"),
        })
    }

    pub fn config(&self) -> &SyncCoordinatorConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Runs one sync pass for `pipeline.entity`. `fetch` receives the checkpoint
    /// (if any) and returns every raw upstream record changed since then.
    pub async fn sync_entity<F, Fut>(
        &self,
        pipeline: &EntityPipeline,
        fetch: F,
        on_progress: Option<&dyn Fn(&SyncProgress)>,
    ) -> SyncReport
    where
        F: Fn(Option<DateTime<Utc>>) -> Fut,
        Fut: Future<Output = SyncResult<Vec<Value>>>,
    {
        let entity = pipeline.entity.as_str();
        let mut report = SyncReport::new(entity, now_utc());
        let since = self.checkpoints.last_synced_at(entity).await;

        self.logger.info_with_meta(
            "Sync started",
            Some(&serde_json::json!({
                "entity": entity,
                "since": since.map(|ts| ts.to_rfc3339()),
            })),
        );

        let raws = match self.fetch_guarded(entity, &fetch, since).await {
            Ok(raws) => raws,
            Err(err) => {
                report.failed = report.total;
                report
                    .errors
                    .push(SyncErrorEntry::global(format!("Fetch failed: {}", err.message)));
                self.alerts
                    .send_alert(&format!("Sync failed for {}: {}", entity, err.message))
                    .await;
                report.finish(now_utc());
                self.log_summary(&report);
                return report;
            }
        };

        report.total = raws.len() as u32;

        let mut candidates = Vec::with_capacity(raws.len());
        for raw in &raws {
            match (pipeline.normalize)(raw) {
                Some(record) => candidates.push(record),
                None => {
                    report.failed += 1;
                    report.errors.push(SyncErrorEntry::record(
                        field_map::recover_id(pipeline.field_map, raw),
                        MALFORMED_RECORD_ERROR,
                    ));
                }
            }
        }

        let mut processed = report.failed;
        for batch in candidates.chunks(self.config.batch_size) {
            let outcomes = join_all(batch.iter().map(|record| self.process_record(pipeline, record))).await;
            for outcome in outcomes {
                match outcome {
                    RecordOutcome::Resolved(ResolutionAction::Inserted) => report.inserted += 1,
                    RecordOutcome::Resolved(ResolutionAction::Updated) => report.updated += 1,
                    RecordOutcome::Resolved(ResolutionAction::Unchanged) => report.unchanged += 1,
                    RecordOutcome::Failed(entry) => {
                        report.failed += 1;
                        report.errors.push(entry);
                    }
                }
            }

            processed += batch.len() as u32;
            let progress = self.progress.update(entity, processed, report.total).await;
            self.logger.info_with_meta(
                "Batch processed",
                Some(&serde_json::json!({
                    "entity": entity,
                    "processed": progress.processed,
                    "total": progress.total,
                    "percent": progress.percent,
                })),
            );
            if let Some(callback) = on_progress {
                callback(&progress);
            }
        }

        if self.config.hold_checkpoint_on_total_failure && report.all_failed() {
            self.logger.warn_with_meta(
                "Every record failed, checkpoint not advanced",
                Some(&serde_json::json!({ "entity": entity, "total": report.total })),
            );
        } else if let Err(e) = self
            .checkpoints
            .set_last_synced_at(entity, report.started_at)
            .await
        {
            self.logger.error_with_meta(
                "Checkpoint not advanced",
                Some(&serde_json::json!({ "entity": entity, "error": e.message })),
            );
        }

        if report.all_failed() {
            let detail = serde_json::to_string(&report.errors).unwrap_or_default();
            self.alerts
                .send_alert(&format!(
                    "Sync for {} failed for all {} records: {}",
                    entity, report.total, detail
                ))
                .await;
        }

        report.finish(now_utc());
        self.log_summary(&report);
        report
    }

    async fn fetch_guarded<F, Fut>(
        &self,
        entity: &str,
        fetch: &F,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<Value>>
    where
        F: Fn(Option<DateTime<Utc>>) -> Fut,
        Fut: Future<Output = SyncResult<Vec<Value>>>,
    {
        let breaker = self
            .breakers
            .get_or_create(&format!("sync:{}", entity), &self.config.breaker)?;
        let label = format!("fetch {}", entity);
        breaker
            .exec(|| {
                self.config
                    .fetch_retry
                    .execute(&label, |_| fetch(since), retry_unless_fatal)
            })
            .await
    }

    async fn process_record(&self, pipeline: &EntityPipeline, record: &Value) -> RecordOutcome {
        let entity = pipeline.entity.as_str();
        let id = record
            .get(pipeline.id_field)
            .and_then(Value::as_str)
            .map(str::to_string);

        if !(pipeline.validate)(record) {
            self.ledger
                .log_failure(entity, id.as_deref(), VALIDATION_FAILED_ERROR, record)
                .await;
            return RecordOutcome::Failed(SyncErrorEntry::record(id, VALIDATION_FAILED_ERROR));
        }

        match self.resolver.resolve_and_upsert(pipeline.table, record).await {
            Ok(outcome) => RecordOutcome::Resolved(outcome.action),
            Err(err) => {
                self.ledger
                    .log_failure(entity, id.as_deref(), &err.message, record)
                    .await;
                RecordOutcome::Failed(SyncErrorEntry::record(id, err.message))
            }
        }
    }

    fn log_summary(&self, report: &SyncReport) {
        self.logger.info_with_meta(
            "Sync finished",
            Some(&serde_json::json!({
                "entity": report.entity,
                "total": report.total,
                "inserted": report.inserted,
                "updated": report.updated,
                "unchanged": report.unchanged,
                "failed": report.failed,
                "durationMs": report.duration_ms,
            })),
        );
    }

    /// Runs `operation` unless another guarded run is active in this process.
    pub async fn run_guarded<F, Fut, T>(&self, operation: F) -> SyncResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::service_unavailable("Sync already running"));
        }
        let _guard = RunningGuard(&self.running);
        Ok(operation().await)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
