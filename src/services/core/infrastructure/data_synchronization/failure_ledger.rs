//! Failure ledger
//!
//! Records that could not be validated or written are appended to
//! `sync_failures` and replayed later by [`FailureLedger::retry_failed`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::conflict_resolver::ConflictResolver;
use crate::services::core::infrastructure::record_store::{RecordStore, Row};
use crate::types::{EntityKind, RetryFailuresReport};
use crate::utils::logger::{logger, Logger};
use crate::utils::time::{now_utc, parse_timestamp};
use crate::utils::SyncResult;

pub const SYNC_FAILURES_TABLE: &str = "sync_failures";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailureRecord {
    pub id: String,
    pub entity: String,
    pub record_id: Option<String>,
    pub error: String,
    pub record: Value,
    pub failed_at: DateTime<Utc>,
    pub resolved: bool,
}

impl SyncFailureRecord {
    pub fn new(entity: &str, record_id: Option<&str>, error: &str, record: &Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity: entity.to_string(),
            record_id: record_id.map(str::to_string),
            error: error.to_string(),
            record: record.clone(),
            failed_at: now_utc(),
            resolved: false,
        }
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::from(self.id.clone()));
        row.insert("entity".to_string(), Value::from(self.entity.clone()));
        row.insert(
            "record_id".to_string(),
            self.record_id.clone().map(Value::from).unwrap_or(Value::Null),
        );
        row.insert("error".to_string(), Value::from(self.error.clone()));
        row.insert("record".to_string(), self.record.clone());
        row.insert(
            "failed_at".to_string(),
            Value::from(self.failed_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        row.insert("resolved".to_string(), Value::Bool(self.resolved));
        row
    }

    /// Reads a stored row. The payload may come back as JSON text and the flag
    /// as 0/1 from SQL stores.
    pub fn from_row(row: &Row) -> Option<Self> {
        let text = |key: &str| row.get(key).and_then(Value::as_str).map(str::to_string);

        let record = match row.get("record") {
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
            }
            Some(other) => other.clone(),
            None => Value::Null,
        };
        let resolved = match row.get("resolved") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
            _ => false,
        };

        Some(Self {
            id: text("id")?,
            entity: text("entity")?,
            record_id: text("record_id"),
            error: text("error").unwrap_or_default(),
            record,
            failed_at: text("failed_at")
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(now_utc),
            resolved,
        })
    }
}

pub struct FailureLedger {
    store: Arc<dyn RecordStore>,
    logger: Logger,
}

impl FailureLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            logger: logger().component("failure_ledger"),
        }
    }

    /// Appends a failure. Persistence errors are logged, never raised.
    pub async fn log_failure(
        &self,
        entity: &str,
        record_id: Option<&str>,
        error: &str,
        record: &Value,
    ) {
        let failure = SyncFailureRecord::new(entity, record_id, error, record);
        if let Err(e) = self.store.insert(SYNC_FAILURES_TABLE, &failure.to_row()).await {
            self.logger.error_with_meta(
                "Failed to log sync failure",
                Some(&serde_json::json!({
                    "entity": entity,
                    "recordId": record_id,
                    "error": e.to_string(),
                })),
            );
        }
    }

    pub async fn unresolved(&self, entity: &str) -> SyncResult<Vec<SyncFailureRecord>> {
        let rows = self
            .store
            .select_many(
                SYNC_FAILURES_TABLE,
                &[("entity", Value::from(entity)), ("resolved", Value::Bool(false))],
            )
            .await?;
        Ok(rows.iter().filter_map(SyncFailureRecord::from_row).collect())
    }

    pub async fn mark_resolved(&self, failure_id: &str) -> SyncResult<()> {
        let mut patch = Row::new();
        patch.insert("resolved".to_string(), Value::Bool(true));
        self.store
            .update(SYNC_FAILURES_TABLE, "id", failure_id, &patch)
            .await?;
        Ok(())
    }

    /// Replays unresolved failures for `entity` one at a time. A record must
    /// pass `validate` again before it reaches the resolver.
    pub async fn retry_failed(
        &self,
        entity: EntityKind,
        validate: fn(&Value) -> bool,
        resolver: &ConflictResolver,
    ) -> SyncResult<RetryFailuresReport> {
        let failures = self.unresolved(entity.as_str()).await?;
        let mut report = RetryFailuresReport {
            entity: entity.to_string(),
            ..Default::default()
        };

        for failure in failures {
            report.attempted += 1;
            let meta = serde_json::json!({
                "entity": entity.as_str(),
                "failureId": failure.id,
                "recordId": failure.record_id,
            });

            if !validate(&failure.record) {
                self.logger
                    .warn_with_meta("Failed record is still invalid", Some(&meta));
                report.still_failing += 1;
                continue;
            }

            match resolver
                .resolve_and_upsert(entity.table(), &failure.record)
                .await
            {
                Ok(_) => match self.mark_resolved(&failure.id).await {
                    Ok(()) => report.resolved += 1,
                    Err(e) => {
                        self.logger.error_with_meta(
                            "Record replayed but failure could not be marked resolved",
                            Some(&serde_json::json!({ "failureId": failure.id, "error": e.message })),
                        );
                        report.still_failing += 1;
                    }
                },
                Err(e) => {
                    self.logger.warn_with_meta(
                        "Retry of failed record failed",
                        Some(&serde_json::json!({
                            "failureId": failure.id,
                            "recordId": failure.record_id,
                            "error": e.message,
                        })),
                    );
                    report.still_failing += 1;
                }
            }
        }

        self.logger.info_with_meta(
            "Failure retry pass finished",
            Some(&serde_json::to_value(&report).unwrap_or(Value::Null)),
        );
        Ok(report)
    }
}
