//! Store-backed job lease.
//!
//! A lease row `{job, holder, expires_at}` in `sync_locks` marks a job as taken
//! until it expires. The store interface has no compare-and-set, so two
//! instances racing on an expired row can both write; the re-read after the
//! write makes the later writer the owner and the earlier one back off. This
//! narrows the window to the gap between upsert and re-read.

use chrono::{Duration, SecondsFormat};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::core::infrastructure::record_store::{RecordStore, Row};
use crate::utils::logger::{logger, Logger};
use crate::utils::time::{now_utc, parse_timestamp};
use crate::utils::{SyncError, SyncResult};

pub const SYNC_LOCKS_TABLE: &str = "sync_locks";
pub const DEFAULT_LEASE_TTL_MINUTES: i64 = 30;
const JOB_COLUMN: &str = "job";

pub struct SyncLease {
    store: Arc<dyn RecordStore>,
    holder: String,
    ttl: Duration,
    logger: Logger,
}

impl SyncLease {
    pub fn new(store: Arc<dyn RecordStore>, ttl_minutes: i64) -> SyncResult<Self> {
        if ttl_minutes <= 0 {
            return Err(SyncError::config_error("lease TTL must be positive"));
        }
        Ok(Self {
            store,
            holder: Uuid::new_v4().to_string(),
            ttl: Duration::minutes(ttl_minutes),
            logger: logger().component("sync_lease"),
        })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    async fn current(&self, job: &str) -> SyncResult<Option<Row>> {
        match self.store.select_one(SYNC_LOCKS_TABLE, JOB_COLUMN, job).await {
            Ok(row) => Ok(Some(row)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn held_by(row: &Row) -> Option<&str> {
        row.get("holder").and_then(Value::as_str)
    }

    /// Takes the lease for `job` when it is free, expired, or already ours.
    pub async fn acquire(&self, job: &str) -> SyncResult<bool> {
        let now = now_utc();
        if let Some(row) = self.current(job).await? {
            let expired = row
                .get("expires_at")
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .map_or(true, |expires_at| expires_at <= now);
            let ours = Self::held_by(&row) == Some(self.holder.as_str());
            if !expired && !ours {
                self.logger.info_with_meta(
                    "Lease held elsewhere",
                    Some(&serde_json::json!({ "job": job, "holder": Self::held_by(&row) })),
                );
                return Ok(false);
            }
        }

        let mut row = Row::new();
        row.insert(JOB_COLUMN.to_string(), Value::from(job));
        row.insert("holder".to_string(), Value::from(self.holder.clone()));
        row.insert(
            "expires_at".to_string(),
            Value::from((now + self.ttl).to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        self.store.upsert(SYNC_LOCKS_TABLE, &row, JOB_COLUMN).await?;

        let confirmed = self
            .current(job)
            .await?
            .is_some_and(|row| Self::held_by(&row) == Some(self.holder.as_str()));
        if confirmed {
            self.logger
                .debug_with_meta("Lease acquired", Some(&serde_json::json!({ "job": job })));
        }
        Ok(confirmed)
    }

    /// Drops the lease if this holder owns it.
    pub async fn release(&self, job: &str) -> SyncResult<bool> {
        match self.current(job).await? {
            Some(row) if Self::held_by(&row) == Some(self.holder.as_str()) => {
                let removed = self.store.delete(SYNC_LOCKS_TABLE, JOB_COLUMN, job).await?;
                Ok(removed > 0)
            }
            _ => Ok(false),
        }
    }
}
