// Per-entity checkpoints and progress rows.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::services::core::infrastructure::record_store::{RecordStore, Row};
use crate::types::SyncProgress;
use crate::utils::logger::{logger, Logger};
use crate::utils::time::{now_utc, parse_timestamp};
use crate::utils::SyncResult;

pub const SYNC_STATE_TABLE: &str = "sync_state";
pub const SYNC_PROGRESS_TABLE: &str = "sync_progress";
const ENTITY_COLUMN: &str = "entity";

/// Reads and writes `sync_state.last_synced_at`.
pub struct CheckpointStore {
    store: Arc<dyn RecordStore>,
    logger: Logger,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            logger: logger().component("checkpoint"),
        }
    }

    /// Last successful sync for `entity`. Any failure reads as `None`, which
    /// makes the next pass a full sync.
    pub async fn last_synced_at(&self, entity: &str) -> Option<DateTime<Utc>> {
        let row = match self.store.select_one(SYNC_STATE_TABLE, ENTITY_COLUMN, entity).await {
            Ok(row) => row,
            Err(e) if e.is_not_found() => return None,
            Err(e) => {
                self.logger.error_with_meta(
                    "Failed to read checkpoint, falling back to full sync",
                    Some(&serde_json::json!({ "entity": entity, "error": e.to_string() })),
                );
                return None;
            }
        };

        let parsed = row
            .get("last_synced_at")
            .and_then(Value::as_str)
            .and_then(parse_timestamp);
        if parsed.is_none() {
            self.logger.warn_with_meta(
                "Checkpoint has no readable timestamp",
                Some(&serde_json::json!({ "entity": entity, "row": row })),
            );
        }
        parsed
    }

    pub async fn set_last_synced_at(&self, entity: &str, at: DateTime<Utc>) -> SyncResult<()> {
        let mut row = Row::new();
        row.insert(ENTITY_COLUMN.to_string(), Value::from(entity));
        row.insert(
            "last_synced_at".to_string(),
            Value::from(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        self.store
            .upsert(SYNC_STATE_TABLE, &row, ENTITY_COLUMN)
            .await
            .map_err(|e| {
                self.logger.error_with_meta(
                    "Failed to write checkpoint",
                    Some(&serde_json::json!({ "entity": entity, "error": e.to_string() })),
                );
                e.into()
            })
    }
}

/// Observational progress rows; write failures are logged and ignored.
pub struct ProgressTracker {
    store: Arc<dyn RecordStore>,
    logger: Logger,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            logger: logger().component("progress"),
        }
    }

    pub async fn update(&self, entity: &str, processed: u32, total: u32) -> SyncProgress {
        let progress = SyncProgress::new(entity, processed, total, now_utc());

        let mut row = Row::new();
        row.insert(ENTITY_COLUMN.to_string(), Value::from(entity));
        row.insert("processed".to_string(), Value::from(progress.processed));
        row.insert("total".to_string(), Value::from(progress.total));
        row.insert("percent".to_string(), Value::from(progress.percent));
        row.insert(
            "updated_at".to_string(),
            Value::from(progress.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        if let Err(e) = self
            .store
            .upsert(SYNC_PROGRESS_TABLE, &row, ENTITY_COLUMN)
            .await
        {
            self.logger.error_with_meta(
                "Failed to update sync progress",
                Some(&serde_json::json!({ "entity": entity, "error": e.to_string() })),
            );
        }
        progress
    }
}
