//! Conflict Resolver
//!
//! Last-write-wins resolution between an incoming canonical record and the row
//! already stored under the same id. The decision is made on `updated_at`;
//! when the winning record matches the stored row on every canonical field the
//! write is skipped and the record counts as unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::services::core::infrastructure::record_store::{to_row, RecordStore, Row};
use crate::utils::logger::{logger, Logger};
use crate::utils::time::parse_timestamp;
use crate::utils::{SyncError, SyncResult};

pub const ID_COLUMN: &str = "id";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolverConfig {
    /// Upsert the winner even when nothing changed
    pub write_unchanged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionAction {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Incoming,
    Existing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub action: ResolutionAction,
    pub winner: Winner,
}

fn row_timestamp(row: &Row) -> Option<DateTime<Utc>> {
    row.get(UPDATED_AT_COLUMN)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

/// Picks the record to keep. Returns the winner and whether the choice was
/// made without any usable timestamp.
pub fn choose_winner(existing: &Row, incoming: &Row) -> (Winner, bool) {
    match (row_timestamp(existing), row_timestamp(incoming)) {
        (Some(stored), Some(fresh)) if stored > fresh => (Winner::Existing, false),
        (Some(_), Some(_)) => (Winner::Incoming, false),
        (Some(_), None) => (Winner::Existing, false),
        (None, Some(_)) => (Winner::Incoming, false),
        (None, None) => (Winner::Incoming, true),
    }
}

/// `true` when `stored` holds the same value for every key of `canonical`.
/// A missing column equals null.
pub fn same_canonical_fields(canonical: &Row, stored: &Row) -> bool {
    canonical
        .iter()
        .all(|(key, value)| stored.get(key).unwrap_or(&Value::Null) == value)
}

pub struct ConflictResolver {
    store: Arc<dyn RecordStore>,
    config: ConflictResolverConfig,
    logger: Logger,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn RecordStore>, config: ConflictResolverConfig) -> Self {
        Self {
            store,
            config,
            logger: logger().component("conflict_resolver"),
        }
    }

    pub fn config(&self) -> &ConflictResolverConfig {
        &self.config
    }

    async fn fetch_existing(&self, table: &str, id: &str) -> Option<Row> {
        match self.store.select_one(table, ID_COLUMN, id).await {
            Ok(row) => Some(row),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                self.logger.error_with_meta(
                    "Failed to fetch existing record, continuing as new",
                    Some(&serde_json::json!({
                        "table": table,
                        "id": id,
                        "error": e.to_string(),
                    })),
                );
                None
            }
        }
    }

    async fn write(&self, table: &str, id: &str, row: &Row) -> SyncResult<()> {
        self.store.upsert(table, row, ID_COLUMN).await.map_err(|e| {
            self.logger.error_with_meta(
                "Upsert failed during conflict resolution",
                Some(&serde_json::json!({
                    "table": table,
                    "id": id,
                    "error": e.to_string(),
                })),
            );
            SyncError::conflict_resolution_error(format!("Upsert failed for {}: {}", id, e))
        })
    }

    /// Resolves `incoming` against the stored row with the same id and writes
    /// the winner when it differs from what is stored.
    pub async fn resolve_and_upsert(
        &self,
        table: &str,
        incoming: &Value,
    ) -> SyncResult<ResolutionOutcome> {
        let incoming = to_row(incoming).map_err(|e| SyncError::validation_failure(e.to_string()))?;
        let id = match incoming.get(ID_COLUMN) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Err(SyncError::validation_failure("Record has no id")),
        };

        let Some(existing) = self.fetch_existing(table, &id).await else {
            self.write(table, &id, &incoming).await?;
            return Ok(ResolutionOutcome {
                action: ResolutionAction::Inserted,
                winner: Winner::Incoming,
            });
        };

        let (winner, ambiguous) = choose_winner(&existing, &incoming);
        let meta = serde_json::json!({
            "table": table,
            "id": id,
            "winner": winner,
            "existingUpdatedAt": existing.get(UPDATED_AT_COLUMN),
            "incomingUpdatedAt": incoming.get(UPDATED_AT_COLUMN),
        });
        if ambiguous {
            self.logger
                .warn_with_meta("No usable timestamps, incoming record wins", Some(&meta));
        } else {
            self.logger.debug_with_meta("Conflict resolved", Some(&meta));
        }

        let chosen = match winner {
            Winner::Incoming => &incoming,
            Winner::Existing => &existing,
        };
        let unchanged = match winner {
            Winner::Existing => true,
            Winner::Incoming => same_canonical_fields(&incoming, &existing),
        };

        if unchanged && !self.config.write_unchanged {
            return Ok(ResolutionOutcome {
                action: ResolutionAction::Unchanged,
                winner,
            });
        }

        self.write(table, &id, chosen).await?;
        Ok(ResolutionOutcome {
            action: if unchanged {
                ResolutionAction::Unchanged
            } else {
                ResolutionAction::Updated
            },
            winner,
        })
    }
}
