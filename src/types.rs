// src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity types mirrored from the upstream API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Grants,
    Applications,
    Activities,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Grants,
        EntityKind::Applications,
        EntityKind::Activities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Grants => "grants",
            EntityKind::Applications => "applications",
            EntityKind::Activities => "activities",
        }
    }

    /// Store table holding the canonical records
    pub fn table(&self) -> &'static str {
        self.as_str()
    }

    pub fn parse(s: &str) -> Option<EntityKind> {
        match s.trim().to_lowercase().as_str() {
            "grants" | "grant" | "utlysningar" => Some(EntityKind::Grants),
            "applications" | "application" | "ansokningar" => Some(EntityKind::Applications),
            "activities" | "activity" | "finansieradeaktiviteter" => Some(EntityKind::Activities),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One report error line. `global` marks a pass-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub global: bool,
}

impl SyncErrorEntry {
    pub fn record(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            id,
            error: error.into(),
            global: false,
        }
    }

    pub fn global(error: impl Into<String>) -> Self {
        Self {
            id: None,
            error: error.into(),
            global: true,
        }
    }
}

/// Outcome of one entity sync pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub entity: String,
    pub inserted: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub failed: u32,
    pub errors: Vec<SyncErrorEntry>,
    pub total: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl SyncReport {
    pub fn new(entity: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            entity: entity.to_string(),
            inserted: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            errors: Vec::new(),
            total: 0,
            started_at,
            finished_at: None,
            duration_ms: None,
        }
    }

    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
        self.duration_ms = Some((finished_at - self.started_at).num_milliseconds().max(0));
    }

    pub fn succeeded(&self) -> u32 {
        self.inserted + self.updated + self.unchanged
    }

    /// Counts add up to `total`, or a global failure covers every record.
    pub fn is_consistent(&self) -> bool {
        let has_global = self.errors.iter().any(|e| e.global);
        if has_global {
            self.failed == self.total
        } else {
            self.succeeded() + self.failed == self.total
        }
    }

    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.failed == self.total
    }
}

/// Per-entity progress row, upserted after every batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub entity: String,
    pub processed: u32,
    pub total: u32,
    pub percent: u32,
    pub updated_at: DateTime<Utc>,
}

impl SyncProgress {
    pub fn new(entity: &str, processed: u32, total: u32, updated_at: DateTime<Utc>) -> Self {
        let percent = if total == 0 {
            100
        } else {
            ((processed as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            entity: entity.to_string(),
            processed,
            total,
            percent,
            updated_at,
        }
    }
}

/// Outcome of replaying the failure ledger for one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryFailuresReport {
    pub entity: String,
    pub attempted: u32,
    pub resolved: u32,
    pub still_failing: u32,
}
