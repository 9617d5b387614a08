// src/services/core/mod.rs

pub mod infrastructure;
pub mod normalization;
pub mod sync_service;
pub mod upstream;

pub use sync_service::{alert_sink_for, GrantSyncService, ScheduledSyncOutcome};
