// src/services/mod.rs

// Core services organized by domain
pub mod core;

pub use core::infrastructure::data_synchronization::{SyncCoordinator, SyncLease};
pub use core::sync_service::{GrantSyncService, ScheduledSyncOutcome};
pub use core::upstream::{FundingApi, GuardedQueryService, ResilientApiClient};
