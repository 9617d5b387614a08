//! Data Synchronization Engine
//!
//! Pulls funding data from the upstream API into the record store.
//!
//! ## Components
//! - **Sync Coordinator**: per-entity pass with batching, checkpoints and reports
//! - **Conflict Resolver**: last-write-wins on `updated_at` with unchanged detection
//! - **Failure Ledger**: per-record failures kept for later replay
//! - **Checkpoints**: `sync_state` and `sync_progress` rows
//! - **Sync Lease**: store-backed job lock shared across instances

pub mod checkpoint;
pub mod conflict_resolver;
pub mod failure_ledger;
pub mod sync_coordinator;
pub mod sync_lease;

pub use checkpoint::{CheckpointStore, ProgressTracker, SYNC_PROGRESS_TABLE, SYNC_STATE_TABLE};
pub use conflict_resolver::{
    ConflictResolver, ConflictResolverConfig, ResolutionAction, ResolutionOutcome, Winner,
};
pub use failure_ledger::{FailureLedger, SyncFailureRecord, SYNC_FAILURES_TABLE};
pub use sync_coordinator::{EntityPipeline, SyncCoordinator, SyncCoordinatorConfig};
pub use sync_lease::{SyncLease, DEFAULT_LEASE_TTL_MINUTES, SYNC_LOCKS_TABLE};
