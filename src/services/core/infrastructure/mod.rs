// src/services/core/infrastructure/mod.rs

//! Infrastructure Services Module
//!
//! Storage, resilience and alerting building blocks shared by the sync engine:
//! the record store (D1 on Workers, in-memory elsewhere), circuit breakers,
//! retry policy, the TTL response cache, alert sinks and the data
//! synchronization engine itself.

pub mod alerting;
pub mod circuit_breaker;
pub mod d1_store;
pub mod data_synchronization;
pub mod record_store;
pub mod response_cache;
pub mod retry;

pub use alerting::{AlertSink, LogAlertSink, SlackWebhookAlertSink};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerState,
};
pub use d1_store::D1RecordStore;
pub use record_store::{InMemoryStore, RecordStore, Row, StoreError, StoreResult};
pub use response_cache::TtlCache;
pub use retry::RetryPolicy;
