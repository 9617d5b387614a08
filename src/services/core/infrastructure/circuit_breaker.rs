// Circuit breaker guarding upstream call sites.
// One instance per (entity, call site); instances live for the process lifetime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::utils::logger::{logger, Logger};
use crate::utils::time::current_timestamp_ms;
use crate::utils::{SyncError, SyncResult};

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED before the circuit opens
    pub failure_threshold: u32,
    /// Consecutive successes in HALF_OPEN before the circuit closes
    pub success_threshold: u32,
    /// How long an open circuit rejects calls before probing (milliseconds)
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown_ms: 10_000,
        }
    }
}

impl CircuitBreakerConfig {
    /// Tighter settings for the user-facing read path
    pub fn upstream_query() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            cooldown_ms: 15_000,
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.failure_threshold == 0 {
            return Err(SyncError::config_error(
                "Failure threshold must be greater than 0",
            ));
        }

        if self.success_threshold == 0 {
            return Err(SyncError::config_error(
                "Success threshold must be greater than 0",
            ));
        }

        if self.cooldown_ms == 0 {
            return Err(SyncError::config_error("Cooldown must be greater than 0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitBreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitBreakerState::Closed => "closed",
            CircuitBreakerState::Open => "open",
            CircuitBreakerState::HalfOpen => "half_open",
        }
    }
}

/// Snapshot of a breaker for logs and health output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStateInfo {
    pub id: String,
    pub state: CircuitBreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub last_state_change_ms: i64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    failure_count: u32,
    success_count: u32,
    opened_at_ms: Option<i64>,
    last_state_change_ms: i64,
    total_requests: u64,
    total_failures: u64,
    total_rejections: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    id: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    logger: Logger,
}

impl CircuitBreaker {
    pub fn new(id: impl Into<String>, config: CircuitBreakerConfig) -> SyncResult<Self> {
        config.validate()?;
        let id = id.into();
        let mut context = HashMap::new();
        context.insert("breaker".to_string(), serde_json::json!(id));

        Ok(Self {
            logger: logger().component("circuit_breaker").child(context),
            id,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitBreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at_ms: None,
                last_state_change_ms: current_timestamp_ms(),
                total_requests: 0,
                total_failures: 0,
                total_rejections: 0,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Runs `operation` unless the circuit is open and still cooling down.
    /// The operation's own result or error is passed through unchanged.
    pub async fn exec<F, Fut, T>(&self, operation: F) -> SyncResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        if !self.can_execute() {
            return Err(SyncError::circuit_open(&self.id));
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.lock().state
    }

    pub fn state_info(&self) -> CircuitBreakerStateInfo {
        let inner = self.lock();
        CircuitBreakerStateInfo {
            id: self.id.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
            last_state_change_ms: inner.last_state_change_ms,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                let opened_at = inner.opened_at_ms.unwrap_or(inner.last_state_change_ms);
                let elapsed = current_timestamp_ms().saturating_sub(opened_at);
                if elapsed >= self.config.cooldown_ms as i64 {
                    self.transition(&mut inner, CircuitBreakerState::HalfOpen);
                    true
                } else {
                    inner.total_rejections += 1;
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_requests += 1;

        match inner.state {
            CircuitBreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitBreakerState::Closed);
                }
            }
            CircuitBreakerState::Closed => {
                inner.failure_count = 0;
            }
            CircuitBreakerState::Open => {
                // A call admitted before a concurrent trip; the open window stands
            }
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.total_requests += 1;
        inner.total_failures += 1;

        match inner.state {
            CircuitBreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitBreakerState::Open);
                }
            }
            CircuitBreakerState::HalfOpen => {
                self.transition(&mut inner, CircuitBreakerState::Open);
            }
            CircuitBreakerState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitBreakerState) {
        let now = current_timestamp_ms();
        let from = inner.state;
        inner.state = to;
        inner.last_state_change_ms = now;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.opened_at_ms = if to == CircuitBreakerState::Open {
            Some(now)
        } else {
            None
        };

        let meta = serde_json::json!({ "from": from.as_str(), "to": to.as_str() });
        if to == CircuitBreakerState::Open {
            self.logger.warn_with_meta("Circuit breaker opened", Some(&meta));
        } else {
            self.logger
                .info_with_meta("Circuit breaker state changed", Some(&meta));
        }
    }
}

/// Hands out one breaker per call-site id.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing breaker for `id`; `config` only applies on first use.
    pub fn get_or_create(
        &self,
        id: &str,
        config: &CircuitBreakerConfig,
    ) -> SyncResult<Arc<CircuitBreaker>> {
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(breaker) = breakers.get(id) {
                return Ok(breaker.clone());
            }
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(breaker) = breakers.get(id) {
            return Ok(breaker.clone());
        }
        let breaker = Arc::new(CircuitBreaker::new(id, config.clone())?);
        breakers.insert(id.to_string(), breaker.clone());
        Ok(breaker)
    }

    pub fn states(&self) -> Vec<CircuitBreakerStateInfo> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<_> = breakers.values().map(|b| b.state_info()).collect();
        states.sort_by(|a, b| a.id.cmp(&b.id));
        states
    }
}
