// src/utils/error.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type SyncResult<T> = Result<T, SyncError>;

/// Custom error details for additional context
pub type ErrorDetails = HashMap<String, serde_json::Value>;

/// Main error type for the sync engine
/// Optimized for size by boxing large fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub message: String,
    pub details: Option<Box<ErrorDetails>>, // Boxed to reduce enum size
    pub status: Option<u16>,
    pub error_code: Option<String>,
    /// Server-provided wait hint (429 Retry-After), honored by the retry policy
    pub retry_after_ms: Option<u64>,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[default]
    Internal,
    AuthError,
    RateLimitError,
    ServerError,
    NetworkError,
    ApiError,
    ValidationFailure,
    ConflictResolutionError,
    CircuitOpen,
    ServiceUnavailable,
    DatabaseError,
    NotFound,
    ConfigurationError,
    SerializationError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Internal => "internal",
            ErrorKind::AuthError => "auth_error",
            ErrorKind::RateLimitError => "rate_limit_error",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ApiError => "api_error",
            ErrorKind::ValidationFailure => "validation_failure",
            ErrorKind::ConflictResolutionError => "conflict_resolution_error",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::DatabaseError => "database_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::SerializationError => "serialization_error",
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            status: None,
            error_code: None,
            retry_after_ms: None,
            kind,
        }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(Box::new(details));
        self
    }

    pub fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }

    pub fn with_retry_after_ms(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }

    // Convenience constructors for the upstream taxonomy
    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthError, message).with_code("AUTH_ERROR")
    }

    pub fn rate_limit_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::RateLimitError, message)
            .with_status(429)
            .with_code("RATE_LIMIT")
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, message).with_code("SERVER_ERROR")
    }

    pub fn network_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::NetworkError, message).with_code("NETWORK_ERROR")
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApiError, message).with_code("API_ERROR")
    }

    pub fn validation_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailure, message)
            .with_status(400)
            .with_code("VALIDATION_FAILURE")
    }

    pub fn conflict_resolution_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConflictResolutionError, message)
            .with_status(500)
            .with_code("CONFLICT_RESOLUTION_ERROR")
    }

    pub fn circuit_open(breaker_id: &str) -> Self {
        Self::new(
            ErrorKind::CircuitOpen,
            format!("Circuit breaker '{}' is open", breaker_id),
        )
        .with_status(503)
        .with_code("CIRCUIT_OPEN")
    }

    pub fn service_unavailable<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
            .with_status(503)
            .with_code("SERVICE_UNAVAILABLE")
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatabaseError, message)
            .with_status(500)
            .with_code("DATABASE_ERROR")
    }

    pub fn not_found<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::NotFound, message)
            .with_status(404)
            .with_code("NOT_FOUND")
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationError, message)
            .with_status(500)
            .with_code("CONFIG_ERROR")
    }

    pub fn serialization_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::SerializationError, message)
            .with_status(400)
            .with_code("SERIALIZATION_ERROR")
    }

    pub fn internal_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::Internal, message)
            .with_status(500)
            .with_code("INTERNAL_ERROR")
    }

    /// Transient upstream conditions worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::RateLimitError | ErrorKind::ServerError | ErrorKind::NetworkError => true,
            // A generic API error with a 4xx status is a client mistake, not a blip
            ErrorKind::ApiError => !matches!(self.status, Some(400..=499)),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::serialization_error(format!("JSON parsing error: {}", err))
    }
}

impl From<worker::Error> for SyncError {
    fn from(err: worker::Error) -> Self {
        SyncError::internal_error(format!("Worker error: {:?}", err))
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::config_error(format!("URL parse error: {}", err))
    }
}

impl From<SyncError> for worker::Error {
    fn from(err: SyncError) -> Self {
        let message = if let Some(status_code) = err.status {
            format!(
                "[Status: {}] SyncError (Kind: {:?}): {}",
                status_code, err.kind, err.message
            )
        } else {
            format!("SyncError (Kind: {:?}): {}", err.kind, err.message)
        };

        worker::Error::RustError(message)
    }
}

// Helper macro for creating errors with context
#[macro_export]
macro_rules! sync_error {
    ($kind:expr, $msg:expr) => {
        $crate::utils::error::SyncError::new($kind, $msg)
    };
    ($kind:expr, $msg:expr, $($key:expr => $value:expr),+) => {{
        let mut details = std::collections::HashMap::new();
        $(
            details.insert($key.to_string(), serde_json::json!($value));
        )+
        $crate::utils::error::SyncError::new($kind, $msg).with_details(details)
    }};
}
