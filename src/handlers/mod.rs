//! HTTP route handlers.
//!
//! Each route is split into a plain async function producing a [`JsonReply`]
//! and a thin `handle_*` adapter that reads the Workers request and turns the
//! reply into a `worker::Response`.

pub mod cron;
pub mod health;
pub mod vinnova;

pub use cron::*;
pub use health::*;
pub use vinnova::*;

use serde::Serialize;
use serde_json::Value;
use worker::{Response, Result};

use crate::responses::ApiResponse;
use crate::utils::{ErrorKind, SyncError};

/// HTTP status for an error surfaced to a caller. Upstream failures become
/// 502 so they are not mistaken for faults of this service.
pub fn status_for(err: &SyncError) -> u16 {
    match err.kind {
        ErrorKind::ValidationFailure => 400,
        ErrorKind::NotFound => 404,
        ErrorKind::CircuitOpen | ErrorKind::ServiceUnavailable => 503,
        ErrorKind::AuthError
        | ErrorKind::RateLimitError
        | ErrorKind::ServerError
        | ErrorKind::NetworkError
        | ErrorKind::ApiError => 502,
        _ => 500,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonReply {
    pub status: u16,
    pub body: Value,
}

impl JsonReply {
    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status, body },
            Err(e) => Self::from_error(&SyncError::from(e)),
        }
    }

    pub fn success<T: Serialize>(data: T) -> Self {
        Self::json(200, &ApiResponse::success(data))
    }

    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, &ApiResponse::<()>::error(message))
    }

    pub fn from_error(err: &SyncError) -> Self {
        let mut response = ApiResponse::<()>::error(err.message.clone());
        if let Some(code) = &err.error_code {
            response = response.with_code(code.clone());
        }
        let body = serde_json::json!({
            "success": response.success,
            "data": Value::Null,
            "error": response.error,
            "code": response.code,
            "timestamp": response.timestamp,
        });
        Self {
            status: status_for(err),
            body,
        }
    }

    pub fn into_response(self) -> Result<Response> {
        Ok(Response::from_json(&self.body)?.with_status(self.status))
    }
}
