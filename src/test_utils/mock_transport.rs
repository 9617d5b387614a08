use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::services::core::upstream::transport::{
    HttpTransport, TransportError, UpstreamRequest, UpstreamResponse,
};

type Handler = Box<dyn Fn(&UpstreamRequest) -> Result<UpstreamResponse, TransportError>>;

/// Scripted transport: replays queued outcomes in order, then falls back to
/// an optional handler. Every request is recorded.
#[derive(Default)]
pub struct MockTransport {
    scripted: Mutex<VecDeque<Result<UpstreamResponse, TransportError>>>,
    fallback: Option<Handler>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&UpstreamRequest) -> Result<UpstreamResponse, TransportError> + 'static,
    {
        Self {
            fallback: Some(Box::new(handler)),
            ..Self::default()
        }
    }

    pub fn push_response(&self, response: UpstreamResponse) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(response));
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push_response(UpstreamResponse::new(status, body.to_string()));
    }

    pub fn push_error(&self, error: TransportError) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait(?Send)]
impl HttpTransport for MockTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match (scripted, &self.fallback) {
            (Some(outcome), _) => outcome,
            (None, Some(handler)) => handler(&request),
            (None, None) => Err(TransportError::Other(format!(
                "no scripted response for {}",
                request.url
            ))),
        }
    }
}
