// HTTP transport seam between the API client and the network.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::utils::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl UpstreamRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(form));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Failures where no HTTP response was received.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Transport error: {0}")]
    Other(String),
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        SyncError::network_error(err.to_string())
    }
}

#[async_trait(?Send)]
pub trait HttpTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}

/// `reqwest`-backed transport. On native targets a client-level timeout applies.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout_ms: u64) -> Result<Self, SyncError> {
        #[cfg(not(target_arch = "wasm32"))]
        let builder = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .pool_idle_timeout(std::time::Duration::from_secs(90));

        #[cfg(target_arch = "wasm32")]
        let builder = {
            // The Workers runtime enforces its own subrequest limits
            let _ = timeout_ms;
            reqwest::Client::builder()
        };

        let client = builder.build().map_err(|e| {
            SyncError::config_error(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }

    fn classify(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            return TransportError::Timeout(err.to_string());
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            if err.is_connect() {
                return TransportError::Connect(err.to_string());
            }
        }
        TransportError::Other(err.to_string())
    }
}

#[async_trait(?Send)]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(RequestBody::Json(body)) => builder.json(&body),
            Some(RequestBody::Form(form)) => builder.form(&form),
            None => builder,
        };

        let response = builder.send().await.map_err(Self::classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(Self::classify)?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
