// Bearer token providers for the upstream API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};

use super::transport::{HttpTransport, UpstreamRequest};
use crate::utils::logger::logger;
use crate::utils::time::current_timestamp_ms;
use crate::utils::{SyncError, SyncResult};

/// Tokens are refreshed this long before their stated expiry.
pub const TOKEN_REFRESH_MARGIN_MS: i64 = 60_000;

#[async_trait(?Send)]
pub trait TokenProvider {
    async fn access_token(&self) -> SyncResult<String>;
}

/// OAuth2 client-credentials settings.
#[derive(Debug)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub scope: String,
}

impl ClientCredentials {
    pub fn token_url(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        )
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at_ms: i64,
}

pub struct ClientCredentialsTokenProvider {
    credentials: ClientCredentials,
    token_url: String,
    transport: Arc<dyn HttpTransport>,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentialsTokenProvider {
    pub fn new(credentials: ClientCredentials, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            token_url: credentials.token_url(),
            credentials,
            transport,
            cached: Mutex::new(None),
        }
    }

    /// Overrides the token endpoint (tests, sovereign clouds).
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    fn cached_token(&self, now_ms: i64) -> Option<String> {
        let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|entry| now_ms < entry.expires_at_ms.saturating_sub(TOKEN_REFRESH_MARGIN_MS))
            .map(|entry| entry.token.clone())
    }

    async fn fetch_token(&self, now_ms: i64) -> SyncResult<CachedToken> {
        let form = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), self.credentials.client_id.clone()),
            (
                "client_secret".to_string(),
                self.credentials.client_secret.expose_secret().clone(),
            ),
            ("scope".to_string(), self.credentials.scope.clone()),
        ];
        let request = UpstreamRequest::post(&self.token_url).with_form(form);

        let response = self.transport.send(request).await?;
        if matches!(response.status, 400 | 401 | 403) {
            return Err(SyncError::auth_error(format!(
                "Token endpoint rejected client credentials ({})",
                response.status
            ))
            .with_status(response.status));
        }
        if !response.is_success() {
            return Err(SyncError::server_error(format!(
                "Token endpoint returned {}",
                response.status
            ))
            .with_status(response.status));
        }

        let parsed: TokenResponse = response.json()?;
        let token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SyncError::auth_error("Failed to obtain upstream access token"))?;
        let expires_in_secs = match parsed.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        };

        Ok(CachedToken {
            token,
            expires_at_ms: now_ms.saturating_add(expires_in_secs.saturating_mul(1_000)),
        })
    }
}

#[async_trait(?Send)]
impl TokenProvider for ClientCredentialsTokenProvider {
    async fn access_token(&self) -> SyncResult<String> {
        let now = current_timestamp_ms();
        if let Some(token) = self.cached_token(now) {
            return Ok(token);
        }

        logger().debug("Refreshing upstream access token");
        let fresh = self.fetch_token(now).await?;
        let token = fresh.token.clone();
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(fresh);
        Ok(token)
    }
}
