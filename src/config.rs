// src/config.rs

use secrecy::{ExposeSecret, SecretString};

use crate::services::core::infrastructure::data_synchronization::{
    ConflictResolverConfig, SyncCoordinatorConfig, DEFAULT_LEASE_TTL_MINUTES,
};
use crate::services::core::upstream::api_client::ApiClientConfig;
use crate::services::core::upstream::auth::ClientCredentials;
use crate::services::core::upstream::funding_api::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use crate::services::core::upstream::guarded_query::GuardedQueryConfig;
use crate::utils::logger::LogLevel;
use crate::utils::{SyncError, SyncResult};

pub const DEFAULT_SCOPE: &str = "https://data.vinnova.se/.default";

/// Full service configuration. Holds secrets, so it is not `Clone`.
#[derive(Debug)]
pub struct GrantSyncConfig {
    pub api: ApiClientConfig,
    pub subscription_key: Option<SecretString>,
    pub oauth: Option<ClientCredentials>,
    pub sync: SyncCoordinatorConfig,
    pub resolver: ConflictResolverConfig,
    pub query: GuardedQueryConfig,
    pub page_size: u32,
    pub max_pages: u32,
    pub lease_ttl_minutes: i64,
    pub slack_webhook_url: Option<String>,
    pub cron_secret: Option<SecretString>,
    pub log_level: LogLevel,
}

impl Default for GrantSyncConfig {
    fn default() -> Self {
        Self {
            api: ApiClientConfig::default(),
            subscription_key: None,
            oauth: None,
            sync: SyncCoordinatorConfig::default(),
            resolver: ConflictResolverConfig::default(),
            query: GuardedQueryConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            lease_ttl_minutes: DEFAULT_LEASE_TTL_MINUTES,
            slack_webhook_url: None,
            cron_secret: None,
            log_level: LogLevel::Info,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> SyncResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::config_error(format!("{} must be a number, got '{}'", name, value)))
}

impl GrantSyncConfig {
    /// Builds the config from named variables. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = GrantSyncConfig::default();

        if let Some(base_url) = get("VINNOVA_API_BASE_URL") {
            config.api.base_url = base_url.trim_end_matches('/').to_string();
        }
        config.subscription_key = get("VINNOVA_API_KEY")
            .or_else(|| get("VINNOVA_SUBSCRIPTION_KEY"))
            .map(SecretString::new);

        if get("USE_OAUTH2").is_some_and(|v| parse_flag(&v)) {
            let required = |name: &str| {
                get(name).ok_or_else(|| {
                    SyncError::config_error(format!("{} is required when USE_OAUTH2 is set", name))
                })
            };
            config.oauth = Some(ClientCredentials {
                tenant_id: required("VINNOVA_TENANT_ID")?,
                client_id: required("VINNOVA_CLIENT_ID")?,
                client_secret: SecretString::new(required("VINNOVA_CLIENT_SECRET")?),
                scope: get("VINNOVA_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            });
        }

        config.slack_webhook_url = get("SLACK_WEBHOOK_URL");
        config.cron_secret = get("CRON_SECRET").map(SecretString::new);
        if let Some(level) = get("LOG_LEVEL") {
            config.log_level = LogLevel::from_string(&level);
        }
        if let Some(batch_size) = get("SYNC_BATCH_SIZE") {
            config.sync.batch_size = parse_number("SYNC_BATCH_SIZE", &batch_size)?;
        }
        if let Some(ttl) = get("SYNC_LOCK_TTL_MINUTES") {
            config.lease_ttl_minutes = parse_number("SYNC_LOCK_TTL_MINUTES", &ttl)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads process environment variables.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads Workers vars, falling back to secrets of the same name.
    pub fn from_worker_env(env: &worker::Env) -> SyncResult<Self> {
        Self::from_lookup(|name| {
            env.var(name)
                .map(|v| v.to_string())
                .or_else(|_| env.secret(name).map(|s| s.to_string()))
                .ok()
        })
    }

    pub fn validate(&self) -> SyncResult<()> {
        self.api.validate()?;
        self.sync.validate()?;
        if self.page_size == 0 || self.page_size > DEFAULT_PAGE_SIZE {
            return Err(SyncError::config_error(format!(
                "page_size must be between 1 and {}",
                DEFAULT_PAGE_SIZE
            )));
        }
        if self.max_pages == 0 {
            return Err(SyncError::config_error("max_pages must be greater than 0"));
        }
        if self.lease_ttl_minutes <= 0 {
            return Err(SyncError::config_error(
                "SYNC_LOCK_TTL_MINUTES must be greater than 0",
            ));
        }
        if let Some(webhook) = &self.slack_webhook_url {
            url::Url::parse(webhook)?;
        }
        Ok(())
    }

    /// `false` when no cron secret is configured.
    pub fn cron_secret_matches(&self, provided: &str) -> bool {
        self.cron_secret
            .as_ref()
            .is_some_and(|secret| secret.expose_secret() == provided)
    }
}
