use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL of this service (used in logs and webhook setup).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            environment: Environment::default(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// HMAC secret used to verify bearer JWTs (required when method = "jwt").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Every request runs as the development user. Never use in production.
    None,
    /// Bearer JWT signed with `jwt_secret`; the `sub` claim is the user id.
    Jwt,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("bracketeer.db")
}

/// Enhancement provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Provider API base URL (e.g., "https://api.provider.example")
    pub base_url: String,
    /// Provider API key
    pub api_key: String,
    /// Shared secret the provider sends as a bearer token on webhooks
    pub webhook_token: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u32,
}

fn default_provider_timeout() -> u32 {
    30
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage service URL (the REST API lives under `/storage/v1`)
    pub url: String,
    /// Bucket holding all order artifacts
    pub bucket: String,
    #[serde(default)]
    pub publishable_key: String,
    #[serde(default)]
    pub service_key: String,
    /// Which key authorizes writes. Fixed per deployment.
    #[serde(default)]
    pub credential: StorageCredential,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u32,
}

impl StorageConfig {
    /// The key selected by `credential`.
    pub fn active_key(&self) -> &str {
        match self.credential {
            StorageCredential::Service => &self.service_key,
            StorageCredential::Publishable => &self.publishable_key,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageCredential {
    #[default]
    Service,
    Publishable,
}

/// Real-time broadcast configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BroadcastConfig {
    /// Real-time service URL
    pub url: String,
    /// Service credential sent as the `apikey` header
    pub api_key: String,
    /// Publish deadline in seconds (default: 10)
    #[serde(default = "default_broadcast_timeout")]
    pub timeout_secs: u32,
}

fn default_broadcast_timeout() -> u32 {
    10
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub provider: SanitizedProviderConfig,
    pub storage: SanitizedStorageConfig,
    pub broadcast: SanitizedBroadcastConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub jwt_secret_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub base_url: String,
    pub api_key_configured: bool,
    pub webhook_token_configured: bool,
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub url: String,
    pub bucket: String,
    pub credential: StorageCredential,
    pub key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedBroadcastConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::Jwt => "jwt".to_string(),
                },
                jwt_secret_configured: config
                    .auth
                    .jwt_secret
                    .as_ref()
                    .is_some_and(|s| !s.is_empty()),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            provider: SanitizedProviderConfig {
                base_url: config.provider.base_url.clone(),
                api_key_configured: !config.provider.api_key.is_empty(),
                webhook_token_configured: !config.provider.webhook_token.is_empty(),
                timeout_secs: config.provider.timeout_secs,
            },
            storage: SanitizedStorageConfig {
                url: config.storage.url.clone(),
                bucket: config.storage.bucket.clone(),
                credential: config.storage.credential,
                key_configured: !config.storage.active_key().is_empty(),
            },
            broadcast: SanitizedBroadcastConfig {
                url: config.broadcast.url.clone(),
                api_key_configured: !config.broadcast.api_key.is_empty(),
                timeout_secs: config.broadcast.timeout_secs,
            },
            orchestrator: config.orchestrator.clone(),
        }
    }
}
