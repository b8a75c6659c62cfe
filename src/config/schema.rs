//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::http::response::DEFAULT_RESPONSE_MESSAGE;

/// Root configuration for the ingress gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request body limits.
    pub security: SecurityConfig,

    /// Redelivery sweep settings.
    pub retries: RetryConfig,

    /// Endpoint definition filters.
    pub endpoints: EndpointsConfig,

    /// HTTP sources to run.
    pub sources: Vec<SourceConfig>,
}

/// Operating mode of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Every authorized message goes to every callback.
    #[default]
    Callbacks,
    /// Messages are routed to one registered endpoint.
    Endpoints,
    /// Path-queue sources sharing a listener per bind/port.
    Paths,
}

/// One HTTP source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source name (also the retry sub-directory).
    pub name: String,

    pub kind: SourceKind,

    /// Bind address (e.g., "0.0.0.0").
    pub bind: String,

    pub port: u16,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Answer with the default response when nothing else did.
    pub auto_respond: bool,

    /// Base directory for persisted failed transmissions.
    pub retry_directory: PathBuf,

    pub authorization: Option<AuthorizationConfig>,

    /// Full outbound URL; overrides bind/port/path for transmissions.
    pub endpoint: Option<String>,

    /// Routed path for `paths` sources; default outbound path otherwise.
    pub path: Option<String>,

    /// Routed method for `paths` sources; default outbound method otherwise.
    pub method: Option<String>,

    /// Use `https` for derived outbound URLs.
    pub ssl: bool,

    /// Auto-response for `paths` sources.
    pub response: ResponseConfig,

    /// Start processing messages on startup.
    pub enable_processing: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "http".to_string(),
            kind: SourceKind::default(),
            bind: "0.0.0.0".to_string(),
            port: 3000,
            tls: None,
            auto_respond: true,
            retry_directory: PathBuf::from("/tmp/.ingress-resend"),
            authorization: None,
            endpoint: None,
            path: None,
            method: None,
            ssl: false,
            response: ResponseConfig::default(),
            enable_processing: true,
        }
    }
}

impl SourceConfig {
    /// `bind:port` as a socket address string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Directory holding this source's retry records.
    pub fn retry_path(&self) -> PathBuf {
        self.retry_directory.join(&self.name)
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Default response of a `paths` source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Status name (`ok`, `accepted`) or numeric code.
    pub code: String,

    pub message: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            code: "ok".to_string(),
            message: DEFAULT_RESPONSE_MESSAGE.to_string(),
        }
    }
}

/// Authorization block.
///
/// ```toml
/// [sources.authorization]
/// allowed_origins = ["127.0.0.1", "192.168.6.0/24"]
/// htpasswd = "/path/to/htpasswd.file"
/// valid_on = "all" # or "any" / "none"
///
/// [sources.authorization.credentials]
/// username1 = "password1"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub allowed_origins: Vec<String>,

    pub htpasswd: Option<PathBuf>,

    pub credentials: Option<HashMap<String, String>>,

    /// Composition mode; defaults to `all`.
    pub valid_on: Option<String>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum wait for a handler-produced response, in seconds.
    pub response_secs: u64,

    /// Outbound transmission timeout in seconds.
    pub outbound_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            response_secs: 5,
            outbound_secs: 30,
        }
    }
}

/// Request body limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size read into memory, in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Redelivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Seconds between redelivery sweeps.
    pub interval_secs: u64,

    /// Delay individual records between attempts with exponential backoff.
    /// Disabled means every sweep retries every record.
    pub backoff_enabled: bool,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            backoff_enabled: false,
            base_delay_ms: 1_000,
            max_delay_ms: 15 * 60 * 1_000,
        }
    }
}

/// Endpoint definition filters. `except` wins over `only`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EndpointsConfig {
    pub only: Option<Vec<String>>,

    pub except: Option<Vec<String>>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
