//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate and
//! the demo host. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static asset extensions that never reach the scoring API.
pub const DEFAULT_EXCLUSION_PATTERN: &str = r"\.(avi|flv|mka|mkv|mov|mp4|mpeg|mpg|mp3|flac|ogg|ogm|opus|wav|webm|webp|bmp|gif|ico|jpeg|jpg|png|svg|svgz|swf|eot|otf|ttf|woff|woff2|css|less|js)$";

/// Root configuration for the demo host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Inspection gate settings.
    pub gate: GateConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Scoring API connection and request filtering.
///
/// Immutable once handed to [`crate::inspection::Gate::new`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// API key sent as the `Key` fingerprint field.
    pub api_key: String,

    /// Scoring API host name or address.
    pub endpoint: String,

    /// Use HTTPS for the scoring API.
    pub ssl: bool,

    /// Scoring API port.
    pub port: u16,

    /// Scoring API path.
    pub path: String,

    /// Time allowed for the whole exchange, in milliseconds.
    pub timeout_ms: u64,

    /// Only paths matching this pattern are inspected. Empty disables.
    pub uri_regex: Option<String>,

    /// Paths matching this pattern are never inspected. Empty disables.
    pub uri_regex_exclusion: Option<String>,

    /// Cookie carrying the client identifier.
    pub client_id_cookie: String,

    /// Overrides the detected host name reported as `ServerName`.
    pub server_name: Option<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            ssl: true,
            port: 443,
            path: "/v1/roz/inspect".to_string(),
            timeout_ms: 150,
            uri_regex: None,
            uri_regex_exclusion: Some(DEFAULT_EXCLUSION_PATTERN.to_string()),
            client_id_cookie: "armigate".to_string(),
            server_name: None,
        }
    }
}

impl GateConfig {
    /// Deadline for one scoring exchange.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Full scoring API URL, e.g. `https://api.example.com:443/v1/roz/inspect`.
    pub fn endpoint_url(&self) -> Result<url::Url, url::ParseError> {
        let scheme = if self.ssl { "https" } else { "http" };
        url::Url::parse(&format!(
            "{}://{}:{}{}",
            scheme, self.endpoint, self.port, self.path
        ))
    }

    /// Inclusion pattern, `None` when unset or blank.
    pub fn inclusion_pattern(&self) -> Option<&str> {
        non_blank(self.uri_regex.as_deref())
    }

    /// Exclusion pattern, `None` when unset or blank.
    pub fn exclusion_pattern(&self) -> Option<&str> {
        non_blank(self.uri_regex_exclusion.as_deref())
    }
}

fn non_blank(pattern: Option<&str>) -> Option<&str> {
    pattern.filter(|p| !p.trim().is_empty())
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
