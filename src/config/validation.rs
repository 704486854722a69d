//! Configuration validation.
//!
//! Serde handles the syntax; this module checks values that parse but cannot
//! work: empty credentials, zero timeouts, patterns that do not compile.
//! Every problem is reported, not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("gate.api_key must not be empty")]
    MissingApiKey,

    #[error("gate.endpoint must not be empty")]
    MissingEndpoint,

    #[error("gate.port must be non-zero")]
    InvalidPort,

    #[error("gate.path must start with '/', got '{0}'")]
    InvalidPath(String),

    #[error("gate.timeout_ms must be greater than zero")]
    ZeroTimeout,

    #[error("gate.{field} is not a valid regular expression: {reason}")]
    InvalidPattern { field: &'static str, reason: String },

    #[error("{field} is not a socket address: '{value}'")]
    InvalidAddress { field: &'static str, value: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let gate = &config.gate;

    if gate.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingApiKey);
    }
    if gate.endpoint.trim().is_empty() {
        errors.push(ValidationError::MissingEndpoint);
    }
    if gate.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if !gate.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath(gate.path.clone()));
    }
    if gate.timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    let patterns = [
        ("uri_regex", gate.inclusion_pattern()),
        ("uri_regex_exclusion", gate.exclusion_pattern()),
    ];
    for (field, pattern) in patterns {
        if let Some(pattern) = pattern {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ValidationError::InvalidPattern {
                    field,
                    reason: e.to_string(),
                });
            }
        }
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
