//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (replicas > 0, backoff ordering)
//! - Validate addresses and key prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let prefix = &config.store.endpoints_prefix;
    if !prefix.starts_with('/') || prefix.ends_with('/') {
        errors.push(ValidationError::new(
            "store.endpoints_prefix",
            format!("must start with '/' and not end with '/', got {prefix:?}"),
        ));
    }

    if config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "admin.bind_address",
            format!("invalid socket address {:?}", config.admin.bind_address),
        ));
    }

    if config.admin.request_timeout_secs == 0 {
        errors.push(ValidationError::new("admin.request_timeout_secs", "must be > 0"));
    }

    if config.load_balancer.hash_replicas == 0 {
        errors.push(ValidationError::new("load_balancer.hash_replicas", "must be > 0"));
    }

    if config.watcher.reconnect_base_ms > config.watcher.reconnect_max_ms {
        errors.push(ValidationError::new(
            "watcher.reconnect_base_ms",
            "must not exceed watcher.reconnect_max_ms",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_backoff_ordering() {
        let mut config = GatewayConfig::default();
        config.watcher.reconnect_base_ms = 10_000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "watcher.reconnect_base_ms");
    }
}
