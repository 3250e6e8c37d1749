//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Validate addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be > 0"));
    }
    if config.timeouts.read_secs == 0 {
        errors.push(ValidationError::new("timeouts.read_secs", "must be > 0"));
    }
    if config.limits.max_line_bytes == 0 {
        errors.push(ValidationError::new("limits.max_line_bytes", "must be > 0"));
    }
    if config.limits.max_headers == 0 {
        errors.push(ValidationError::new("limits.max_headers", "must be > 0"));
    }
    if config.limits.max_head_bytes < config.limits.max_line_bytes {
        errors.push(ValidationError::new(
            "limits.max_head_bytes",
            "must be at least limits.max_line_bytes",
        ));
    }
    if config.cache.enabled && config.cache.default_ttl_secs == 0 {
        errors.push(ValidationError::new(
            "cache.default_ttl_secs",
            "must be > 0 while the cache is enabled",
        ));
    }
    if config.access.blocked_hosts.iter().any(|h| h.trim().is_empty()) {
        errors.push(ValidationError::new("access.blocked_hosts", "contains an empty host"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
