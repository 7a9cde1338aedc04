//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and address formats
//! - Check that paired settings are set together
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: &ProxyConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// One rejected setting.
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

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    let interception = &config.interception;
    if interception.ca_cert_path.is_some() != interception.ca_key_path.is_some() {
        errors.push(ValidationError::new(
            "interception.ca_key_path",
            "ca_cert_path and ca_key_path must be set together",
        ));
    }
    if interception.ca_common_name.trim().is_empty() {
        errors.push(ValidationError::new("interception.ca_common_name", "must not be empty"));
    }
    for pattern in &interception.passthrough_hosts {
        let name = pattern.strip_prefix("*.").unwrap_or(pattern);
        if name.is_empty() || name.contains('*') || name.contains(char::is_whitespace) {
            errors.push(ValidationError::new(
                "interception.passthrough_hosts",
                format!("invalid host pattern {pattern:?}"),
            ));
        }
    }

    let limits = &config.limits;
    for (field, value) in [
        ("limits.max_line_bytes", limits.max_line_bytes),
        ("limits.max_headers", limits.max_headers),
        ("limits.max_body_bytes", limits.max_body_bytes),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.handshake_secs == 0 {
        errors.push(ValidationError::new("timeouts.handshake_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if let Err(e) = value.parse::<SocketAddr>() {
        errors.push(ValidationError::new(field, format!("{value:?} is not a socket address: {e}")));
    }
}
