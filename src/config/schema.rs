//! Configuration schema definitions.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working proxy on `127.0.0.1:8888` with interception enabled and an
//! in-memory CA.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the intercepting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    pub listener: ListenerConfig,
    pub interception: InterceptionConfig,
    pub limits: LimitsConfig,
    pub timeouts: TimeoutConfig,
    pub observability: ObservabilityConfig,
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8888").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8888".to_string(),
            max_connections: 10_000,
        }
    }
}

/// TLS interception settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterceptionConfig {
    /// When false every CONNECT becomes a blind tunnel.
    pub enabled: bool,

    /// CA certificate (PEM). Generated here on first start if missing.
    /// With no paths configured the CA lives in memory only.
    pub ca_cert_path: Option<PathBuf>,

    /// CA private key (PEM).
    pub ca_key_path: Option<PathBuf>,

    /// Common name for a generated CA.
    pub ca_common_name: String,

    /// Hosts that are never intercepted; exact names or `*.suffix`.
    pub passthrough_hosts: Vec<String>,

    /// Extra PEM roots trusted when validating origin certificates.
    pub upstream_roots_pem: Option<PathBuf>,
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ca_cert_path: None,
            ca_key_path: None,
            ca_common_name: "Intercept Proxy Root CA".to_string(),
            passthrough_hosts: Vec::new(),
            upstream_roots_pem: None,
        }
    }
}

/// Codec limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_line_bytes: usize,
    pub max_headers: usize,
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 16 * 1024,
            max_headers: 128,
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-address origin connect timeout in seconds.
    pub connect_secs: u64,

    /// TLS handshake timeout in seconds, either side.
    pub handshake_secs: u64,

    /// How long shutdown waits for open connections, in seconds.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            handshake_secs: 10,
            shutdown_grace_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
