//! Startup orchestration.
//!
//! # Responsibilities
//! - Load or generate the CA the proxy signs leaf certificates with
//! - Build the TLS provider with the configured upstream trust roots
//! - Assemble the shared [`ProxyContext`] from configuration
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds before the context is built so the self-diagnostic
//!   check knows the real port, even when configured as `:0`

use std::sync::Arc;

use crate::codec::CodecLimits;
use crate::config::{InterceptionConfig, ProxyConfig};
use crate::net::ListenerError;
use crate::proxy::ProxyContext;
use crate::tls::{CertificateAuthority, CertificateError, InterceptionPolicy, TlsError, TlsProvider};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("certificate authority: {0}")]
    Certificate(#[from] CertificateError),

    #[error("TLS setup: {0}")]
    Tls(#[from] TlsError),

    #[error("listener: {0}")]
    Listener(#[from] ListenerError),
}

/// Load the CA from the configured paths, or keep a fresh one in memory.
pub fn build_authority(config: &InterceptionConfig) -> Result<CertificateAuthority, CertificateError> {
    match (&config.ca_cert_path, &config.ca_key_path) {
        (Some(cert), Some(key)) => {
            CertificateAuthority::load_or_generate(cert, key, &config.ca_common_name)
        }
        _ => {
            tracing::warn!(
                common_name = %config.ca_common_name,
                "No CA paths configured, using an in-memory CA that changes every start"
            );
            CertificateAuthority::generate(&config.ca_common_name)
        }
    }
}

/// Build the context shared by every session.
pub fn build_context(config: &ProxyConfig, listen_port: u16) -> Result<ProxyContext, StartupError> {
    let authority = build_authority(&config.interception)?;
    let tls = TlsProvider::with_roots_file(
        config.interception.upstream_roots_pem.as_deref(),
        config.timeouts.handshake(),
    )?;
    let policy = InterceptionPolicy::from_config(&config.interception);

    tracing::info!(
        interception = policy.is_enabled(),
        passthrough_hosts = config.interception.passthrough_hosts.len(),
        listen_port,
        "Proxy context ready"
    );

    Ok(ProxyContext::new(Arc::new(authority), tls)
        .with_policy(policy)
        .with_limits(CodecLimits::from(&config.limits))
        .with_connect_timeout(config.timeouts.connect())
        .with_listen_port(listen_port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_context_defaults() {
        let config = ProxyConfig::default();
        let ctx = build_context(&config, 8888).unwrap();
        assert_eq!(ctx.listen_port(), 8888);
        assert!(ctx.policy().is_enabled());
        assert_eq!(ctx.limits(), CodecLimits::default());
    }

    #[test]
    fn test_build_authority_persists() {
        let dir = std::env::temp_dir().join(format!("startup-ca-{}", uuid::Uuid::new_v4()));
        let config = InterceptionConfig {
            ca_cert_path: Some(dir.join("ca.pem")),
            ca_key_path: Some(dir.join("ca.key")),
            ..InterceptionConfig::default()
        };

        let first = build_authority(&config).unwrap();
        let second = build_authority(&config).unwrap();
        assert_eq!(first.ca_der(), second.ca_der());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_roots_file_fails() {
        let mut config = ProxyConfig::default();
        config.interception.upstream_roots_pem = Some("/nonexistent/roots.pem".into());
        assert!(matches!(
            build_context(&config, 0),
            Err(StartupError::Tls(TlsError::Roots { .. }))
        ));
    }
}
