//! Shared collaborators handed to every session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::codec::CodecLimits;
use crate::error::ProxyError;
use crate::net::{CachingResolver, Resolve};
use crate::session::{LoggingObserver, SessionObserver};
use crate::tls::{CertificateError, InterceptionPolicy, IssueCertificate, IssuedCertificate, TlsProvider};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide counters surfaced by the admin API.
#[derive(Debug, Default)]
pub struct ProxyStats {
    sessions: AtomicU64,
    failed_sessions: AtomicU64,
    bad_gateways: AtomicU64,
}

/// Point-in-time copy of [`ProxyStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub sessions: u64,
    pub failed_sessions: u64,
    pub bad_gateways: u64,
}

impl ProxyStats {
    pub fn record_session(&self, failed: bool) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed_sessions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_bad_gateway(&self) {
        self.bad_gateways.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions: self.sessions.load(Ordering::Relaxed),
            failed_sessions: self.failed_sessions.load(Ordering::Relaxed),
            bad_gateways: self.bad_gateways.load(Ordering::Relaxed),
        }
    }
}

/// Everything a session needs besides its own connections.
pub struct ProxyContext {
    policy: InterceptionPolicy,
    authority: Arc<dyn IssueCertificate>,
    tls: TlsProvider,
    resolver: Arc<dyn Resolve>,
    observer: Arc<dyn SessionObserver>,
    limits: CodecLimits,
    connect_timeout: Duration,
    listen_port: u16,
    stats: ProxyStats,
}

impl ProxyContext {
    /// Intercept-everything defaults with a caching resolver and a logging observer.
    pub fn new(authority: Arc<dyn IssueCertificate>, tls: TlsProvider) -> Self {
        Self {
            policy: InterceptionPolicy::new(true, Vec::new()),
            authority,
            tls,
            resolver: Arc::new(CachingResolver::new()),
            observer: Arc::new(LoggingObserver),
            limits: CodecLimits::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            listen_port: 0,
            stats: ProxyStats::default(),
        }
    }

    pub fn with_policy(mut self, policy: InterceptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Port the proxy listens on; requests to it on loopback are answered locally.
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn policy(&self) -> &InterceptionPolicy {
        &self.policy
    }

    pub fn authority(&self) -> &dyn IssueCertificate {
        self.authority.as_ref()
    }

    pub fn tls(&self) -> &TlsProvider {
        &self.tls
    }

    pub fn resolver(&self) -> &dyn Resolve {
        self.resolver.as_ref()
    }

    pub fn observer(&self) -> &dyn SessionObserver {
        self.observer.as_ref()
    }

    pub fn limits(&self) -> CodecLimits {
        self.limits
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn stats(&self) -> &ProxyStats {
        &self.stats
    }

    /// Fetch or mint the leaf certificate for `subject` off the async runtime.
    pub async fn certificate_for(
        &self,
        subject: &str,
    ) -> Result<Arc<IssuedCertificate>, ProxyError> {
        let authority = Arc::clone(&self.authority);
        let subject = subject.to_string();
        let issued = tokio::task::spawn_blocking(move || authority.issue_or_fetch(&subject))
            .await
            .map_err(|e| CertificateError::Task(e.to_string()))??;
        Ok(issued)
    }

    /// JSON body returned when a client addresses the proxy itself.
    pub fn diagnostic_body(&self) -> String {
        serde_json::json!({
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "status": "working",
            "interception": self.policy.is_enabled(),
            "certificates": self.authority.cached_subjects().len(),
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::CertificateAuthority;

    fn context() -> ProxyContext {
        let authority = Arc::new(CertificateAuthority::generate("Context Test Root").unwrap());
        let tls = TlsProvider::new(Vec::new(), Duration::from_secs(1)).unwrap();
        ProxyContext::new(authority, tls)
    }

    #[tokio::test]
    async fn test_certificate_for_caches() {
        let ctx = context();
        let first = ctx.certificate_for("*.example.com").await.unwrap();
        let second = ctx.certificate_for("*.example.com").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(ctx.authority().cached_subjects(), vec!["*.example.com".to_string()]);
    }

    #[test]
    fn test_diagnostic_body() {
        let ctx = context().with_policy(InterceptionPolicy::new(false, Vec::new()));
        let body: serde_json::Value = serde_json::from_str(&ctx.diagnostic_body()).unwrap();
        assert_eq!(body["status"], "working");
        assert_eq!(body["interception"], false);
        assert_eq!(body["certificates"], 0);
    }

    #[test]
    fn test_stats_snapshot() {
        let ctx = context();
        ctx.stats().record_session(false);
        ctx.stats().record_session(true);
        ctx.stats().record_bad_gateway();
        assert_eq!(
            ctx.stats().snapshot(),
            StatsSnapshot {
                sessions: 2,
                failed_sessions: 1,
                bad_gateways: 1
            }
        );
    }
}
