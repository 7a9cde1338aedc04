//! CONNECT interception policy.

use crate::config::schema::InterceptionConfig;
use crate::message::DnsEndPoint;

/// What to do with a CONNECT target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Terminate TLS with a leaf certificate for `subject`.
    Intercept { subject: String },
    /// Relay bytes without looking at them.
    Tunnel,
}

#[derive(Debug, Clone)]
pub struct InterceptionPolicy {
    enabled: bool,
    passthrough: Vec<String>,
}

impl InterceptionPolicy {
    pub fn new(enabled: bool, passthrough: Vec<String>) -> Self {
        Self {
            enabled,
            passthrough: passthrough
                .into_iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &InterceptionConfig) -> Self {
        Self::new(config.enabled, config.passthrough_hosts.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Port 80 is assumed to carry plaintext and is always tunneled.
    pub fn decide(&self, target: &DnsEndPoint) -> Decision {
        if !self.enabled || target.port() == 80 || self.is_passthrough(target.host()) {
            return Decision::Tunnel;
        }
        Decision::Intercept {
            subject: certificate_subject(target),
        }
    }

    fn is_passthrough(&self, host: &str) -> bool {
        self.passthrough.iter().any(|pattern| match pattern.strip_prefix("*.") {
            Some(suffix) => host
                .strip_suffix(suffix)
                .is_some_and(|rest| rest.ends_with('.')),
            None => pattern == host,
        })
    }
}

/// Name the leaf certificate is issued for.
pub fn certificate_subject(target: &DnsEndPoint) -> String {
    target.wildcard_domain()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intercept(subject: &str) -> Decision {
        Decision::Intercept {
            subject: subject.to_string(),
        }
    }

    #[test]
    fn test_port_heuristic() {
        let policy = InterceptionPolicy::new(true, Vec::new());
        assert_eq!(policy.decide(&DnsEndPoint::new("www.google.com", 80)), Decision::Tunnel);
        assert_eq!(
            policy.decide(&DnsEndPoint::new("www.google.com", 443)),
            intercept("*.google.com")
        );
        assert_eq!(
            policy.decide(&DnsEndPoint::new("example.com", 8443)),
            intercept("*.example.com")
        );
    }

    #[test]
    fn test_ip_subject() {
        let policy = InterceptionPolicy::new(true, Vec::new());
        assert_eq!(
            policy.decide(&DnsEndPoint::new("192.168.1.10", 443)),
            intercept("192.168.1.10")
        );
    }

    #[test]
    fn test_disabled_tunnels_everything() {
        let policy = InterceptionPolicy::new(false, Vec::new());
        assert_eq!(policy.decide(&DnsEndPoint::new("example.com", 443)), Decision::Tunnel);
    }

    #[test]
    fn test_passthrough_hosts() {
        let policy = InterceptionPolicy::new(
            true,
            vec!["pinned.example.com".into(), "*.bank.com".into()],
        );
        assert_eq!(policy.decide(&DnsEndPoint::new("pinned.example.com", 443)), Decision::Tunnel);
        assert_eq!(policy.decide(&DnsEndPoint::new("www.bank.com", 443)), Decision::Tunnel);
        assert_eq!(policy.decide(&DnsEndPoint::new("a.b.bank.com", 443)), Decision::Tunnel);
        assert_eq!(
            policy.decide(&DnsEndPoint::new("notbank.com", 443)),
            intercept("*.notbank.com")
        );
        assert_eq!(
            policy.decide(&DnsEndPoint::new("other.example.com", 443)),
            intercept("*.example.com")
        );
    }
}
