//! Host and port of an origin server.

use std::fmt;
use std::net::IpAddr;

use crate::codec::ProtocolError;

/// An unresolved `host:port` pair.
///
/// Host names are stored lowercase; IPv6 literals are stored without brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DnsEndPoint {
    host: String,
    port: u16,
}

impl DnsEndPoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse_authority(authority: &str, default_port: u16) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidTarget(authority.to_string());
        let authority = authority.trim();

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(invalid()),
            }
        } else {
            match authority.split_once(':') {
                // a bare IPv6 literal has more than one colon
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                Some(_) => (authority, None),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse().map_err(|_| invalid())?,
            None => default_port,
        };

        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    pub fn is_ip_literal(&self) -> bool {
        self.ip().is_some()
    }

    pub fn is_loopback(&self) -> bool {
        match self.ip() {
            Some(ip) => ip.is_loopback(),
            None => self.host == "localhost",
        }
    }

    /// Registrable part of the host: its last two labels.
    pub fn domain(&self) -> String {
        if self.is_ip_literal() {
            return self.host.clone();
        }
        let labels: Vec<&str> = self.host.split('.').collect();
        if labels.len() <= 2 {
            self.host.clone()
        } else {
            labels[labels.len() - 2..].join(".")
        }
    }

    /// Wildcard name covering this host.
    ///
    /// `www.google.com` and `google.com` give `*.google.com`. Deeper hosts
    /// drop only their first label, since a wildcard matches exactly one:
    /// `digicert.tt.omtrdc.net` gives `*.tt.omtrdc.net`.
    pub fn wildcard_domain(&self) -> String {
        if self.is_ip_literal() {
            return self.host.clone();
        }
        match self.host.split_once('.') {
            Some((_, parent)) if parent.contains('.') => format!("*.{parent}"),
            _ => format!("*.{}", self.domain()),
        }
    }
}

impl fmt::Display for DnsEndPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_derivation() {
        let cases = [
            ("www.google.com", "google.com", "*.google.com"),
            ("google.com", "google.com", "*.google.com"),
            ("digicert.tt.omtrdc.net", "omtrdc.net", "*.tt.omtrdc.net"),
            (
                "bucket.s3.us-east-1.amazonaws.com",
                "amazonaws.com",
                "*.s3.us-east-1.amazonaws.com",
            ),
            ("localhost", "localhost", "*.localhost"),
        ];
        for (host, domain, wildcard) in cases {
            let endpoint = DnsEndPoint::new(host, 443);
            assert_eq!(endpoint.domain(), domain, "{host}");
            assert_eq!(endpoint.wildcard_domain(), wildcard, "{host}");
        }
    }

    #[test]
    fn test_ip_literals_have_no_wildcard() {
        let endpoint = DnsEndPoint::new("10.1.2.3", 443);
        assert!(endpoint.is_ip_literal());
        assert_eq!(endpoint.wildcard_domain(), "10.1.2.3");
    }

    #[test]
    fn test_parse_authority() {
        let endpoint = DnsEndPoint::parse_authority("WWW.Example.com:8443", 443).unwrap();
        assert_eq!(endpoint.host(), "www.example.com");
        assert_eq!(endpoint.port(), 8443);

        let endpoint = DnsEndPoint::parse_authority("example.com", 80).unwrap();
        assert_eq!(endpoint.to_string(), "example.com:80");

        let endpoint = DnsEndPoint::parse_authority("[::1]:8080", 80).unwrap();
        assert_eq!(endpoint.host(), "::1");
        assert!(endpoint.is_loopback());
        assert_eq!(endpoint.to_string(), "[::1]:8080");

        assert!(DnsEndPoint::parse_authority("example.com:http", 80).is_err());
        assert!(DnsEndPoint::parse_authority(":443", 80).is_err());
    }

    #[test]
    fn test_loopback() {
        assert!(DnsEndPoint::new("127.0.0.1", 8888).is_loopback());
        assert!(DnsEndPoint::new("LOCALHOST", 8888).is_loopback());
        assert!(!DnsEndPoint::new("example.com", 8888).is_loopback());
    }
}
