//! Client request model.

use super::headers::list_contains;
use super::{keep_alive, DnsEndPoint, HttpHeaders, RequestLine};
use crate::error::ProxyError;

/// A parsed request: line, headers and the fully buffered body.
#[derive(Debug, Clone)]
pub struct Request {
    line: RequestLine,
    headers: HttpHeaders,
    body: Vec<u8>,
}

impl Request {
    pub fn new(line: RequestLine, headers: HttpHeaders) -> Self {
        Self {
            line,
            headers,
            body: Vec::new(),
        }
    }

    pub fn line(&self) -> &RequestLine {
        &self.line
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replace the body; a non-empty body also sets `Content-Length`.
    pub fn set_body(&mut self, body: Vec<u8>) {
        if !body.is_empty() {
            self.headers.add("Content-Length", body.len().to_string());
        }
        self.body = body;
    }

    /// Store a body that was decoded from chunked coding and reframe it.
    pub fn set_decoded_body(&mut self, body: Vec<u8>) {
        super::reframe(&mut self.headers, body.len());
        self.body = body;
    }

    pub fn is_chunked(&self) -> bool {
        self.headers.has_token("Transfer-Encoding", "chunked")
    }

    pub fn has_body(&self) -> bool {
        self.is_chunked() || self.headers.content_length().is_some_and(|n| n > 0)
    }

    pub fn keep_alive(&self) -> bool {
        let connection = self
            .headers
            .connection()
            .or_else(|| self.headers.proxy_connection());
        keep_alive(self.line.version(), connection)
    }

    pub fn is_upgrade(&self) -> bool {
        self.headers.upgrade().is_some()
    }

    pub fn is_websocket_handshake(&self) -> bool {
        self.headers
            .upgrade()
            .is_some_and(|u| u.eq_ignore_ascii_case("websocket"))
            && self
                .headers
                .connection()
                .is_some_and(|c| list_contains(c, "upgrade"))
    }

    /// Origin this request is addressed to.
    ///
    /// Absolute targets and CONNECT authorities win over the `Host` header.
    pub fn endpoint(&self, default_port: u16) -> Result<DnsEndPoint, ProxyError> {
        if self.line.is_verb("CONNECT") {
            return Ok(DnsEndPoint::parse_authority(self.line.uri(), 443)?);
        }

        if self.line.is_absolute() {
            return endpoint_from_url(self.line.uri());
        }

        match self.headers.host() {
            Some(host) if !host.trim().is_empty() => {
                Ok(DnsEndPoint::parse_authority(host, default_port)?)
            }
            _ => Err(ProxyError::MissingHost),
        }
    }
}

fn endpoint_from_url(uri: &str) -> Result<DnsEndPoint, ProxyError> {
    let invalid = || crate::codec::ProtocolError::InvalidTarget(uri.to_string());

    let url = url::Url::parse(uri).map_err(|_| invalid())?;
    let host = match url.host() {
        Some(url::Host::Domain(domain)) => domain.to_string(),
        Some(url::Host::Ipv4(ip)) => ip.to_string(),
        Some(url::Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(ProxyError::MissingHost),
    };
    let port = url.port_or_known_default().ok_or_else(invalid)?;

    Ok(DnsEndPoint::new(host, port))
}
