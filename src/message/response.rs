//! Origin or proxy-generated response model.

use super::{keep_alive, HttpHeaders, ProtocolVersion, StatusLine};

#[derive(Debug, Clone)]
pub struct Response {
    line: StatusLine,
    headers: HttpHeaders,
    body: Vec<u8>,
}

impl Response {
    pub fn new(line: StatusLine, headers: HttpHeaders) -> Self {
        Self {
            line,
            headers,
            body: Vec::new(),
        }
    }

    /// Build a response generated by the proxy itself.
    ///
    /// Carries a `Date` header; `close` adds `Connection: close`.
    pub fn synthesize(
        version: ProtocolVersion,
        code: u16,
        description: &str,
        body: Option<&str>,
        close: bool,
    ) -> Self {
        let mut headers = HttpHeaders::new();
        headers.add("Date", http_date());
        if close {
            headers.add("Connection", "close");
        }

        let mut response = Self::new(StatusLine::new(version, code.to_string(), description), headers);
        if let Some(body) = body {
            response.headers.add("Content-Type", "text/plain; charset=utf-8");
            response.set_body(body.as_bytes().to_vec());
        }
        response
    }

    pub fn line(&self) -> &StatusLine {
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

    pub fn status_code(&self) -> Option<u16> {
        self.line.status_code()
    }

    /// Replace the body; a non-empty body also sets `Content-Length`.
    pub fn set_body(&mut self, body: Vec<u8>) {
        if !body.is_empty() {
            self.headers.add("Content-Length", body.len().to_string());
        }
        self.body = body;
    }

    /// Store a body whose original framing is gone (chunked or read to close).
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

    /// Whether a body follows the head when answering `verb`.
    pub fn has_body_for(&self, verb: &str) -> bool {
        if verb.eq_ignore_ascii_case("HEAD") {
            return false;
        }
        !matches!(self.status_code(), Some(100..=199 | 204 | 304))
    }

    pub fn keep_alive(&self) -> bool {
        keep_alive(self.line.version(), self.headers.connection())
    }
}

/// Current time in IMF-fixdate form.
fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
