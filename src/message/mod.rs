//! HTTP message model.
//!
//! Value types shared by the codec, the handlers and the state machine:
//! protocol version, request and status lines, headers, requests, responses
//! and origin endpoints.

pub mod endpoint;
pub mod headers;
pub mod line;
pub mod request;
pub mod response;

pub use endpoint::DnsEndPoint;
pub use headers::HttpHeaders;
pub use line::{ProtocolVersion, RequestLine, StatusLine};
pub use request::Request;
pub use response::Response;

/// Persistence of a connection given its version and `Connection`-style field.
fn keep_alive(version: &ProtocolVersion, connection: Option<&str>) -> bool {
    match connection {
        Some(value) if headers::list_contains(value, "close") => false,
        Some(value) if headers::list_contains(value, "keep-alive") => true,
        _ => version.is_persistent_by_default(),
    }
}

/// Rewrite framing headers for a body that is now held in full.
fn reframe(headers: &mut HttpHeaders, length: usize) {
    headers.remove("Transfer-Encoding");
    headers.add("Content-Length", length.to_string());
}
