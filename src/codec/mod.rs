//! HTTP/1.x wire codec.
//!
//! # Responsibilities
//! - Read request lines, status lines, header blocks and bodies off a byte stream
//! - Write the same structures back out in wire form
//! - Own the per-connection byte stream (`Pipe`) and survive TLS promotion
//!
//! # Data Flow
//! ```text
//! TcpStream / TlsStream
//!     → pipe.rs (BufReader over a boxed stream)
//!     → reader.rs (lines, headers, Content-Length / chunked / to-end bodies)
//!     → message types
//!     → writer.rs (CRLF framing, chunked encoder)
//! ```
//!
//! # Design Decisions
//! - Only CR immediately followed by LF terminates a line
//! - Absence (stream ended) is `Ok(None)`, malformed input is `Err`
//! - Every read is bounded by `CodecLimits`
//! - Head lines are ISO-8859-1: each byte is one `char`, in both directions

pub mod pipe;
pub mod reader;
pub mod writer;

pub use pipe::{BoxedStream, Pipe, ProxyStream};
pub use reader::HttpReader;
pub use writer::HttpWriter;

use crate::config::schema::LimitsConfig;

/// Errors raised while decoding HTTP/1.x framing.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed request line: {0:?}")]
    InvalidRequestLine(String),

    #[error("malformed status line: {0:?}")]
    InvalidStatusLine(String),

    #[error("malformed protocol version: {0:?}")]
    InvalidVersion(String),

    #[error("malformed header line: {0:?}")]
    InvalidHeader(String),

    #[error("invalid chunk size line: {0:?}")]
    InvalidChunkSize(String),

    #[error("invalid request target: {0:?}")]
    InvalidTarget(String),

    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("more than {limit} header fields")]
    TooManyHeaders { limit: usize },

    #[error("body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upper bounds applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    pub max_line_bytes: usize,
    pub max_headers: usize,
    pub max_body_bytes: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for CodecLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_line_bytes: config.max_line_bytes,
            max_headers: config.max_headers,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Map each byte onto the `char` with the same code point.
pub(crate) fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`decode_latin1`]. Characters past U+00FF have no single-byte
/// form and are written as UTF-8.
pub(crate) fn encode_latin1(text: &str, out: &mut Vec<u8>) {
    for c in text.chars() {
        match u8::try_from(c) {
            Ok(b) => out.push(b),
            Err(_) => out.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
        }
    }
}
