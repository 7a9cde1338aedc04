//! Session-level error type.

use std::time::Duration;

use crate::codec::ProtocolError;
use crate::tls::{CertificateError, TlsError};

/// Anything that aborts a session run.
///
/// The connection driver turns these into a best-effort `502 Bad Gateway`.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request has no absolute URI and no Host header")]
    MissingHost,

    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("certificate error: {0}")]
    Certificate(#[from] CertificateError),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("session has no {0}")]
    Detached(&'static str),
}
