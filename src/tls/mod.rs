//! TLS interception subsystem.
//!
//! # Responsibilities
//! - Decide whether a CONNECT is intercepted or tunneled blind
//! - Mint per-host leaf certificates signed by the proxy's CA
//! - Perform server-role and client-role handshakes on pipes
//!
//! # Data Flow
//! ```text
//! CONNECT host:port
//!     → policy.rs (intercept or tunnel, certificate subject)
//!     → authority.rs (cached leaf certificate for the subject)
//!     → provider.rs (accept from client, connect to origin)
//! ```
//!
//! # Design Decisions
//! - The certificate cache is an injected collaborator, not a static
//! - Issuance is single-flight per subject behind one lock
//! - Upstream certificates are validated against webpki roots plus configured extras

pub mod authority;
pub mod policy;
pub mod provider;

pub use authority::{CertificateAuthority, IssueCertificate, IssuedCertificate};
pub use policy::{Decision, InterceptionPolicy};
pub use provider::TlsProvider;

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0}")]
    MissingCertificate(PathBuf),

    #[error("issuance task failed: {0}")]
    Task(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("invalid server name: {0:?}")]
    InvalidServerName(String),

    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),

    #[error("handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not load trust roots from {path}: {source}")]
    Roots {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
