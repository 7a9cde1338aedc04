//! Intercepting HTTP/HTTPS proxy library.
//!
//! Plain requests are forwarded to their origin; `CONNECT` tunnels are either
//! relayed blind or terminated with a certificate minted by the proxy's own CA
//! so the traffic inside can be observed.

pub mod admin;
pub mod codec;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod session;
pub mod tls;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use lifecycle::Shutdown;
pub use proxy::{ProxyContext, ProxyServer};
