//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (IDs, open-connection accounting)
//!     → proxy::server (one session per connection)
//!
//! Outgoing origin connection
//!     → dns.rs (cached resolution)
//!     → session::server (connect to each address in order)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Resolution sits behind a trait so tests can substitute it

pub mod connection;
pub mod dns;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use dns::{CachingResolver, Resolve};
pub use listener::{ConnectionPermit, Listener, ListenerError};
