//! Proxy server subsystem.
//!
//! # Responsibilities
//! - Own the collaborators every session shares (policy, CA, TLS, resolver)
//! - Accept client connections under the listener's connection limit
//! - Run sessions per connection and convert failures into `502 Bad Gateway`
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → server.rs (tracker guard, spawn per connection)
//!     → Session::new(Pipe)
//!     → StateMachine::run ── Err ──→ 502 + close
//!         └─ Ok(Some(successor)) → next run on the same connections
//! ```

pub mod context;
pub mod server;

pub use context::{ProxyContext, ProxyStats, StatsSnapshot};
pub use server::{run_sessions, serve_connection, serve_session, ProxyServer};
