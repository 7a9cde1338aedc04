//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → CA + TLS provider → ProxyContext
//!
//! Shutdown (shutdown.rs):
//!     Trigger → stop accepting → drain connections → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//!     second signal  → immediate exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then CA, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - Draining has a deadline: the process exits after the grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};
pub use startup::{build_authority, build_context, StartupError};
