//! Per-connection proxy sessions.
//!
//! # Responsibilities
//! - Hold the client and origin handlers plus the exchange in flight
//! - Drive one request/response exchange through the state machine
//! - Hand the connection to a fresh session on a keep-alive boundary
//!
//! # Data Flow
//! ```text
//! accepted socket
//!     → Session { client }
//!     → machine.rs (ReceivingHeaders → ... → Done)
//!         ├─ client.rs  (read request, write response, server-role TLS)
//!         └─ server.rs  (connect, write request, read response, client-role TLS)
//!     → successor Session on keep-alive, spawned as a new run
//! ```
//!
//! # Design Decisions
//! - Handlers are `Option`s so TLS promotion and tunnels can take ownership
//! - A run is a single linear pass; persistence is a new run, never a loop

pub mod client;
pub mod machine;
pub mod observer;
pub mod server;

pub use client::ClientHandler;
pub use machine::{State, StateMachine};
pub use observer::{LoggingObserver, SessionObserver};
pub use server::ServerHandler;

use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

use crate::codec::Pipe;
use crate::error::ProxyError;
use crate::message::{DnsEndPoint, Request, Response};

/// Identifies one session run in logs and observer callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// State of one exchange on a client connection.
pub struct Session {
    id: SessionId,
    pub(crate) client: Option<ClientHandler>,
    pub(crate) server: Option<ServerHandler>,
    pub(crate) request: Option<Request>,
    pub(crate) response: Option<Response>,
    pub(crate) target: Option<DnsEndPoint>,
    pub(crate) tunnel: Option<DnsEndPoint>,
    pub(crate) state: State,
    peer_addr: Option<SocketAddr>,
}

impl Session {
    pub fn new(client: Pipe) -> Self {
        Self {
            id: SessionId::new(),
            client: Some(ClientHandler::new(client)),
            server: None,
            request: None,
            response: None,
            target: None,
            tunnel: None,
            state: State::Initial,
            peer_addr: None,
        }
    }

    pub fn with_peer(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Origin of the current request.
    pub fn target(&self) -> Option<&DnsEndPoint> {
        self.target.as_ref()
    }

    /// Origin of the intercepted TLS tunnel this session runs inside.
    pub fn tunnel(&self) -> Option<&DnsEndPoint> {
        self.tunnel.as_ref()
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub fn has_server(&self) -> bool {
        self.server.is_some()
    }

    /// Move both connections into a new session for the next exchange.
    ///
    /// This session keeps its request and response but can no longer reach
    /// either connection.
    pub fn fork(&mut self) -> Session {
        Session {
            id: SessionId::new(),
            client: self.client.take(),
            server: self.server.take(),
            request: None,
            response: None,
            target: None,
            tunnel: self.tunnel.clone(),
            state: State::Initial,
            peer_addr: self.peer_addr,
        }
    }

    pub(crate) fn client_mut(&mut self) -> Result<&mut ClientHandler, ProxyError> {
        self.client.as_mut().ok_or(ProxyError::Detached("client connection"))
    }

    /// Close whatever connections are still attached. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.close().await;
        }
        if let Some(mut server) = self.server.take() {
            server.close().await;
        }
    }
}
