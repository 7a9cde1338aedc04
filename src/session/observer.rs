//! Hooks fired as exchanges pass through a session.

use super::SessionId;
use crate::message::{Request, Response};

/// Receives notifications for every proxied exchange.
///
/// `on_request_headers` fires once per request whose origin could be
/// determined, before any body is read. `on_response` fires after the
/// response has been relayed to the client.
pub trait SessionObserver: Send + Sync {
    fn on_request_headers(&self, _session: SessionId, _request: &Request) {}

    fn on_response(&self, _session: SessionId, _request: &Request, _response: &Response) {}
}

/// Logs one line per completed exchange.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl SessionObserver for LoggingObserver {
    fn on_response(&self, session: SessionId, request: &Request, response: &Response) {
        tracing::info!(
            session_id = %session,
            verb = request.line().verb(),
            status = response.line().code(),
            uri = request.line().uri(),
            bytes = response.body().len(),
            "Exchange completed"
        );
    }
}
