//! Protocol state machine for one exchange.
//!
//! # Data Flow
//! ```text
//! Initial → ReceivingHeaders ─┬→ ReceivingBody → SendingRequestHeaders
//!                             │      → ReceivingResponse → SendingResponse ─┬→ Done
//!                             │                                             └→ UpgradingToWebSocketTunnel → Done
//!                             ├→ AuthenticatingClient → ReceivingHeaders
//!                             ├→ CreatingTunnel → Done
//!                             └→ Done
//! ```
//!
//! # Design Decisions
//! - Every transition moves toward `Done`; the only re-entry is
//!   `AuthenticatingClient → ReceivingHeaders`, taken at most once per run
//! - Errors leave the run immediately; the connection driver answers 502
//! - A keep-alive boundary forks the session and ends this run

use std::fmt;
use std::time::Instant;

use tracing::Instrument;

use super::{ServerHandler, Session};
use crate::error::ProxyError;
use crate::message::{DnsEndPoint, ProtocolVersion, Response};
use crate::observability::metrics;
use crate::proxy::ProxyContext;
use crate::tls::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Initial,
    ReceivingHeaders,
    ReceivingBody,
    AuthenticatingClient,
    CreatingTunnel,
    SendingRequestHeaders,
    ReceivingResponse,
    SendingResponse,
    UpgradingToWebSocketTunnel,
    Done,
}

impl State {
    /// States reachable in one step.
    pub fn successors(self) -> &'static [State] {
        use State::*;
        match self {
            Initial => &[ReceivingHeaders],
            ReceivingHeaders => &[ReceivingBody, AuthenticatingClient, CreatingTunnel, Done],
            ReceivingBody => &[SendingRequestHeaders],
            AuthenticatingClient => &[ReceivingHeaders],
            CreatingTunnel => &[Done],
            SendingRequestHeaders => &[ReceivingResponse],
            ReceivingResponse => &[SendingResponse, Done],
            SendingResponse => &[UpgradingToWebSocketTunnel, Done],
            UpgradingToWebSocketTunnel => &[Done],
            Done => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self == State::Done
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Initial => "initial",
            State::ReceivingHeaders => "receiving-headers",
            State::ReceivingBody => "receiving-body",
            State::AuthenticatingClient => "authenticating-client",
            State::CreatingTunnel => "creating-tunnel",
            State::SendingRequestHeaders => "sending-request-headers",
            State::ReceivingResponse => "receiving-response",
            State::SendingResponse => "sending-response",
            State::UpgradingToWebSocketTunnel => "upgrading-to-websocket-tunnel",
            State::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs one session from `Initial` to `Done`.
pub struct StateMachine<'a> {
    ctx: &'a ProxyContext,
    trace: Vec<State>,
    started: Option<Instant>,
    /// Leaf subject chosen by the policy for the pending interception.
    subject: Option<String>,
}

impl<'a> StateMachine<'a> {
    pub fn new(ctx: &'a ProxyContext) -> Self {
        Self {
            ctx,
            trace: Vec::new(),
            started: None,
            subject: None,
        }
    }

    /// Every state entered so far, in order.
    pub fn trace(&self) -> &[State] {
        &self.trace
    }

    /// Drive `session` to completion.
    ///
    /// Returns the session that continues on the same connections when the
    /// exchange ended on a keep-alive boundary.
    pub async fn run(&mut self, session: &mut Session) -> Result<Option<Session>, ProxyError> {
        let span = tracing::info_span!(
            "session",
            id = %session.id(),
            peer_addr = session.peer_addr().map(tracing::field::display),
        );
        self.drive(session).instrument(span).await
    }

    async fn drive(&mut self, session: &mut Session) -> Result<Option<Session>, ProxyError> {
        let mut successor = None;
        let mut state = State::Initial;

        loop {
            session.state = state;
            self.trace.push(state);
            tracing::debug!(state = %state, "Entering state");

            state = match state {
                State::Initial => State::ReceivingHeaders,
                State::ReceivingHeaders => self.receive_headers(session).await?,
                State::ReceivingBody => self.receive_body(session).await?,
                State::AuthenticatingClient => self.authenticate_client(session).await?,
                State::CreatingTunnel => self.create_tunnel(session).await?,
                State::SendingRequestHeaders => self.send_request(session).await?,
                State::ReceivingResponse => self.receive_response(session).await?,
                State::SendingResponse => {
                    let (next, fork) = self.send_response(session).await?;
                    successor = fork;
                    next
                }
                State::UpgradingToWebSocketTunnel => self.upgrade_to_tunnel(session).await?,
                State::Done => {
                    session.close().await;
                    return Ok(successor);
                }
            };
        }
    }

    async fn receive_headers(&mut self, session: &mut Session) -> Result<State, ProxyError> {
        let Some(request) = session.client_mut()?.receive().await? else {
            tracing::debug!("Client closed the connection");
            return Ok(State::Done);
        };
        self.started = Some(Instant::now());
        tracing::debug!(request_line = %request.line(), "Request received");

        let is_connect = request.line().is_verb("CONNECT");
        let resolved = match &session.tunnel {
            Some(tunnel) if !is_connect => Ok(tunnel.clone()),
            _ => request.endpoint(80),
        };
        let target = match resolved {
            Ok(target) => target,
            Err(e) => {
                session.request = Some(request);
                return Err(e);
            }
        };

        if session.tunnel.is_none() && self.is_own_endpoint(&target) {
            let version = request.line().version().clone();
            session.request = Some(request);
            return self.answer_diagnostic(session, &version).await;
        }

        self.ctx.observer().on_request_headers(session.id(), &request);
        session.request = Some(request);
        session.target = Some(target.clone());

        if !is_connect {
            return Ok(State::ReceivingBody);
        }
        if session.tunnel.is_some() {
            // CONNECT from inside an intercepted tunnel is relayed as-is
            return Ok(State::CreatingTunnel);
        }
        Ok(match self.ctx.policy().decide(&target) {
            Decision::Intercept { subject } => {
                self.subject = Some(subject);
                State::AuthenticatingClient
            }
            Decision::Tunnel => State::CreatingTunnel,
        })
    }

    async fn receive_body(&mut self, session: &mut Session) -> Result<State, ProxyError> {
        let Session { client, request, .. } = session;
        let client = client.as_mut().ok_or(ProxyError::Detached("client connection"))?;
        let request = request.as_mut().ok_or(ProxyError::Detached("request"))?;

        if request.has_body() {
            client.receive_body(request).await?;
            tracing::debug!(bytes = request.body().len(), "Request body received");
        }
        Ok(State::SendingRequestHeaders)
    }

    async fn authenticate_client(&mut self, session: &mut Session) -> Result<State, ProxyError> {
        let target = current_target(session)?;
        let version = request_version(session);

        session
            .client_mut()?
            .respond(&version, 200, "Connection established", None, false)
            .await?;

        let subject = self
            .subject
            .take()
            .ok_or(ProxyError::Detached("certificate subject"))?;
        let certificate = self.ctx.certificate_for(&subject).await?;
        let client = session
            .client
            .take()
            .ok_or(ProxyError::Detached("client connection"))?;
        session.client = Some(client.accept_tls(self.ctx.tls(), &certificate).await?);
        tracing::debug!(subject, "Client TLS established");

        self.ensure_server(session, &target).await?;
        let server = session
            .server
            .take()
            .ok_or(ProxyError::Detached("origin connection"))?;
        session.server = Some(server.connect_tls(self.ctx.tls(), target.host()).await?);
        tracing::debug!(target = %target, "Origin TLS established");

        session.request = None;
        session.response = None;
        session.tunnel = Some(target);
        metrics::record_tunnel("intercept");

        Ok(State::ReceivingHeaders)
    }

    async fn create_tunnel(&mut self, session: &mut Session) -> Result<State, ProxyError> {
        let target = current_target(session)?;
        let version = request_version(session);

        self.ensure_server(session, &target).await?;
        session
            .client_mut()?
            .respond(&version, 200, "Connection established", None, false)
            .await?;

        self.relay(session, "connect").await;
        Ok(State::Done)
    }

    async fn send_request(&mut self, session: &mut Session) -> Result<State, ProxyError> {
        let target = current_target(session)?;
        self.ensure_server(session, &target).await?;

        let Session { server, request, .. } = session;
        let server = server.as_mut().ok_or(ProxyError::Detached("origin connection"))?;
        let request = request.as_ref().ok_or(ProxyError::Detached("request"))?;
        server.send_request(request).await?;

        Ok(State::ReceivingResponse)
    }

    async fn receive_response(&mut self, session: &mut Session) -> Result<State, ProxyError> {
        let verb = session
            .request
            .as_ref()
            .map(|r| r.line().verb().to_string())
            .ok_or(ProxyError::Detached("request"))?;
        let server = session
            .server
            .as_mut()
            .ok_or(ProxyError::Detached("origin connection"))?;

        let Some(response) = server.receive_response(&verb).await? else {
            tracing::warn!("Origin closed the connection without a response");
            return Ok(State::Done);
        };
        tracing::debug!(status_line = %response.line(), "Response received");

        if !response.keep_alive() || server.is_exhausted() {
            if let Some(mut server) = session.server.take() {
                server.close().await;
            }
        }
        session.response = Some(response);
        Ok(State::SendingResponse)
    }

    async fn send_response(
        &mut self,
        session: &mut Session,
    ) -> Result<(State, Option<Session>), ProxyError> {
        let id = session.id();
        let Session {
            client,
            request,
            response,
            ..
        } = &mut *session;
        let client = client.as_mut().ok_or(ProxyError::Detached("client connection"))?;
        let request = request.as_ref().ok_or(ProxyError::Detached("request"))?;
        let response = response.as_ref().ok_or(ProxyError::Detached("response"))?;

        client.send_response(response).await?;
        self.ctx.observer().on_response(id, request, response);
        if let Some(started) = self.started {
            metrics::record_exchange(request.line().verb(), response.line().code(), started);
        }

        if request.is_upgrade() {
            return Ok((State::UpgradingToWebSocketTunnel, None));
        }
        if !request.keep_alive() && !response.keep_alive() {
            client.close().await;
            return Ok((State::Done, None));
        }

        let successor = session.fork();
        tracing::debug!(successor = %successor.id(), "Keep-alive, handing connection to next session");
        Ok((State::Done, Some(successor)))
    }

    async fn upgrade_to_tunnel(&mut self, session: &mut Session) -> Result<State, ProxyError> {
        let target = current_target(session)?;
        self.ensure_server(session, &target).await?;
        self.relay(session, "upgrade").await;
        Ok(State::Done)
    }

    /// Make sure the session holds an origin connection to `target`.
    ///
    /// Inside an intercepted tunnel a fresh connection is promoted to TLS.
    async fn ensure_server(
        &self,
        session: &mut Session,
        target: &DnsEndPoint,
    ) -> Result<(), ProxyError> {
        if let Some(server) = &session.server {
            if server.endpoint() == target {
                return Ok(());
            }
        }
        if let Some(mut stale) = session.server.take() {
            tracing::debug!(previous = %stale.endpoint(), target = %target, "Switching origin");
            stale.close().await;
        }

        let mut server = ServerHandler::connect(
            target,
            self.ctx.resolver(),
            self.ctx.connect_timeout(),
            self.ctx.limits(),
        )
        .await?;
        if session.tunnel.as_ref() == Some(target) {
            server = server.connect_tls(self.ctx.tls(), target.host()).await?;
        }
        session.server = Some(server);
        Ok(())
    }

    /// Copy bytes both ways until both directions finish.
    async fn relay(&self, session: &mut Session, kind: &'static str) {
        let (Some(client), Some(server)) = (session.client.take(), session.server.take()) else {
            tracing::debug!(kind, "Relay skipped, a connection is missing");
            return;
        };
        let mut client = client.into_stream();
        let mut server = server.into_stream();
        metrics::record_tunnel(kind);

        match tokio::io::copy_bidirectional(&mut client, &mut server).await {
            Ok((upstream, downstream)) => {
                tracing::debug!(kind, upstream, downstream, "Relay finished")
            }
            Err(e) => tracing::debug!(kind, error = %e, "Relay ended"),
        }
    }

    fn is_own_endpoint(&self, target: &DnsEndPoint) -> bool {
        target.is_loopback() && target.port() == self.ctx.listen_port()
    }

    async fn answer_diagnostic(
        &mut self,
        session: &mut Session,
        version: &ProtocolVersion,
    ) -> Result<State, ProxyError> {
        let body = self.ctx.diagnostic_body();
        let mut response = Response::synthesize(version.clone(), 200, "OK", Some(&body), true);
        response.headers_mut().add("Content-Type", "application/json");

        session.client_mut()?.send_response(&response).await?;
        session.response = Some(response);
        tracing::debug!("Answered self-diagnostic request");
        Ok(State::Done)
    }
}

fn current_target(session: &Session) -> Result<DnsEndPoint, ProxyError> {
    session
        .target
        .clone()
        .ok_or(ProxyError::Detached("request target"))
}

fn request_version(session: &Session) -> ProtocolVersion {
    session
        .request
        .as_ref()
        .map(|r| r.line().version().clone())
        .unwrap_or_else(ProtocolVersion::http_11)
}
