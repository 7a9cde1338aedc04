//! Accept loop and per-connection session driver.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;

use super::ProxyContext;
use crate::codec::Pipe;
use crate::error::ProxyError;
use crate::message::ProtocolVersion;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::session::{Session, StateMachine};

/// Accepts client connections and runs sessions on them.
pub struct ProxyServer {
    ctx: Arc<ProxyContext>,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    pub fn new(ctx: Arc<ProxyContext>) -> Self {
        Self {
            ctx,
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn context(&self) -> &Arc<ProxyContext> {
        &self.ctx
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept until `shutdown` fires, then wait up to `grace` for open
    /// connections to finish.
    pub async fn run(
        &self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
        grace: Duration,
    ) -> Result<(), ListenerError> {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr, permit)) => {
                            let ctx = Arc::clone(&self.ctx);
                            let guard = self.tracker.track();
                            tokio::spawn(async move {
                                let _permit = permit;
                                let _guard = guard;
                                serve_connection(ctx, stream, peer_addr).await;
                            });
                        }
                        Err(ListenerError::Accept(e)) => {
                            // transient (EMFILE, ECONNABORTED); keep serving
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                        Err(e) => return Err(e),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Proxy listener stopping");
                    break;
                }
            }
        }

        drop(listener);
        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, grace_secs = grace.as_secs(), "Draining client connections");
        }
        if !self.tracker.wait_for_drain(grace).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Grace period elapsed with connections still open"
            );
        }
        Ok(())
    }
}

/// Run sessions on one client connection until it stops being persistent.
pub async fn serve_connection(ctx: Arc<ProxyContext>, stream: TcpStream, peer_addr: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::trace!(error = %e, "Could not disable Nagle on client socket");
    }
    let session = Session::new(Pipe::new(stream, ctx.limits())).with_peer(peer_addr);
    run_sessions(&ctx, session).await;
}

/// Run `first` and every keep-alive successor it hands over.
pub async fn run_sessions(ctx: &ProxyContext, first: Session) {
    let mut next = Some(first);
    while let Some(session) = next {
        next = serve_session(ctx, session).await;
    }
}

/// Drive one session run. A failed run answers `502 Bad Gateway` when the
/// client connection is still attached.
pub async fn serve_session(ctx: &ProxyContext, mut session: Session) -> Option<Session> {
    let mut machine = StateMachine::new(ctx);
    match machine.run(&mut session).await {
        Ok(successor) => {
            ctx.stats().record_session(false);
            metrics::record_session("completed");
            successor
        }
        Err(e) => {
            tracing::warn!(
                session_id = %session.id(),
                state = %session.state(),
                error = %e,
                "Session failed"
            );
            ctx.stats().record_session(true);
            metrics::record_session("failed");
            send_bad_gateway(ctx, &mut session, &e).await;
            session.close().await;
            None
        }
    }
}

async fn send_bad_gateway(ctx: &ProxyContext, session: &mut Session, error: &ProxyError) {
    let version = session
        .request()
        .map(|r| r.line().version().clone())
        .unwrap_or_else(ProtocolVersion::http_11);
    let Ok(client) = session.client_mut() else {
        return;
    };

    let body = error.to_string();
    match client.respond(&version, 502, "Bad Gateway", Some(&body), true).await {
        Ok(_) => {
            ctx.stats().record_bad_gateway();
            metrics::record_bad_gateway();
        }
        Err(e) => tracing::debug!(error = %e, "Could not deliver 502 to client"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecLimits;
    use crate::tls::{CertificateAuthority, TlsProvider};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn context() -> ProxyContext {
        let authority = Arc::new(CertificateAuthority::generate("Server Test Root").unwrap());
        let tls = TlsProvider::new(Vec::new(), Duration::from_secs(1)).unwrap();
        ProxyContext::new(authority, tls)
    }

    #[tokio::test]
    async fn test_failed_session_answers_bad_gateway() {
        let ctx = context();
        let (mut peer, local) = duplex(16 * 1024);
        peer.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();

        let session = Session::new(Pipe::new(local, CodecLimits::default()));
        assert!(serve_session(&ctx, session).await.is_none());

        let mut received = String::new();
        peer.read_to_string(&mut received).await.unwrap();
        assert!(received.starts_with("HTTP/1.0 502 Bad Gateway\r\n"));
        assert!(received.contains("Connection: close\r\n"));
        assert!(received.ends_with(&ProxyError::MissingHost.to_string()));

        let stats = ctx.stats().snapshot();
        assert_eq!(stats.failed_sessions, 1);
        assert_eq!(stats.bad_gateways, 1);
    }

    #[tokio::test]
    async fn test_client_close_is_not_a_failure() {
        let ctx = context();
        let (peer, local) = duplex(1024);
        drop(peer);

        let session = Session::new(Pipe::new(local, CodecLimits::default()));
        assert!(serve_session(&ctx, session).await.is_none());
        assert_eq!(ctx.stats().snapshot().failed_sessions, 0);
        assert_eq!(ctx.stats().snapshot().sessions, 1);
    }
}
