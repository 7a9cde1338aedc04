//! Admin HTTP API.
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.
//!
//! - `GET /admin/status`: version, uptime, interception flag
//! - `GET /admin/stats`: connection, session and certificate counters
//! - `GET /admin/certificates`: cached certificate subjects
//! - `GET /admin/ca.pem`: the CA certificate clients must trust

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::net::ConnectionTracker;
use crate::proxy::ProxyContext;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub ctx: Arc<ProxyContext>,
    pub tracker: ConnectionTracker,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(ctx: Arc<ProxyContext>, tracker: ConnectionTracker, api_key: &str) -> Self {
        Self {
            ctx,
            tracker,
            api_key: Arc::from(api_key),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/certificates", get(get_certificates))
        .route("/admin/ca.pem", get(get_ca_pem))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AdminState, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Admin API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::{CertificateAuthority, IssueCertificate, TlsProvider};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> AdminState {
        let authority = Arc::new(CertificateAuthority::generate("Admin Test Root").unwrap());
        authority.issue_or_fetch("*.example.com").unwrap();
        let tls = TlsProvider::new(Vec::new(), Duration::from_secs(1)).unwrap();
        let ctx = Arc::new(ProxyContext::new(authority, tls));
        AdminState::new(ctx, ConnectionTracker::new(), "secret")
    }

    fn get(path: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let app = setup_admin_router(state());

        let missing = app.clone().oneshot(get("/admin/status", None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app.clone().oneshot(get("/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = app.oneshot(get("/admin/status", Some("secret"))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_and_certificates() {
        let app = setup_admin_router(state());

        let response = app
            .clone()
            .oneshot(get("/admin/stats", Some("secret")))
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let stats: ProxyStatsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats.cached_certificates, 1);
        assert_eq!(stats.active_connections, 0);

        let response = app
            .oneshot(get("/admin/certificates", Some("secret")))
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let subjects: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(subjects, vec!["*.example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_ca_pem() {
        let app = setup_admin_router(state());
        let response = app.oneshot(get("/admin/ca.pem", Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec())
            .unwrap()
            .starts_with("-----BEGIN CERTIFICATE-----"));
    }
}
