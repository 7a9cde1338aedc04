use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::AdminState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub uptime_secs: u64,
    pub interception: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProxyStatsResponse {
    pub active_connections: u64,
    pub total_connections: u64,
    pub sessions: u64,
    pub failed_sessions: u64,
    pub bad_gateways: u64,
    pub cached_certificates: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        interception: state.ctx.policy().is_enabled(),
    })
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<ProxyStatsResponse> {
    let stats = state.ctx.stats().snapshot();
    Json(ProxyStatsResponse {
        active_connections: state.tracker.active_count(),
        total_connections: state.tracker.total_count(),
        sessions: stats.sessions,
        failed_sessions: stats.failed_sessions,
        bad_gateways: stats.bad_gateways,
        cached_certificates: state.ctx.authority().cached_subjects().len(),
    })
}

pub async fn get_certificates(State(state): State<AdminState>) -> Json<Vec<String>> {
    let mut subjects = state.ctx.authority().cached_subjects();
    subjects.sort();
    Json(subjects)
}

pub async fn get_ca_pem(State(state): State<AdminState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/x-pem-file")],
        state.ctx.authority().ca_certificate_pem().to_string(),
    )
}
