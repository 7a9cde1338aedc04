//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted client connections
//! - `proxy_active_connections` (gauge): currently open client connections
//! - `proxy_sessions_total` (counter): finished session runs by outcome
//! - `proxy_tunnels_total` (counter): relays by kind (connect, intercept, upgrade)
//! - `proxy_certificates_issued_total` (counter): leaf certificates minted
//! - `proxy_bad_gateway_total` (counter): synthesized 502 responses
//! - `proxy_exchange_duration_seconds` (histogram): request to relayed response
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed, so library code and tests never need one

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_connection_opened() {
    counter!("proxy_connections_total").increment(1);
    gauge!("proxy_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("proxy_active_connections").decrement(1.0);
}

pub fn record_session(outcome: &'static str) {
    counter!("proxy_sessions_total", "outcome" => outcome).increment(1);
}

pub fn record_tunnel(kind: &'static str) {
    counter!("proxy_tunnels_total", "kind" => kind).increment(1);
}

pub fn record_certificate_issued() {
    counter!("proxy_certificates_issued_total").increment(1);
}

pub fn record_bad_gateway() {
    counter!("proxy_bad_gateway_total").increment(1);
}

pub fn record_exchange(verb: &str, status: &str, started: Instant) {
    histogram!(
        "proxy_exchange_duration_seconds",
        "verb" => verb.to_string(),
        "status" => status.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}
