//! Intercepting proxy (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                 INTERCEPTING PROXY                    │
//!                        │                                                       │
//!   Client (browser)     │  ┌──────────┐   ┌──────────┐   ┌─────────────────┐   │
//!   ─────────────────────┼─▶│   net    │──▶│  proxy   │──▶│ session machine │   │
//!                        │  │ listener │   │  server  │   │  client/server  │   │
//!                        │  └──────────┘   └──────────┘   └───┬─────────┬───┘   │
//!                        │                                    │         │       │
//!                        │                       ┌────────────▼──┐  ┌───▼────┐  │
//!                        │                       │ tls: policy,  │  │ codec  │──┼──▶ Origin
//!                        │                       │ CA, handshake │  │ + pipe │  │
//!                        │                       └───────────────┘  └────────┘  │
//!                        │                                                       │
//!                        │  config · observability · lifecycle · admin API       │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use intercept_proxy::admin::{self, AdminState};
use intercept_proxy::config::{load_config, validate_config, ProxyConfig};
use intercept_proxy::lifecycle::{build_context, spawn_signal_handler, Shutdown};
use intercept_proxy::net::Listener;
use intercept_proxy::observability::{logging, metrics};
use intercept_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "intercept-proxy", version)]
#[command(about = "TLS-intercepting HTTP proxy", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,

    /// Tunnel every CONNECT without interception
    #[arg(long)]
    no_intercept: bool,

    /// Override `observability.log_level`
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if self.no_intercept {
            config.interception.enabled = false;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    args.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {error}");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init_tracing(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "intercept-proxy starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr()?;
    let ctx = Arc::new(build_context(&config, local_addr.port())?);
    let server = ProxyServer::new(Arc::clone(&ctx));

    let shutdown = Arc::new(Shutdown::new());
    let stop_accepting = shutdown.subscribe();
    spawn_signal_handler(Arc::clone(&shutdown));

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(
            Arc::clone(&ctx),
            server.tracker().clone(),
            &config.admin.api_key,
        );
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let stop = async move { shutdown.triggered().await };
            if let Err(e) = admin::serve(admin_listener, state, stop).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    tracing::info!(
        address = %local_addr,
        interception = config.interception.enabled,
        "Proxy ready"
    );
    server
        .run(listener, stop_accepting, config.timeouts.shutdown_grace())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
