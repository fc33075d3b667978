//! # turnstile-server
//!
//! HTTP server for the turnstile access-control system.
//!
//! This binary provides:
//! - REST API for code redemption, hourly stats and occupancy
//! - OpenAPI documentation via Swagger UI at `/docs`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, in-memory store
//! TURNSTILE__STORE__BACKEND=memory cargo run --package turnstile-server
//!
//! # Production (on the door controller)
//! ./turnstile-server --production --config /etc/turnstile/config.toml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use turnstile_core::TurnstileConfig;
use turnstile_server::{api, logging, state::AppState};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "turnstile-server", version, about = "HTTP redemption service for turnstile")]
struct Args {
    /// Configuration file (defaults to the platform location if present).
    #[arg(short, long, env = "TURNSTILE_CONFIG")]
    config: Option<PathBuf>,

    /// Use production logging (JSON files + compact stdout).
    #[arg(long)]
    production: bool,

    /// Override `server.bind`.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = TurnstileConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    let _log_guard = logging::init(&config.server, args.production)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.store.backend,
        "Starting turnstile-server"
    );

    let addr = match args.bind {
        Some(addr) => addr,
        None => config
            .server
            .bind
            .parse()
            .with_context(|| format!("invalid server.bind '{}'", config.server.bind))?,
    };

    let state = AppState::new(config)?;
    let app = api::create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("turnstile-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
