//! beacon-gateway: loopback protocol gateway daemon.
//!
//! Exposes the game client's length-prefixed binary protocol on a loopback
//! TCP socket, translating requests into calls against the remote
//! account/social backend and bridging its push-notification channel onto
//! the same socket.

mod backend;
mod bridge;
mod config;
mod dispatch;
mod handlers;
mod server;
mod session;
#[cfg(test)]
mod testutil;

use backend::rest::Endpoints;
use backend::{RestBackend, TokenStore};
use clap::Parser;
use config::GatewayConfig;
use dispatch::Catalog;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// beacon-gateway — loopback gateway for the game client protocol
#[derive(Parser, Debug)]
#[command(name = "beacon-gateway", version, about = "Loopback gateway for the game client protocol")]
struct Cli {
    /// Access token issued to the launcher session
    #[arg(long)]
    access_token: Option<String>,

    /// Refresh token used as the grant source for game clients
    #[arg(long)]
    refresh_token: Option<String>,

    /// Platform user id
    #[arg(long)]
    user_id: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long, default_value = "~/.beacon/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = PathBuf::from(&cli.config);
    let config = match GatewayConfig::load(
        Some(&config_path),
        cli.port,
        cli.access_token.as_deref(),
        cli.refresh_token.as_deref(),
        cli.user_id.as_deref(),
    ) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        "starting beacon-gateway"
    );

    let http = reqwest::Client::new();
    let tokens = Arc::new(TokenStore::new(config.refresh_token.clone()));
    let catalog = Arc::new(Catalog::standard());
    let endpoints = Endpoints {
        auth_url: config.auth_url.clone(),
        gameplay_url: config.gameplay_url.clone(),
        users_url: config.users_url.clone(),
    };

    let make_backend = {
        let session_token = config.access_token.clone();
        let user_id = config.user_id;
        move || {
            RestBackend::new(
                http.clone(),
                tokens.clone(),
                endpoints.clone(),
                session_token.clone(),
                user_id,
            )
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::select! {
        result = server::run(config, catalog, make_backend, shutdown_rx) => {
            if let Err(err) = result {
                error!(error = %err, "listener error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    }

    info!("beacon-gateway stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
