//! Loopback listener: accepts game client connections and spins up one
//! session (plus its notification bridge) per socket.

use crate::backend::AccountBackend;
use crate::bridge::NotificationBridge;
use crate::config::GatewayConfig;
use crate::dispatch::Catalog;
use crate::session::{self, FrameWriter, SessionContext, TopicSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Accept loop. Binds the loopback port and runs until shutdown is
/// signalled; a bind failure is returned to the caller.
pub async fn run<B, F>(
    config: GatewayConfig,
    catalog: Arc<Catalog<B>>,
    make_backend: F,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()>
where
    B: AccountBackend,
    F: Fn() -> B,
{
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, config.port)).await?;
    info!(port = config.port, "listening for game clients");

    let mut shutdown_accept = shutdown.clone();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        // Loopback peers only; anything else is dropped
                        // before a single byte is read.
                        if !peer.ip().is_loopback() {
                            warn!(%peer, "rejected non-loopback peer");
                            continue;
                        }
                        info!(%peer, "accepted game client connection");
                        spawn_session(
                            socket,
                            catalog.clone(),
                            Arc::new(make_backend()),
                            &config,
                            shutdown.clone(),
                        );
                    }
                    Err(err) => {
                        error!(error = %err, "accept failed");
                    }
                }
            }
            _ = shutdown_accept.changed() => {
                info!("shutting down listener");
                break;
            }
        }
    }

    Ok(())
}

fn spawn_session<B: AccountBackend>(
    socket: TcpStream,
    catalog: Arc<Catalog<B>>,
    backend: Arc<B>,
    config: &GatewayConfig,
    shutdown: watch::Receiver<bool>,
) {
    let (read_half, write_half) = socket.into_split();
    let writer = Arc::new(FrameWriter::new(write_half));
    let topics = Arc::new(TopicSet::new());
    let ctx = Arc::new(SessionContext::new(
        writer.clone(),
        backend,
        topics.clone(),
        config.user_id,
    ));

    let bridge = NotificationBridge::new(
        config.pusher_url.clone(),
        config.access_token.clone(),
        writer,
        topics,
    );
    let (bridge_stop_tx, bridge_stop_rx) = watch::channel(false);
    let bridge_task = tokio::spawn(bridge.run(bridge_stop_rx));

    tokio::spawn(async move {
        session::run(read_half, ctx, catalog, shutdown).await;
        // Session over: cancel the bridge and wait for it to release the
        // shared writer before the socket halves drop.
        let _ = bridge_stop_tx.send(true);
        let _ = bridge_task.await;
    });
}
