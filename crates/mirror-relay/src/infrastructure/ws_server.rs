//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from streamers and viewers.
//! 3. Upgrading each connection to a WebSocket session.
//! 4. Feeding every inbound text frame to the shared [`PairingTable`] and
//!    carrying out the resulting deliveries.
//! 5. Gracefully shutting down when the `running` flag is cleared.
//!
//! Each connection gets a writer task that drains an unbounded queue into
//! the WebSocket sink, so one slow peer never stalls routing for the other.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{ConnectionId, Delivery, Outbound, PairingTable};
use crate::domain::RelayConfig;

/// Shared routing state: the pairing table plus each connection's outbound
/// queue.
#[derive(Default)]
struct RelayHub {
    table: PairingTable,
    peers: HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>,
}

impl RelayHub {
    fn dispatch(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            match self.peers.get(&delivery.to) {
                Some(tx) => {
                    // The receiver only disappears while the peer is tearing
                    // down; its disconnect handling follows shortly.
                    let _ = tx.send(delivery.message);
                }
                None => debug!("delivery to departed connection {} dropped", delivery.to),
            }
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(config: RelayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.bind_addr))?;

    info!("signaling relay listening on {}", config.bind_addr);

    serve(listener, config.shutdown_poll, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Split out from [`run_server`] so tests can bind port 0 and learn the
/// address before the loop starts.
///
/// # Errors
///
/// Currently never fails; accept errors are logged and the loop continues.
pub async fn serve(
    listener: TcpListener,
    shutdown_poll: Duration,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let hub = Arc::new(Mutex::new(RelayHub::default()));

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout lets the loop notice the shutdown flag even when
        // nobody is connecting.
        match timeout(shutdown_poll, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, hub).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(raw_stream: TcpStream, peer_addr: SocketAddr, hub: Arc<Mutex<RelayHub>>) {
    match run_connection(raw_stream, peer_addr, hub).await {
        Ok(()) => debug!("connection {peer_addr} closed normally"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one relay connection.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails.
async fn run_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<Mutex<RelayHub>>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let conn_id: ConnectionId = Uuid::new_v4();
    info!("connection {conn_id} established from {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();

    hub.lock().await.peers.insert(conn_id, out_tx);

    // ── Writer: outbound queue → WebSocket ────────────────────────────────────
    let writer_task = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                        debug!("connection {conn_id}: send failed (peer gone)");
                        break;
                    }
                }
                Outbound::Close => {
                    info!("connection {conn_id}: superseded, closing");
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    // ── Reader: WebSocket → pairing table ─────────────────────────────────────
    loop {
        let ws_msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!("connection {conn_id}: closed");
                break;
            }
            Some(Err(e)) => {
                warn!("connection {conn_id}: WebSocket error: {e}");
                break;
            }
            None => break,
        };

        match ws_msg {
            WsMessage::Text(text) => {
                let mut hub = hub.lock().await;
                match hub.table.handle_text(conn_id, &text) {
                    Ok(deliveries) => {
                        debug!(
                            "connection {conn_id}: frame of {} bytes → {} deliveries",
                            text.len(),
                            deliveries.len()
                        );
                        hub.dispatch(deliveries);
                    }
                    Err(e) => warn!("connection {conn_id}: dropped frame: {e}"),
                }
            }
            WsMessage::Binary(_) => {
                warn!("connection {conn_id}: unexpected binary frame (ignored)");
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }

    {
        let mut hub = hub.lock().await;
        hub.peers.remove(&conn_id);
        let deliveries = hub.table.disconnect(conn_id);
        hub.dispatch(deliveries);
    }
    writer_task.abort();

    info!("connection {conn_id} ({peer_addr}) disconnected");
    Ok(())
}
