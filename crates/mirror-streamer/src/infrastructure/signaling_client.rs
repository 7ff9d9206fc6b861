//! WebSocket client for the signaling relay.
//!
//! # Connection lifecycle
//!
//! ```text
//! connect ──▶ register{streamer} ──▶ pump messages ──▶ connection lost
//!    ▲                                                       │
//!    └──────────────── wait reconnect_interval ◀─────────────┘
//! ```
//!
//! - Every inbound text frame is decoded and posted to the coordinator as
//!   [`CoordinatorEvent::Signal`].  Frames that do not decode are logged and
//!   dropped; the connection stays up.
//! - Every [`SignalMessage`] the coordinator queues is encoded and sent.
//! - Messages queued while the relay was unreachable are discarded on
//!   reconnect.  They were addressed to a viewer pairing that the relay no
//!   longer remembers.
//!
//! The loop ends when `running` is cleared, when the coordinator's event
//! channel closes, or when every outbound sender has been dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use mirror_core::protocol::codec::{decode_signal, encode_signal};
use mirror_core::{Role, SignalMessage};

use crate::application::session_coordinator::CoordinatorEvent;
use crate::domain::config::SignalingConfig;

/// How often an idle connection re-checks the `running` flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Why one connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Disconnect {
    /// The relay went away; try again.
    Lost,
    /// The streamer is stopping; do not reconnect.
    Stop,
}

/// Keeps the streamer registered with the relay.
#[derive(Debug, Clone)]
pub struct SignalingClient {
    url: String,
    reconnect_interval: Duration,
}

impl SignalingClient {
    pub fn new(config: &SignalingConfig) -> Self {
        Self {
            url: config.url.clone(),
            reconnect_interval: config.reconnect_interval(),
        }
    }

    /// Runs the reconnect loop until told to stop.
    pub async fn run(
        self,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
        mut outbound: mpsc::UnboundedReceiver<SignalMessage>,
        running: Arc<AtomicBool>,
    ) {
        while running.load(Ordering::Relaxed) {
            match connect_async(self.url.as_str()).await {
                Ok((ws, _)) => {
                    info!("connected to signaling relay at {}", self.url);
                    let stale = drain(&mut outbound);
                    if stale > 0 {
                        debug!("discarded {stale} signaling messages queued while offline");
                    }
                    match self.pump(ws, &events, &mut outbound, &running).await {
                        Disconnect::Stop => break,
                        Disconnect::Lost => {
                            warn!(
                                "signaling relay connection lost; reconnecting in {:?}",
                                self.reconnect_interval
                            )
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "cannot reach signaling relay at {}: {e}; retrying in {:?}",
                        self.url, self.reconnect_interval
                    );
                }
            }

            if running.load(Ordering::Relaxed) {
                time::sleep(self.reconnect_interval).await;
            }
        }
        info!("signaling client stopped");
    }

    async fn pump<S>(
        &self,
        ws: S,
        events: &mpsc::UnboundedSender<CoordinatorEvent>,
        outbound: &mut mpsc::UnboundedReceiver<SignalMessage>,
        running: &AtomicBool,
    ) -> Disconnect
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
            + Unpin,
    {
        let (mut ws_tx, mut ws_rx) = ws.split();

        let register = SignalMessage::Register {
            role: Role::Streamer,
        };
        if send(&mut ws_tx, &register).await.is_err() {
            return Disconnect::Lost;
        }

        let mut poll = time::interval(SHUTDOWN_POLL);
        loop {
            tokio::select! {
                inbound = ws_rx.next() => match inbound {
                    Some(Ok(WsMessage::Text(text))) => match decode_signal(&text) {
                        Ok(msg) => {
                            debug!("relay → streamer: {}", msg.kind());
                            if events.send(CoordinatorEvent::Signal(msg)).is_err() {
                                return Disconnect::Stop;
                            }
                        }
                        Err(e) => warn!("dropping malformed signaling frame: {e}"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => return Disconnect::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("signaling read error: {e}");
                        return Disconnect::Lost;
                    }
                },
                queued = outbound.recv() => match queued {
                    Some(msg) => {
                        if send(&mut ws_tx, &msg).await.is_err() {
                            return Disconnect::Lost;
                        }
                    }
                    None => {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        return Disconnect::Stop;
                    }
                },
                _ = poll.tick() => {
                    if !running.load(Ordering::Relaxed) {
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        return Disconnect::Stop;
                    }
                }
            }
        }
    }
}

/// Encodes and sends one message.  Encoding failures are logged and
/// swallowed; only a broken socket is an error.
async fn send<W>(ws_tx: &mut W, msg: &SignalMessage) -> Result<(), ()>
where
    W: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = match encode_signal(msg) {
        Ok(text) => text,
        Err(e) => {
            warn!("cannot encode {} message: {e}", msg.kind());
            return Ok(());
        }
    };
    debug!("streamer → relay: {}", msg.kind());
    ws_tx.send(WsMessage::Text(text)).await.map_err(|e| {
        debug!("signaling write error: {e}");
    })
}

fn drain(outbound: &mut mpsc::UnboundedReceiver<SignalMessage>) -> usize {
    let mut count = 0;
    while outbound.try_recv().is_ok() {
        count += 1;
    }
    count
}

// ── Tests ─────────────────────────────────────────────────────────────────────
