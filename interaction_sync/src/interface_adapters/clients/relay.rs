// Participant-side WebSocket client for the interaction relay.
// Bridges the socket to the `Transport`/`ParticipantDirectory` ports so a
// local `InteractableRegistry` can run against a live host.

use crate::domain::ports::{ParticipantDirectory, Transport};
use crate::domain::{Envelope, ParticipantId};
use crate::frameworks::config::JOIN_HANDSHAKE_TIMEOUT;
use crate::interface_adapters::protocol::{ClientMessage, EnvelopeDto, JoinPayload, ServerMessage};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Pongs later than this are treated as lost.
const PING_EXPIRY: Duration = Duration::from_secs(10);

enum Outgoing {
    Message(ClientMessage),
    Close,
}

#[derive(Debug)]
pub enum RelayError {
    Ws(tokio_tungstenite::tungstenite::Error),
    Serialization(serde_json::Error),
    HandshakeTimeout,
    // Socket closed before an identity arrived.
    ClosedBeforeIdentity,
    Disconnected,
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Ws(e) => write!(f, "websocket error: {e}"),
            RelayError::Serialization(e) => write!(f, "serialization error: {e}"),
            RelayError::HandshakeTimeout => write!(f, "join handshake timed out"),
            RelayError::ClosedBeforeIdentity => write!(f, "closed before identity"),
            RelayError::Disconnected => write!(f, "relay disconnected"),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::Ws(e)
    }
}

#[derive(Default)]
struct LinkState {
    connected: AtomicBool,
    rtt: Mutex<Option<Duration>>,
    pending_pings: Mutex<HashMap<u64, Instant>>,
    next_nonce: AtomicU64,
}

/// Cloneable handle implementing the protocol ports over a live relay connection.
#[derive(Clone)]
pub struct RelayLink {
    participant_id: ParticipantId,
    host_id: ParticipantId,
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    state: Arc<LinkState>,
}

impl Transport for RelayLink {
    fn send(&self, envelope: Envelope) -> Result<(), String> {
        self.outgoing_tx
            .send(Outgoing::Message(ClientMessage::Envelope(
                EnvelopeDto::from(envelope),
            )))
            .map_err(|_| "relay connection closed".to_string())
    }
}

impl ParticipantDirectory for RelayLink {
    fn local_id(&self) -> ParticipantId {
        self.participant_id
    }

    fn host_id(&self) -> ParticipantId {
        self.host_id
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    fn rtt_to_host(&self) -> Option<Duration> {
        self.state.rtt.lock().ok().and_then(|rtt| *rtt)
    }
}

pub struct RelayClient {
    link: RelayLink,
    inbound_rx: mpsc::UnboundedReceiver<Envelope>,
}

impl RelayClient {
    /// Connects to `url` (a `ws://.../ws` endpoint) and completes the join handshake.
    pub async fn connect(url: &str, display_name: &str) -> Result<Self, RelayError> {
        let (ws, _response) = connect_async(url).await?;
        let (mut write, mut read) = ws.split();

        send_client_message(
            &mut write,
            &ClientMessage::Join(JoinPayload {
                display_name: display_name.to_string(),
            }),
        )
        .await?;

        let (participant_id, host_id) =
            match timeout(JOIN_HANDSHAKE_TIMEOUT, read_identity(&mut read)).await {
                Ok(result) => result?,
                Err(_) => return Err(RelayError::HandshakeTimeout),
            };
        debug!(participant_id, host_id, "relay identity received");

        let state = Arc::new(LinkState::default());
        state.connected.store(true, Ordering::Release);

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<Outgoing>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Envelope>();

        tokio::spawn(writer_task(write, outgoing_rx, state.clone()));
        tokio::spawn(reader_task(read, inbound_tx, state.clone()));

        Ok(Self {
            link: RelayLink {
                participant_id,
                host_id,
                outgoing_tx,
                state,
            },
            inbound_rx,
        })
    }

    pub fn participant_id(&self) -> ParticipantId {
        self.link.participant_id
    }

    pub fn host_id(&self) -> ParticipantId {
        self.link.host_id
    }

    /// Port handle to hand to an `InteractableRegistry` as both transport and directory.
    pub fn link(&self) -> RelayLink {
        self.link.clone()
    }

    /// Next envelope relayed by the host, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.inbound_rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.inbound_rx.try_recv().ok()
    }

    /// Sends a ping; the RTT estimate updates when the pong arrives.
    pub fn ping(&self) -> Result<(), RelayError> {
        let nonce = self.link.state.next_nonce.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut pending) = self.link.state.pending_pings.lock() {
            track_ping(&mut pending, nonce, Instant::now());
        }
        self.link
            .outgoing_tx
            .send(Outgoing::Message(ClientMessage::Ping { nonce }))
            .map_err(|_| RelayError::Disconnected)
    }

    /// Closes the socket once queued messages are flushed. Links held elsewhere
    /// report disconnected afterwards.
    pub fn close(self) {
        let _ = self.link.outgoing_tx.send(Outgoing::Close);
    }
}

fn track_ping(pending: &mut HashMap<u64, Instant>, nonce: u64, now: Instant) {
    pending.retain(|_, sent_at| now.saturating_duration_since(*sent_at) < PING_EXPIRY);
    pending.insert(nonce, now);
}

async fn send_client_message(
    write: &mut SplitSink<WsStream, Message>,
    msg: &ClientMessage,
) -> Result<(), RelayError> {
    let text = serde_json::to_string(msg).map_err(RelayError::Serialization)?;
    write.send(Message::Text(text.into())).await?;
    Ok(())
}

async fn read_identity(
    read: &mut SplitStream<WsStream>,
) -> Result<(ParticipantId, ParticipantId), RelayError> {
    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(ServerMessage::Identity {
                    participant_id,
                    host_id,
                }) => return Ok((participant_id, host_id)),
                Ok(other) => debug!(?other, "ignoring message before identity"),
                Err(e) => return Err(RelayError::Serialization(e)),
            },
            Message::Close(_) => return Err(RelayError::ClosedBeforeIdentity),
            _ => {}
        }
    }
    Err(RelayError::ClosedBeforeIdentity)
}

async fn writer_task(
    mut write: SplitSink<WsStream, Message>,
    mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
    state: Arc<LinkState>,
) {
    while let Some(Outgoing::Message(msg)) = outgoing_rx.recv().await {
        if let Err(e) = send_client_message(&mut write, &msg).await {
            warn!(error = %e, "relay send failed");
            break;
        }
    }
    state.connected.store(false, Ordering::Release);
    let _ = write.close().await;
}

async fn reader_task(
    mut read: SplitStream<WsStream>,
    inbound_tx: mpsc::UnboundedSender<Envelope>,
    state: Arc<LinkState>,
) {
    while let Some(message) = read.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                debug!(?frame, "relay closed connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "relay recv failed");
                break;
            }
        };

        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(ServerMessage::Envelope(dto)) => {
                if inbound_tx.send(Envelope::from(dto)).is_err() {
                    break;
                }
            }
            Ok(ServerMessage::Pong { nonce }) => {
                let sent_at = state
                    .pending_pings
                    .lock()
                    .ok()
                    .and_then(|mut pending| pending.remove(&nonce));
                if let (Some(sent_at), Ok(mut rtt)) = (sent_at, state.rtt.lock()) {
                    *rtt = Some(sent_at.elapsed());
                }
            }
            Ok(ServerMessage::Identity { .. }) => {
                debug!("duplicate identity ignored");
            }
            Err(e) => warn!(error = %e, "failed to parse relay message"),
        }
    }
    state.connected.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_pongs_never_arrive_then_expired_pings_are_dropped() {
        let start = Instant::now();
        let mut pending = HashMap::new();

        track_ping(&mut pending, 0, start);
        track_ping(&mut pending, 1, start + Duration::from_secs(5));
        assert_eq!(pending.len(), 2);

        track_ping(&mut pending, 2, start + PING_EXPIRY + Duration::from_secs(1));

        assert!(!pending.contains_key(&0));
        assert!(pending.contains_key(&1));
        assert!(pending.contains_key(&2));
    }

    #[test]
    fn when_pings_repeat_without_pongs_then_pending_set_stays_bounded() {
        let start = Instant::now();
        let mut pending = HashMap::new();

        for nonce in 0..1_000u64 {
            track_ping(&mut pending, nonce, start + Duration::from_secs(nonce));
        }

        assert_eq!(pending.len(), PING_EXPIRY.as_secs() as usize);
    }
}
