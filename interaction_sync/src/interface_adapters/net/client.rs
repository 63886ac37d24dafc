// WebSocket relay endpoint: one task per participant connection.

use crate::domain::{Envelope, ParticipantId};
use crate::frameworks::config::{JOIN_HANDSHAKE_TIMEOUT, MAX_DISPLAY_NAME_LEN};
use crate::interface_adapters::protocol::{ClientMessage, EnvelopeDto, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::{participant_id_excluding, rand_id};
use crate::use_cases::{Outbound, SessionError, SessionHandle};

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures_util::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{Instrument, debug, error, info, info_span, warn};

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;

#[derive(Debug)]
enum NetError {
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    SessionClosed,
    JoinRequired,
    JoinTimeout,
    #[allow(dead_code)]
    JoinRejected(SessionError),
    ClosedBeforeJoin,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

enum LoopControl {
    Continue,
    Disconnect,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let session = state.session.clone();
    ws.on_upgrade(move |socket| {
        // Correlates log lines from before the participant id exists.
        let span = info_span!(
            "conn",
            conn_id = rand_id(),
            participant_id = tracing::field::Empty
        );
        serve_socket(socket, session).instrument(span)
    })
}

async fn serve_socket(mut socket: WebSocket, session: SessionHandle) {
    // Subscribe before any await so no relay traffic is missed.
    let outbound_rx = session.subscribe();

    let display_name = match timeout(JOIN_HANDSHAKE_TIMEOUT, await_join(&mut socket)).await {
        Ok(Ok(name)) => name,
        Ok(Err(NetError::ClosedBeforeJoin)) => {
            info!("socket closed before join");
            return;
        }
        Ok(Err(e)) => {
            warn!(error = ?e, "join handshake failed");
            return;
        }
        Err(_) => {
            let _ = close_with(&mut socket, close_code::POLICY, "join timeout").await;
            warn!(error = ?NetError::JoinTimeout, "join handshake failed");
            return;
        }
    };

    let mut conn = match Connection::establish(socket, session, outbound_rx).await {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = ?e, "failed to register participant");
            return;
        }
    };

    tracing::Span::current().record("participant_id", conn.participant_id);
    info!(participant_id = conn.participant_id, %display_name, "participant connected");

    conn.run().await;
}

/// Waits for the Join message and returns the sanitized display name.
async fn await_join(socket: &mut WebSocket) -> Result<String, NetError> {
    while let Some(incoming) = socket.recv().await {
        let text = match incoming? {
            Message::Text(text) => text,
            Message::Binary(_) => {
                let _ = close_with(socket, close_code::UNSUPPORTED, "text frames only").await;
                return Err(NetError::JoinRequired);
            }
            Message::Close(_) => return Err(NetError::ClosedBeforeJoin),
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Join(payload)) => {
                return Ok(payload
                    .display_name
                    .trim()
                    .chars()
                    .take(MAX_DISPLAY_NAME_LEN)
                    .collect());
            }
            // Round-trip probes are allowed before joining.
            Ok(ClientMessage::Ping { nonce }) => {
                send_server_message(socket, &ServerMessage::Pong { nonce }).await?;
            }
            Ok(ClientMessage::Envelope(_)) | Err(_) => {
                let _ = close_with(socket, close_code::POLICY, "join required").await;
                return Err(NetError::JoinRequired);
            }
        }
    }
    Err(NetError::ClosedBeforeJoin)
}

async fn send_server_message(
    socket: &mut WebSocket,
    msg: &ServerMessage,
) -> Result<usize, NetError> {
    let text = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let len = text.len();
    socket.send(Message::Text(text.into())).await?;
    Ok(len)
}

async fn close_with(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await?;
    socket.close().await?;
    Ok(())
}

#[derive(Debug, Default)]
struct ConnStats {
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,
    invalid_json: u32,
}

struct Connection {
    socket: WebSocket,
    participant_id: ParticipantId,
    session: SessionHandle,
    outbound_rx: broadcast::Receiver<Outbound>,
    stats: ConnStats,
    last_warn: Instant,
    close_frame: Option<CloseFrame>,
}

impl Connection {
    /// Sends the identity and registers the participant with the host session.
    async fn establish(
        mut socket: WebSocket,
        session: SessionHandle,
        outbound_rx: broadcast::Receiver<Outbound>,
    ) -> Result<Self, NetError> {
        let participant_id = participant_id_excluding(session.host_id);

        // Identity precedes the join so it arrives before any spawn snapshot.
        let identity = ServerMessage::Identity {
            participant_id,
            host_id: session.host_id,
        };
        let bytes = send_server_message(&mut socket, &identity).await?;

        if let Err(e) = session.join(participant_id).await {
            let _ = close_with(&mut socket, close_code::ERROR, "join rejected").await;
            return Err(match e {
                SessionError::Closed => NetError::SessionClosed,
                other => NetError::JoinRejected(other),
            });
        }

        Ok(Self {
            socket,
            participant_id,
            session,
            outbound_rx,
            stats: ConnStats {
                msgs_in: 1,
                msgs_out: 1,
                bytes_out: bytes as u64,
                ..ConnStats::default()
            },
            last_warn: Instant::now() - LOG_THROTTLE,
            close_frame: None,
        })
    }

    async fn run(&mut self) {
        loop {
            let control = tokio::select! {
                incoming = self.socket.recv() => self.on_socket(incoming).await,
                outbound = self.outbound_rx.recv() => self.on_outbound(outbound).await,
            };

            match control {
                Ok(LoopControl::Continue) => {}
                Ok(LoopControl::Disconnect) => break,
                Err(e) => {
                    warn!(participant_id = self.participant_id, error = ?e, "connection failed");
                    break;
                }
            }
        }

        if let Some(frame) = self.close_frame.take() {
            let _ = self.socket.send(Message::Close(Some(frame))).await;
        }
        if let Err(e) = self.socket.close().await {
            debug!(error = %e, "socket close error");
        }

        self.leave().await;
    }

    fn throttled(&mut self) -> bool {
        if self.last_warn.elapsed() < LOG_THROTTLE {
            return false;
        }
        self.last_warn = Instant::now();
        true
    }

    fn close_after(&mut self, code: u16, reason: &'static str) -> LoopControl {
        self.close_frame = Some(CloseFrame {
            code,
            reason: reason.into(),
        });
        LoopControl::Disconnect
    }

    async fn on_socket(
        &mut self,
        incoming: Option<Result<Message, axum::Error>>,
    ) -> Result<LoopControl, NetError> {
        let message = match incoming {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!(participant_id = self.participant_id, error = %e, "websocket recv error");
                return Ok(LoopControl::Disconnect);
            }
            None => return Ok(LoopControl::Disconnect),
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Binary(_) => {
                return Ok(self.close_after(close_code::UNSUPPORTED, "text frames only"));
            }
            Message::Ping(_) | Message::Pong(_) => return Ok(LoopControl::Continue),
            Message::Close(_) => return Ok(LoopControl::Disconnect),
        };
        self.stats.msgs_in += 1;
        self.stats.bytes_in += text.len() as u64;

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Envelope(dto)) => {
                let mut envelope = Envelope::from(dto);
                // The connection decides who is speaking, not the payload.
                envelope.sender = self.participant_id;
                self.session
                    .send(self.participant_id, envelope)
                    .await
                    .map_err(|_| NetError::SessionClosed)?;
            }
            Ok(ClientMessage::Ping { nonce }) => {
                let bytes =
                    send_server_message(&mut self.socket, &ServerMessage::Pong { nonce }).await?;
                self.stats.msgs_out += 1;
                self.stats.bytes_out += bytes as u64;
            }
            Ok(ClientMessage::Join(_)) => {
                if self.throttled() {
                    debug!(participant_id = self.participant_id, "repeated join ignored");
                }
            }
            Err(e) => {
                self.stats.invalid_json += 1;
                if self.throttled() {
                    warn!(
                        participant_id = self.participant_id,
                        bytes = text.len(),
                        error = %e,
                        "unparseable client message"
                    );
                }
                if self.stats.invalid_json > MAX_INVALID_JSON {
                    return Ok(self.close_after(close_code::POLICY, "too many invalid messages"));
                }
            }
        }
        Ok(LoopControl::Continue)
    }

    async fn on_outbound(
        &mut self,
        outbound: Result<Outbound, broadcast::error::RecvError>,
    ) -> Result<LoopControl, NetError> {
        match outbound {
            Ok(outbound) => {
                if !outbound.recipient.includes(self.participant_id) {
                    return Ok(LoopControl::Continue);
                }
                let msg = ServerMessage::Envelope(EnvelopeDto::from(outbound.envelope));
                let bytes = send_server_message(&mut self.socket, &msg).await?;
                self.stats.msgs_out += 1;
                self.stats.bytes_out += bytes as u64;
                Ok(LoopControl::Continue)
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Skipped replication cannot be patched in place; reconnecting
                // yields fresh spawn snapshots.
                warn!(participant_id = self.participant_id, missed, "relay lagged");
                Ok(self.close_after(close_code::AGAIN, "relay lagged"))
            }
            Err(broadcast::error::RecvError::Closed) => Err(NetError::SessionClosed),
        }
    }

    async fn leave(&mut self) {
        // Objects this participant owned go back to the host.
        if let Err(e) = self.session.leave(self.participant_id).await {
            warn!(participant_id = self.participant_id, error = ?e, "leave not delivered");
        }
        debug!(participant_id = self.participant_id, stats = ?self.stats, "connection stats");
        info!(participant_id = self.participant_id, "participant disconnected");
    }
}
