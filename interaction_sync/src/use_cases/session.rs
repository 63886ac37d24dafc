// Host session task: owns the authority and serializes every event through it.

use crate::domain::errors::HostError;
use crate::domain::{Envelope, ObjectId, ParticipantId};
use crate::use_cases::host::HostAuthority;
use crate::use_cases::types::{Outbound, ServerInteractionEvent};
use std::sync::Arc;
use tokio::sync::{Notify, broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Inputs consumed by the session task, in arrival order.
#[derive(Debug)]
pub enum HostEvent {
    Join {
        participant_id: ParticipantId,
        reply: oneshot::Sender<Result<(), HostError>>,
    },
    Leave {
        participant_id: ParticipantId,
    },
    Message {
        from: ParticipantId,
        envelope: Envelope,
    },
    Spawn {
        kind: String,
        spawn_locked: bool,
        reply: oneshot::Sender<ObjectId>,
    },
    Despawn {
        object_id: ObjectId,
        reply: oneshot::Sender<Result<(), HostError>>,
    },
}

/// Shared configuration for the session channels.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Participant id the host process uses on the wire.
    pub host_id: ParticipantId,
    /// Capacity for inbound participant events.
    pub event_channel_capacity: usize,
    /// Capacity for outbound relay broadcasts.
    pub broadcast_capacity: usize,
}

/// Errors returned by session handle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session task is gone.
    Closed,
    Host(HostError),
}

impl From<HostError> for SessionError {
    fn from(error: HostError) -> Self {
        SessionError::Host(error)
    }
}

/// Channels into and out of a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    pub host_id: ParticipantId,
    event_tx: mpsc::Sender<HostEvent>,
    outbound_tx: broadcast::Sender<Outbound>,
    server_events_tx: broadcast::Sender<ServerInteractionEvent>,
    shutdown: Arc<Notify>,
}

impl SessionHandle {
    /// Receiver for every envelope the host emits; filter by `Outbound::recipient`.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound_tx.subscribe()
    }

    pub fn subscribe_server_events(&self) -> broadcast::Receiver<ServerInteractionEvent> {
        self.server_events_tx.subscribe()
    }

    /// Registers a participant. Its spawn snapshot is published on the outbound
    /// broadcast, so subscribe first.
    pub async fn join(&self, participant_id: ParticipantId) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send_event(HostEvent::Join {
            participant_id,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    pub async fn leave(&self, participant_id: ParticipantId) -> Result<(), SessionError> {
        self.send_event(HostEvent::Leave { participant_id }).await
    }

    pub async fn send(&self, from: ParticipantId, envelope: Envelope) -> Result<(), SessionError> {
        self.send_event(HostEvent::Message { from, envelope }).await
    }

    pub async fn spawn_object(
        &self,
        kind: impl Into<String>,
        spawn_locked: bool,
    ) -> Result<ObjectId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send_event(HostEvent::Spawn {
            kind: kind.into(),
            spawn_locked,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn despawn_object(&self, object_id: ObjectId) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send_event(HostEvent::Despawn { object_id, reply })
            .await?;
        rx.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn send_event(&self, event: HostEvent) -> Result<(), SessionError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// Creates the session channels and spawns its task.
pub fn spawn_session(settings: SessionSettings) -> SessionHandle {
    let (event_tx, event_rx) = mpsc::channel::<HostEvent>(settings.event_channel_capacity);
    let (outbound_tx, _outbound_rx) = broadcast::channel::<Outbound>(settings.broadcast_capacity);
    let (server_events_tx, _server_events_rx) =
        broadcast::channel::<ServerInteractionEvent>(settings.broadcast_capacity);
    let shutdown = Arc::new(Notify::new());

    tokio::spawn(host_session_task(
        event_rx,
        outbound_tx.clone(),
        server_events_tx.clone(),
        settings.host_id,
        shutdown.clone(),
    ));

    SessionHandle {
        host_id: settings.host_id,
        event_tx,
        outbound_tx,
        server_events_tx,
        shutdown,
    }
}

pub async fn host_session_task(
    mut event_rx: mpsc::Receiver<HostEvent>,
    outbound_tx: broadcast::Sender<Outbound>,
    server_events_tx: broadcast::Sender<ServerInteractionEvent>,
    host_id: ParticipantId,
    shutdown: Arc<Notify>,
) {
    let mut authority = HostAuthority::new(host_id);
    info!(host_id, "host session started");

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                break;
            }
            event = event_rx.recv() => {
                let Some(event) = event else {
                    // Every handle dropped.
                    break;
                };
                let out = apply_event(&mut authority, event);
                for outbound in out {
                    // No subscribers is fine; nobody is connected.
                    let _ = outbound_tx.send(outbound);
                }
                for server_event in authority.drain_server_events() {
                    let _ = server_events_tx.send(server_event);
                }
            }
        }
    }

    info!(host_id, "host session stopped");
}

fn apply_event(authority: &mut HostAuthority, event: HostEvent) -> Vec<Outbound> {
    match event {
        HostEvent::Join {
            participant_id,
            reply,
        } => match authority.join(participant_id) {
            Ok(out) => {
                let _ = reply.send(Ok(()));
                out
            }
            Err(e) => {
                warn!(participant_id, error = ?e, "join rejected");
                let _ = reply.send(Err(e));
                Vec::new()
            }
        },
        HostEvent::Leave { participant_id } => {
            authority.leave(participant_id).unwrap_or_else(|e| {
                debug!(participant_id, error = ?e, "leave ignored");
                Vec::new()
            })
        }
        HostEvent::Message { from, envelope } => {
            let object_id = envelope.object_id;
            authority.handle(from, envelope).unwrap_or_else(|e| {
                match e {
                    HostError::StaleRequest { .. } => {
                        debug!(from, object_id, error = ?e, "envelope dropped")
                    }
                    _ => warn!(from, object_id, error = ?e, "envelope rejected"),
                }
                Vec::new()
            })
        }
        HostEvent::Spawn {
            kind,
            spawn_locked,
            reply,
        } => {
            let (object_id, out) = authority.spawn(kind, spawn_locked);
            let _ = reply.send(object_id);
            vec![out]
        }
        HostEvent::Despawn { object_id, reply } => match authority.despawn(object_id) {
            Ok(out) => {
                let _ = reply.send(Ok(()));
                vec![out]
            }
            Err(e) => {
                let _ = reply.send(Err(e));
                Vec::new()
            }
        },
    }
}
