// Wire protocol DTOs and conversions for relay messages.
// Both the relay server and the relay client speak these, so every DTO
// serializes and deserializes.

use crate::domain::{
    Delivery, Envelope, FieldKind, InteractionKind, NetMessage, ObjectSnapshot,
};
use serde::{Deserialize, Serialize};

/// Messages the relay sends to connected participants over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Assigned identity for the connection after Join is accepted.
    Identity { participant_id: u64, host_id: u64 },
    // Host-relayed replication traffic.
    Envelope(EnvelopeDto),
    // Reply to a client Ping, used for RTT measurement.
    Pong { nonce: u64 },
}

/// Messages a participant sends to the relay over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Initial handshake message.
    Join(JoinPayload),
    // Replication traffic addressed to the host.
    Envelope(EnvelopeDto),
    Ping { nonce: u64 },
}

/// Payload for the Join handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPayload {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryDto {
    Server,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKindDto {
    Hover,
    Select,
    Activate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKindDto {
    IsInteracting,
    LockedOnSpawn,
    Resetting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSnapshotDto {
    pub kind: String,
    pub owner: u64,
    pub epoch: u64,
    pub is_interacting: bool,
    pub locked_on_spawn: bool,
    #[serde(default)]
    pub resetting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NetMessageDto {
    RequestOwnership {
        requester: u64,
        epoch: u64,
    },
    ReturnToHost,
    Interaction {
        interaction: InteractionKindDto,
        state: bool,
        participant: u64,
    },
    FieldWrite {
        field: FieldKindDto,
        value: bool,
    },
    OwnershipChanged {
        owner: u64,
        epoch: u64,
    },
    FieldUpdate {
        field: FieldKindDto,
        value: bool,
        writer: u64,
    },
    Spawned(ObjectSnapshotDto),
    Despawned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeDto {
    pub delivery: DeliveryDto,
    pub sender: u64,
    pub object_id: u64,
    pub message: NetMessageDto,
}

impl From<Delivery> for DeliveryDto {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Server => Self::Server,
            Delivery::All => Self::All,
        }
    }
}

impl From<DeliveryDto> for Delivery {
    fn from(delivery: DeliveryDto) -> Self {
        match delivery {
            DeliveryDto::Server => Self::Server,
            DeliveryDto::All => Self::All,
        }
    }
}

impl From<InteractionKind> for InteractionKindDto {
    fn from(kind: InteractionKind) -> Self {
        match kind {
            InteractionKind::Hover => Self::Hover,
            InteractionKind::Select => Self::Select,
            InteractionKind::Activate => Self::Activate,
        }
    }
}

impl From<InteractionKindDto> for InteractionKind {
    fn from(kind: InteractionKindDto) -> Self {
        match kind {
            InteractionKindDto::Hover => Self::Hover,
            InteractionKindDto::Select => Self::Select,
            InteractionKindDto::Activate => Self::Activate,
        }
    }
}

impl From<FieldKind> for FieldKindDto {
    fn from(field: FieldKind) -> Self {
        match field {
            FieldKind::IsInteracting => Self::IsInteracting,
            FieldKind::LockedOnSpawn => Self::LockedOnSpawn,
            FieldKind::Resetting => Self::Resetting,
        }
    }
}

impl From<FieldKindDto> for FieldKind {
    fn from(field: FieldKindDto) -> Self {
        match field {
            FieldKindDto::IsInteracting => Self::IsInteracting,
            FieldKindDto::LockedOnSpawn => Self::LockedOnSpawn,
            FieldKindDto::Resetting => Self::Resetting,
        }
    }
}

impl From<ObjectSnapshot> for ObjectSnapshotDto {
    fn from(snapshot: ObjectSnapshot) -> Self {
        Self {
            kind: snapshot.kind,
            owner: snapshot.owner,
            epoch: snapshot.epoch,
            is_interacting: snapshot.is_interacting,
            locked_on_spawn: snapshot.locked_on_spawn,
            resetting: snapshot.resetting,
        }
    }
}

impl From<ObjectSnapshotDto> for ObjectSnapshot {
    fn from(snapshot: ObjectSnapshotDto) -> Self {
        Self {
            kind: snapshot.kind,
            owner: snapshot.owner,
            epoch: snapshot.epoch,
            is_interacting: snapshot.is_interacting,
            locked_on_spawn: snapshot.locked_on_spawn,
            resetting: snapshot.resetting,
        }
    }
}

impl From<NetMessage> for NetMessageDto {
    fn from(message: NetMessage) -> Self {
        match message {
            NetMessage::RequestOwnership { requester, epoch } => {
                Self::RequestOwnership { requester, epoch }
            }
            NetMessage::ReturnToHost => Self::ReturnToHost,
            NetMessage::Interaction {
                kind,
                state,
                participant,
            } => Self::Interaction {
                interaction: kind.into(),
                state,
                participant,
            },
            NetMessage::FieldWrite { field, value } => Self::FieldWrite {
                field: field.into(),
                value,
            },
            NetMessage::OwnershipChanged { owner, epoch } => Self::OwnershipChanged { owner, epoch },
            NetMessage::FieldUpdate {
                field,
                value,
                writer,
            } => Self::FieldUpdate {
                field: field.into(),
                value,
                writer,
            },
            NetMessage::Spawned(snapshot) => Self::Spawned(snapshot.into()),
            NetMessage::Despawned => Self::Despawned,
        }
    }
}

impl From<NetMessageDto> for NetMessage {
    fn from(message: NetMessageDto) -> Self {
        match message {
            NetMessageDto::RequestOwnership { requester, epoch } => {
                Self::RequestOwnership { requester, epoch }
            }
            NetMessageDto::ReturnToHost => Self::ReturnToHost,
            NetMessageDto::Interaction {
                interaction,
                state,
                participant,
            } => Self::Interaction {
                kind: interaction.into(),
                state,
                participant,
            },
            NetMessageDto::FieldWrite { field, value } => Self::FieldWrite {
                field: field.into(),
                value,
            },
            NetMessageDto::OwnershipChanged { owner, epoch } => {
                Self::OwnershipChanged { owner, epoch }
            }
            NetMessageDto::FieldUpdate {
                field,
                value,
                writer,
            } => Self::FieldUpdate {
                field: field.into(),
                value,
                writer,
            },
            NetMessageDto::Spawned(snapshot) => Self::Spawned(snapshot.into()),
            NetMessageDto::Despawned => Self::Despawned,
        }
    }
}

impl From<Envelope> for EnvelopeDto {
    fn from(envelope: Envelope) -> Self {
        Self {
            delivery: envelope.delivery.into(),
            sender: envelope.sender,
            object_id: envelope.object_id,
            message: envelope.message.into(),
        }
    }
}

impl From<EnvelopeDto> for Envelope {
    fn from(envelope: EnvelopeDto) -> Self {
        Self {
            delivery: envelope.delivery.into(),
            sender: envelope.sender,
            object_id: envelope.object_id,
            message: envelope.message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn when_envelope_is_serialized_then_message_kind_is_tagged() {
        let dto = ServerMessage::Envelope(EnvelopeDto::from(Envelope::to_all(
            0,
            3,
            NetMessage::OwnershipChanged { owner: 7, epoch: 2 },
        )));

        let value = serde_json::to_value(&dto).expect("serializes");

        assert_eq!(
            value,
            json!({
                "type": "Envelope",
                "data": {
                    "delivery": "all",
                    "sender": 0,
                    "object_id": 3,
                    "message": { "op": "ownership_changed", "owner": 7, "epoch": 2 }
                }
            })
        );
    }

    #[test]
    fn when_client_sends_field_write_then_it_maps_to_the_domain_message() {
        let text = r#"{"type":"Envelope","data":{"delivery":"server","sender":4,"object_id":1,
            "message":{"op":"field_write","field":"locked_on_spawn","value":false}}}"#;

        let Ok(ClientMessage::Envelope(dto)) = serde_json::from_str::<ClientMessage>(text) else {
            panic!("expected an envelope");
        };
        let envelope = Envelope::from(dto);

        assert_eq!(
            envelope,
            Envelope::to_server(
                4,
                1,
                NetMessage::FieldWrite {
                    field: FieldKind::LockedOnSpawn,
                    value: false
                }
            )
        );
    }

    #[test]
    fn when_spawn_snapshot_omits_resetting_then_it_defaults_to_false() {
        let text = r#"{"op":"spawned","kind":"crate","owner":0,"epoch":3,
            "is_interacting":false,"locked_on_spawn":true}"#;

        let message = NetMessage::from(
            serde_json::from_str::<NetMessageDto>(text).expect("parses"),
        );

        assert_eq!(
            message,
            NetMessage::Spawned(ObjectSnapshot {
                kind: "crate".to_string(),
                owner: 0,
                epoch: 3,
                is_interacting: false,
                locked_on_spawn: true,
                resetting: false,
            })
        );
    }

    #[test]
    fn when_join_has_no_display_name_then_it_defaults_to_empty() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"Join","data":{}}"#).expect("parses");

        assert_eq!(
            parsed,
            ClientMessage::Join(JoinPayload {
                display_name: String::new()
            })
        );
    }
}
