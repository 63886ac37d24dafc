// Message envelopes exchanged between participants and the host.

use crate::domain::state::{ObjectId, ParticipantId};

/// Addressing mode of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handled by the host only.
    Server,
    /// Relayed to every participant.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Hover,
    Select,
    Activate,
}

/// Owner-write boolean fields carried by `FieldWrite`/`FieldUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    IsInteracting,
    LockedOnSpawn,
    Resetting,
}

/// Full replicated state of an object, sent on spawn and to late joiners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSnapshot {
    pub kind: String,
    pub owner: ParticipantId,
    pub epoch: u64,
    pub is_interacting: bool,
    pub locked_on_spawn: bool,
    pub resetting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetMessage {
    /// Participant -> host: hand ownership to `requester` if `epoch` is still current.
    RequestOwnership {
        requester: ParticipantId,
        epoch: u64,
    },
    /// Participant -> host: the idle owner gives the object back to the host.
    ReturnToHost,
    /// Hover/select/activate state from `participant`; the host relays it to all.
    Interaction {
        kind: InteractionKind,
        state: bool,
        participant: ParticipantId,
    },
    /// Owner -> host: write of an owner-authority field.
    FieldWrite { field: FieldKind, value: bool },
    /// Host -> all: the authoritative owner assignment changed.
    OwnershipChanged { owner: ParticipantId, epoch: u64 },
    /// Host -> all: an owner-authority field changed, written by `writer`.
    FieldUpdate {
        field: FieldKind,
        value: bool,
        writer: ParticipantId,
    },
    Spawned(ObjectSnapshot),
    Despawned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub delivery: Delivery,
    pub sender: ParticipantId,
    pub object_id: ObjectId,
    pub message: NetMessage,
}

impl Envelope {
    pub fn to_server(sender: ParticipantId, object_id: ObjectId, message: NetMessage) -> Self {
        Self {
            delivery: Delivery::Server,
            sender,
            object_id,
            message,
        }
    }

    pub fn to_all(sender: ParticipantId, object_id: ObjectId, message: NetMessage) -> Self {
        Self {
            delivery: Delivery::All,
            sender,
            object_id,
            message,
        }
    }
}
