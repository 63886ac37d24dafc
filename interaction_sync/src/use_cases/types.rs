// Use-case level inputs/outputs for interactables and the host session.

use crate::domain::{Envelope, InteractionKind, ObjectId, ParticipantId};

/// Interaction-layer source of a select; sockets are non-exclusive placements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractorKind {
    Direct,
    Ray,
    Socket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InteractorRef {
    pub id: u32,
    pub kind: InteractorKind,
}

impl InteractorRef {
    pub const fn new(id: u32, kind: InteractorKind) -> Self {
        Self { id, kind }
    }
}

/// Ownership state of one object from the local participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolPhase {
    NotOwner,
    RequestingOwnership,
    Owner,
    /// Owner with the relinquish-to-host timer running.
    OwnerReleasing,
}

/// Outward notifications for visuals/affordance code on a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractableEvent {
    InteractingChanged(bool),
    /// Hover/select/activate, raised immediately for local input and on relay
    /// for everyone else's.
    Interaction {
        kind: InteractionKind,
        state: bool,
        participant: ParticipantId,
        remote: bool,
    },
    /// Ownership moved away while a local interactor was still selecting.
    SelectionCancelled,
    OwnershipGained,
    OwnershipLost,
    RequestTimedOut,
}

/// Interaction messages as seen by the host, before relaying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInteractionEvent {
    pub object_id: ObjectId,
    pub kind: InteractionKind,
    pub state: bool,
    pub participant: ParticipantId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Participant(ParticipantId),
}

impl Recipient {
    pub fn includes(self, participant: ParticipantId) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Participant(id) => id == participant,
        }
    }
}

/// An envelope produced by the host, addressed to one or every participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub recipient: Recipient,
    pub envelope: Envelope,
}
