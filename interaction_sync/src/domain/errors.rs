// Domain-level errors for replication, object construction and host arbitration.

use crate::domain::replicated::Authority;
use crate::domain::state::{ObjectId, ParticipantId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationError {
    /// The writer does not hold the field's authority role.
    NotAuthorized {
        field: &'static str,
        authority: Authority,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractableError {
    /// A required collaborator (physics body) was not supplied for the instance.
    MissingComponent(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    UnknownParticipant(ParticipantId),
    AlreadyJoined(ParticipantId),
    UnknownObject(ObjectId),
    /// An owner-only operation arrived from someone else.
    NotOwner {
        object_id: ObjectId,
        participant: ParticipantId,
    },
    /// The request referred to an ownership epoch that has already changed.
    StaleRequest {
        object_id: ObjectId,
        epoch: u64,
        current: u64,
    },
    /// Messages that only the host may originate.
    Unsupported(&'static str),
}
