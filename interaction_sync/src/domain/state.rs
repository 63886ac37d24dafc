// Per-object replicated ownership state.

use crate::domain::replicated::{Authority, ReplicatedField};

pub type ParticipantId = u64;
pub type ObjectId = u64;

/// Authoritative owner assignment plus the epoch the host stamped on it.
///
/// The epoch increments on every ownership change, so a request carrying an
/// older epoch refers to an assignment that has already been superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub owner: ParticipantId,
    pub epoch: u64,
}

#[derive(Debug)]
pub struct OwnershipState {
    /// Written by the host only.
    pub ownership: ReplicatedField<Ownership>,
    /// Written by the current owner only.
    pub is_interacting: ReplicatedField<bool>,
    pub locked_on_spawn: ReplicatedField<bool>,
    pub resetting: ReplicatedField<bool>,
}

impl OwnershipState {
    pub fn new(owner: ParticipantId) -> Self {
        Self {
            ownership: ReplicatedField::new(
                "owner",
                Ownership { owner, epoch: 0 },
                Authority::Server,
            ),
            is_interacting: ReplicatedField::new("is_interacting", false, Authority::Owner),
            locked_on_spawn: ReplicatedField::new("locked_on_spawn", false, Authority::Owner),
            resetting: ReplicatedField::new("resetting", false, Authority::Owner),
        }
    }

    pub fn owner(&self) -> ParticipantId {
        self.ownership.get().owner
    }

    pub fn epoch(&self) -> u64 {
        self.ownership.get().epoch
    }

    pub fn is_owned_by(&self, participant: ParticipantId) -> bool {
        self.owner() == participant
    }

    pub fn is_interacting(&self) -> bool {
        *self.is_interacting.get()
    }

    pub fn locked_on_spawn(&self) -> bool {
        *self.locked_on_spawn.get()
    }

    pub fn resetting(&self) -> bool {
        *self.resetting.get()
    }
}
