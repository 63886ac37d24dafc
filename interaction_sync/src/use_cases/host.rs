// Host-side authority: the single place where ownership changes are decided.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::domain::errors::HostError;
use crate::domain::{
    Delivery, Envelope, FieldKind, InteractionKind, NetMessage, ObjectId, ObjectSnapshot,
    ParticipantId,
};
use crate::use_cases::types::{Outbound, Recipient, ServerInteractionEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
struct HostObject {
    kind: String,
    owner: ParticipantId,
    epoch: u64,
    is_interacting: bool,
    locked_on_spawn: bool,
    resetting: bool,
}

impl HostObject {
    fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            kind: self.kind.clone(),
            owner: self.owner,
            epoch: self.epoch,
            is_interacting: self.is_interacting,
            locked_on_spawn: self.locked_on_spawn,
            resetting: self.resetting,
        }
    }

    fn field_mut(&mut self, field: FieldKind) -> &mut bool {
        match field {
            FieldKind::IsInteracting => &mut self.is_interacting,
            FieldKind::LockedOnSpawn => &mut self.locked_on_spawn,
            FieldKind::Resetting => &mut self.resetting,
        }
    }
}

/// Authoritative view of every spawned interactable and the session roster.
///
/// All ownership changes funnel through here, one envelope at a time, so each
/// object sees a total order of owners. Each change bumps the object's epoch.
#[derive(Debug)]
pub struct HostAuthority {
    host_id: ParticipantId,
    participants: BTreeSet<ParticipantId>,
    objects: BTreeMap<ObjectId, HostObject>,
    next_object_id: ObjectId,
    server_events: Vec<ServerInteractionEvent>,
}

impl HostAuthority {
    pub fn new(host_id: ParticipantId) -> Self {
        Self {
            host_id,
            participants: BTreeSet::new(),
            objects: BTreeMap::new(),
            next_object_id: 1,
            server_events: Vec::new(),
        }
    }

    pub fn host_id(&self) -> ParticipantId {
        self.host_id
    }

    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants.iter().copied()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn snapshot(&self, object_id: ObjectId) -> Option<ObjectSnapshot> {
        self.objects.get(&object_id).map(HostObject::snapshot)
    }

    /// Interaction messages seen by the host since the last drain.
    pub fn drain_server_events(&mut self) -> Vec<ServerInteractionEvent> {
        std::mem::take(&mut self.server_events)
    }

    /// Registers a participant and returns the spawn snapshot it needs.
    pub fn join(&mut self, participant: ParticipantId) -> Result<Vec<Outbound>, HostError> {
        if participant == self.host_id || !self.participants.insert(participant) {
            return Err(HostError::AlreadyJoined(participant));
        }

        info!(participant, objects = self.objects.len(), "participant joined");
        let recipient = Recipient::Participant(participant);
        Ok(self
            .objects
            .iter()
            .map(|(id, object)| Outbound {
                recipient,
                envelope: self.from_host(*id, NetMessage::Spawned(object.snapshot())),
            })
            .collect())
    }

    /// Removes a participant; every object it owned goes back to the host.
    pub fn leave(&mut self, participant: ParticipantId) -> Result<Vec<Outbound>, HostError> {
        if !self.participants.remove(&participant) {
            return Err(HostError::UnknownParticipant(participant));
        }

        let orphaned: Vec<ObjectId> = self
            .objects
            .iter()
            .filter(|(_, object)| object.owner == participant)
            .map(|(id, _)| *id)
            .collect();

        let mut out = Vec::new();
        for object_id in orphaned {
            out.extend(self.transfer(object_id, self.host_id));
            for field in [FieldKind::IsInteracting, FieldKind::Resetting] {
                out.extend(self.host_write(object_id, field, false));
            }
        }

        info!(participant, updates = out.len(), "participant left");
        Ok(out)
    }

    pub fn spawn(&mut self, kind: impl Into<String>, spawn_locked: bool) -> (ObjectId, Outbound) {
        let object_id = self.next_object_id;
        self.next_object_id += 1;

        let object = HostObject {
            kind: kind.into(),
            owner: self.host_id,
            epoch: 0,
            is_interacting: false,
            locked_on_spawn: spawn_locked,
            resetting: false,
        };
        let message = NetMessage::Spawned(object.snapshot());
        info!(object_id, kind = %object.kind, spawn_locked, "object spawned");
        self.objects.insert(object_id, object);

        (object_id, self.broadcast(object_id, message))
    }

    pub fn despawn(&mut self, object_id: ObjectId) -> Result<Outbound, HostError> {
        if self.objects.remove(&object_id).is_none() {
            return Err(HostError::UnknownObject(object_id));
        }

        info!(object_id, "object despawned");
        Ok(self.broadcast(object_id, NetMessage::Despawned))
    }

    /// Applies one envelope from a participant and returns what must be relayed.
    pub fn handle(
        &mut self,
        from: ParticipantId,
        envelope: Envelope,
    ) -> Result<Vec<Outbound>, HostError> {
        if !self.participants.contains(&from) {
            return Err(HostError::UnknownParticipant(from));
        }
        let object_id = envelope.object_id;
        let Some(object) = self.objects.get(&object_id) else {
            return Err(HostError::UnknownObject(object_id));
        };
        let (owner, current) = (object.owner, object.epoch);

        if envelope.delivery == Delivery::All {
            debug!(from, object_id, "participant envelope addressed to all, handled by host");
        }

        match envelope.message {
            NetMessage::RequestOwnership { requester, epoch } => {
                if requester != from {
                    return Err(HostError::Unsupported("ownership requested for another participant"));
                }
                if epoch != current {
                    debug!(from, object_id, epoch, current, "stale ownership request dropped");
                    return Err(HostError::StaleRequest {
                        object_id,
                        epoch,
                        current,
                    });
                }
                if owner == from {
                    return Ok(Vec::new());
                }
                Ok(self.transfer(object_id, from).into_iter().collect())
            }
            NetMessage::ReturnToHost => {
                if owner != from {
                    return Err(HostError::NotOwner {
                        object_id,
                        participant: from,
                    });
                }
                Ok(self.transfer(object_id, self.host_id).into_iter().collect())
            }
            NetMessage::FieldWrite { field, value } => {
                if owner != from {
                    warn!(from, object_id, ?field, value, "field write from non-owner dropped");
                    return Err(HostError::NotOwner {
                        object_id,
                        participant: from,
                    });
                }
                Ok(self.apply_field(object_id, field, value, from).into_iter().collect())
            }
            NetMessage::Interaction { kind, state, .. } => {
                Ok(self.relay_interaction(object_id, from, kind, state))
            }
            NetMessage::OwnershipChanged { .. } => {
                Err(HostError::Unsupported("ownership changes are issued by the host"))
            }
            NetMessage::FieldUpdate { .. } => {
                Err(HostError::Unsupported("field updates are issued by the host"))
            }
            NetMessage::Spawned(_) | NetMessage::Despawned => {
                Err(HostError::Unsupported("spawning is controlled by the host"))
            }
        }
    }

    fn relay_interaction(
        &mut self,
        object_id: ObjectId,
        from: ParticipantId,
        kind: InteractionKind,
        state: bool,
    ) -> Vec<Outbound> {
        self.server_events.push(ServerInteractionEvent {
            object_id,
            kind,
            state,
            participant: from,
        });

        let mut out = Vec::new();
        // A non-owner's grab is an immediate pick-up, granted unconditionally.
        let is_owner = self
            .objects
            .get(&object_id)
            .is_some_and(|object| object.owner == from);
        if kind == InteractionKind::Select && state && !is_owner {
            out.extend(self.transfer(object_id, from));
        }

        out.push(self.broadcast(
            object_id,
            NetMessage::Interaction {
                kind,
                state,
                participant: from,
            },
        ));
        out
    }

    fn transfer(&mut self, object_id: ObjectId, owner: ParticipantId) -> Option<Outbound> {
        let object = self.objects.get_mut(&object_id)?;
        let previous = object.owner;
        object.owner = owner;
        object.epoch += 1;
        let epoch = object.epoch;

        info!(object_id, previous, owner, epoch, "ownership transferred");
        Some(self.broadcast(object_id, NetMessage::OwnershipChanged { owner, epoch }))
    }

    fn host_write(&mut self, object_id: ObjectId, field: FieldKind, value: bool) -> Option<Outbound> {
        self.apply_field(object_id, field, value, self.host_id)
    }

    fn apply_field(
        &mut self,
        object_id: ObjectId,
        field: FieldKind,
        value: bool,
        writer: ParticipantId,
    ) -> Option<Outbound> {
        let object = self.objects.get_mut(&object_id)?;
        let slot = object.field_mut(field);
        if *slot == value {
            return None;
        }
        *slot = value;

        Some(self.broadcast(
            object_id,
            NetMessage::FieldUpdate {
                field,
                value,
                writer,
            },
        ))
    }

    fn from_host(&self, object_id: ObjectId, message: NetMessage) -> Envelope {
        Envelope::to_all(self.host_id, object_id, message)
    }

    fn broadcast(&self, object_id: ObjectId, message: NetMessage) -> Outbound {
        Outbound {
            recipient: Recipient::All,
            envelope: self.from_host(object_id, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: ParticipantId = 0;
    const A: ParticipantId = 1;
    const B: ParticipantId = 2;

    fn authority_with_object() -> (HostAuthority, ObjectId) {
        let mut host = HostAuthority::new(HOST);
        host.join(A).expect("join a");
        host.join(B).expect("join b");
        let (id, _) = host.spawn("crate", false);
        (host, id)
    }

    fn request(from: ParticipantId, object_id: ObjectId, epoch: u64) -> Envelope {
        Envelope::to_server(
            from,
            object_id,
            NetMessage::RequestOwnership {
                requester: from,
                epoch,
            },
        )
    }

    fn messages(out: &[Outbound]) -> Vec<NetMessage> {
        out.iter().map(|o| o.envelope.message.clone()).collect()
    }

    #[test]
    fn when_participant_joins_then_it_receives_a_snapshot_of_live_objects() {
        let mut host = HostAuthority::new(HOST);
        let (id, _) = host.spawn("crate", true);

        let out = host.join(A).expect("join");

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient, Recipient::Participant(A));
        assert_eq!(out[0].envelope.object_id, id);
        assert!(matches!(
            &out[0].envelope.message,
            NetMessage::Spawned(snapshot) if snapshot.owner == HOST && snapshot.locked_on_spawn
        ));
        assert_eq!(host.join(A), Err(HostError::AlreadyJoined(A)));
    }

    #[test]
    fn when_two_requests_carry_the_same_epoch_then_only_the_first_is_granted() {
        let (mut host, id) = authority_with_object();

        let first = host.handle(A, request(A, id, 0)).expect("granted");
        let second = host.handle(B, request(B, id, 0));

        assert_eq!(
            messages(&first),
            vec![NetMessage::OwnershipChanged { owner: A, epoch: 1 }]
        );
        assert_eq!(
            second,
            Err(HostError::StaleRequest {
                object_id: id,
                epoch: 0,
                current: 1
            })
        );
        assert_eq!(host.snapshot(id).map(|s| s.owner), Some(A));
    }

    #[test]
    fn when_owner_requests_again_then_nothing_changes() {
        let (mut host, id) = authority_with_object();
        host.handle(A, request(A, id, 0)).expect("granted");

        let out = host.handle(A, request(A, id, 1)).expect("no-op");

        assert!(out.is_empty());
        assert_eq!(host.snapshot(id).map(|s| s.epoch), Some(1));
    }

    #[test]
    fn when_non_owner_writes_a_field_then_it_is_dropped() {
        let (mut host, id) = authority_with_object();
        host.handle(A, request(A, id, 0)).expect("granted");

        let write = |from| {
            Envelope::to_server(
                from,
                id,
                NetMessage::FieldWrite {
                    field: FieldKind::IsInteracting,
                    value: true,
                },
            )
        };

        assert_eq!(
            host.handle(B, write(B)),
            Err(HostError::NotOwner {
                object_id: id,
                participant: B
            })
        );
        let out = host.handle(A, write(A)).expect("owner write");
        assert_eq!(
            messages(&out),
            vec![NetMessage::FieldUpdate {
                field: FieldKind::IsInteracting,
                value: true,
                writer: A
            }]
        );
        assert_eq!(host.snapshot(id).map(|s| s.is_interacting), Some(true));
    }

    #[test]
    fn when_non_owner_selects_then_ownership_moves_before_the_relay() {
        let (mut host, id) = authority_with_object();

        let out = host
            .handle(
                B,
                Envelope::to_server(
                    B,
                    id,
                    NetMessage::Interaction {
                        kind: InteractionKind::Select,
                        state: true,
                        participant: B,
                    },
                ),
            )
            .expect("relayed");

        assert_eq!(
            messages(&out),
            vec![
                NetMessage::OwnershipChanged { owner: B, epoch: 1 },
                NetMessage::Interaction {
                    kind: InteractionKind::Select,
                    state: true,
                    participant: B
                },
            ]
        );
        assert!(out.iter().all(|o| o.envelope.sender == HOST));
        assert_eq!(
            host.drain_server_events(),
            vec![ServerInteractionEvent {
                object_id: id,
                kind: InteractionKind::Select,
                state: true,
                participant: B
            }]
        );
    }

    #[test]
    fn when_hover_is_relayed_then_ownership_is_untouched() {
        let (mut host, id) = authority_with_object();

        let out = host
            .handle(
                A,
                Envelope::to_server(
                    A,
                    id,
                    NetMessage::Interaction {
                        kind: InteractionKind::Hover,
                        state: true,
                        participant: A,
                    },
                ),
            )
            .expect("relayed");

        assert_eq!(out.len(), 1);
        assert_eq!(host.snapshot(id).map(|s| s.owner), Some(HOST));
    }

    #[test]
    fn when_owner_returns_object_then_host_owns_it_again() {
        let (mut host, id) = authority_with_object();
        host.handle(A, request(A, id, 0)).expect("granted");

        assert!(matches!(
            host.handle(B, Envelope::to_server(B, id, NetMessage::ReturnToHost)),
            Err(HostError::NotOwner { .. })
        ));
        let out = host
            .handle(A, Envelope::to_server(A, id, NetMessage::ReturnToHost))
            .expect("returned");

        assert_eq!(
            messages(&out),
            vec![NetMessage::OwnershipChanged {
                owner: HOST,
                epoch: 2
            }]
        );
    }

    #[test]
    fn when_owner_leaves_then_objects_return_to_host_and_flags_clear() {
        let (mut host, id) = authority_with_object();
        host.handle(A, request(A, id, 0)).expect("granted");
        host.handle(
            A,
            Envelope::to_server(
                A,
                id,
                NetMessage::FieldWrite {
                    field: FieldKind::IsInteracting,
                    value: true,
                },
            ),
        )
        .expect("owner write");

        let out = host.leave(A).expect("leave");

        assert_eq!(
            messages(&out),
            vec![
                NetMessage::OwnershipChanged {
                    owner: HOST,
                    epoch: 2
                },
                NetMessage::FieldUpdate {
                    field: FieldKind::IsInteracting,
                    value: false,
                    writer: HOST
                },
            ]
        );
        assert_eq!(host.leave(A), Err(HostError::UnknownParticipant(A)));
        assert!(matches!(
            host.handle(A, request(A, id, 2)),
            Err(HostError::UnknownParticipant(A))
        ));
    }

    #[test]
    fn when_participant_forges_host_messages_then_they_are_rejected() {
        let (mut host, id) = authority_with_object();

        let forged = Envelope::to_all(A, id, NetMessage::OwnershipChanged { owner: A, epoch: 9 });

        assert!(matches!(host.handle(A, forged), Err(HostError::Unsupported(_))));
        assert_eq!(host.snapshot(id).map(|s| s.owner), Some(HOST));
    }

    #[test]
    fn when_object_is_despawned_then_later_messages_are_rejected() {
        let (mut host, id) = authority_with_object();

        let out = host.despawn(id).expect("despawn");

        assert_eq!(out.envelope.message, NetMessage::Despawned);
        assert_eq!(host.despawn(id), Err(HostError::UnknownObject(id)));
        assert_eq!(
            host.handle(A, request(A, id, 0)),
            Err(HostError::UnknownObject(id))
        );
    }
}
