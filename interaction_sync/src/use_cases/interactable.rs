// Participant-side ownership protocol for one networked interactable.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::errors::InteractableError;
use crate::domain::ports::{BodyConstraints, ParticipantDirectory, PhysicsBody, Transport};
use crate::domain::replicated::{Change, ReplicatedField, WriteContext};
use crate::domain::tuning::{InteractableConfig, MovementType, ownership_request_timeout};
use crate::domain::{
    Envelope, FieldKind, InteractionKind, NetMessage, ObjectId, ObjectSnapshot, Ownership,
    OwnershipState, ParticipantId, Pose, SimTime, TimerSet, Vec3, VelocityEstimator,
};
use crate::use_cases::reset::PendingReset;
use crate::use_cases::types::{InteractableEvent, InteractorKind, InteractorRef, ProtocolPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum TimerKind {
    OwnershipTimeout,
    Relinquish,
    InteractionCheck,
}

/// One spawned interactable as seen by the local participant.
///
/// Entry points mirror the host environment's lifecycle: spawn/despawn, local
/// hover/select/activate input, inbound envelopes from the host, contacts (via
/// the registry) and a per-step `tick`. Timers armed from entry points use the
/// time of the most recent tick.
pub struct NetworkInteractable {
    id: ObjectId,
    kind: String,
    config: InteractableConfig,
    state: OwnershipState,
    body: Box<dyn PhysicsBody>,
    directory: Arc<dyn ParticipantDirectory>,
    transport: Arc<dyn Transport>,
    velocity: VelocityEstimator,
    timers: TimerSet<TimerKind>,
    original_pose: Pose,
    original_scale: Vec3,
    spawned: bool,
    requesting: bool,
    // Whether inbound transform replication drives the body.
    replication_enabled: bool,
    // Set once `locked_on_spawn` has been cleared; it never locks again.
    lock_released: bool,
    selecting: Vec<InteractorRef>,
    pending_reset: Option<PendingReset>,
    now: SimTime,
    step: u64,
    events: Vec<InteractableEvent>,
}

impl NetworkInteractable {
    /// Captures the original pose and scale from the body.
    pub fn new(
        id: ObjectId,
        kind: impl Into<String>,
        config: InteractableConfig,
        body: Option<Box<dyn PhysicsBody>>,
        directory: Arc<dyn ParticipantDirectory>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, InteractableError> {
        let Some(body) = body else {
            return Err(InteractableError::MissingComponent("physics body"));
        };

        Ok(Self {
            id,
            kind: kind.into(),
            state: OwnershipState::new(directory.host_id()),
            velocity: VelocityEstimator::new(config.velocity_frames),
            original_pose: body.pose(),
            original_scale: body.scale(),
            config,
            body,
            directory,
            transport,
            timers: TimerSet::new(),
            spawned: false,
            requesting: false,
            replication_enabled: false,
            lock_released: false,
            selecting: Vec::new(),
            pending_reset: None,
            now: SimTime::ZERO,
            step: 0,
            events: Vec::new(),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn config(&self) -> &InteractableConfig {
        &self.config
    }

    pub fn owner(&self) -> ParticipantId {
        self.state.owner()
    }

    pub fn epoch(&self) -> u64 {
        self.state.epoch()
    }

    pub fn is_owner(&self) -> bool {
        self.state.is_owned_by(self.directory.local_id())
    }

    pub fn is_interacting(&self) -> bool {
        self.state.is_interacting()
    }

    pub fn locked_on_spawn(&self) -> bool {
        self.state.locked_on_spawn()
    }

    pub fn resetting(&self) -> bool {
        self.state.resetting()
    }

    pub fn is_requesting(&self) -> bool {
        self.requesting
    }

    pub fn is_spawned(&self) -> bool {
        self.spawned
    }

    pub fn is_selected(&self) -> bool {
        !self.selecting.is_empty()
    }

    pub fn replication_enabled(&self) -> bool {
        self.replication_enabled
    }

    pub fn average_velocity(&self) -> Vec3 {
        self.velocity.average()
    }

    /// Current body speed, as reported by the physics engine.
    pub fn speed(&self) -> f32 {
        self.body.velocity().magnitude()
    }

    pub fn original_pose(&self) -> Pose {
        self.original_pose
    }

    pub fn original_scale(&self) -> Vec3 {
        self.original_scale
    }

    pub fn phase(&self) -> ProtocolPhase {
        if self.is_owner() {
            if self.timers.is_scheduled(TimerKind::Relinquish) {
                ProtocolPhase::OwnerReleasing
            } else {
                ProtocolPhase::Owner
            }
        } else if self.requesting {
            ProtocolPhase::RequestingOwnership
        } else {
            ProtocolPhase::NotOwner
        }
    }

    /// Registers a callback for every replicated change of `is_interacting`.
    pub fn on_interacting_changed<F>(&mut self, mut observer: F)
    where
        F: FnMut(bool) + Send + 'static,
    {
        self.state
            .is_interacting
            .subscribe(move |_old: &bool, new: &bool| observer(*new));
    }

    pub fn drain_events(&mut self) -> Vec<InteractableEvent> {
        std::mem::take(&mut self.events)
    }

    /// Users other than the holder may only pick the object up when override is allowed.
    pub fn can_hold(&self) -> bool {
        !self.is_interacting() || self.config.allow_override_ownership
    }

    /// Hover/select filter for the host environment's interaction layer.
    pub fn accepts_interaction(&self) -> bool {
        self.is_owner() || self.config.allow_override_ownership || !self.is_interacting()
    }

    pub fn ownership_transfer_blocked(&self) -> bool {
        self.is_interacting()
            || self.is_owner()
            || self.requesting
            || self.locked_on_spawn()
            || !self.config.allow_collision_ownership_exchange
            || !self.spawned
            || self.is_selected()
            || self.resetting()
    }

    // ---- lifecycle ----

    pub fn on_network_spawn(&mut self, snapshot: &ObjectSnapshot) {
        self.spawned = true;
        self.state.ownership.restore(Ownership {
            owner: snapshot.owner,
            epoch: snapshot.epoch,
        });
        self.state.is_interacting.restore(snapshot.is_interacting);
        self.state.locked_on_spawn.restore(snapshot.locked_on_spawn);
        self.state.resetting.restore(snapshot.resetting);
        self.lock_released = self.config.spawn_locked && !snapshot.locked_on_spawn;
        if snapshot.resetting {
            self.velocity.pause();
        }

        if self.is_owner() {
            self.write_owned(FieldKind::IsInteracting, false);
            self.write_owned(FieldKind::LockedOnSpawn, self.config.spawn_locked);
        }
        self.apply_lock_constraints();
        self.replication_enabled = self.config.sync_select;

        if self.config.reset_object_on_disconnect {
            self.reset_object();
        }

        debug!(
            object_id = self.id,
            owner = snapshot.owner,
            epoch = snapshot.epoch,
            locked = self.locked_on_spawn(),
            "interactable spawned"
        );
    }

    pub fn on_network_despawn(&mut self) {
        if !self.spawned {
            return;
        }

        if self.is_owner() {
            self.write_owned(FieldKind::IsInteracting, false);
        }
        self.timers.clear();
        self.requesting = false;
        self.spawned = false;

        // The host has already dropped the object, so this reset stays local
        // and never writes the resetting flag.
        if self.config.reset_object_on_disconnect {
            self.restore_original_transform();
            if !self.body.is_kinematic() {
                self.reset_physics();
            }
        }
        // Nothing ticks a despawned object, so the reset step completes now.
        self.finish_pending_reset();

        debug!(object_id = self.id, "interactable despawned");
    }

    /// Advances one simulation step: completes a pending reset, samples the
    /// velocity estimator and fires due timers.
    pub fn tick(&mut self, now: SimTime, dt: f32) {
        self.now = now;
        self.step += 1;

        if self.pending_reset.is_some_and(|pending| pending.is_due(self.step)) {
            self.finish_pending_reset();
        }

        if self.spawned {
            self.velocity.sample(self.body.position(), dt);
        }

        while let Some(timer) = self.timers.pop_due(now) {
            self.fire(timer);
        }
    }

    // ---- ownership ----

    /// Optimistically takes control and asks the host for ownership.
    ///
    /// Returns false, with no state change, when any precondition fails.
    pub fn request_ownership(&mut self) -> bool {
        if self.ownership_transfer_blocked() {
            return false;
        }

        self.requesting = true;
        self.replication_enabled = false;
        if !self.body.is_kinematic() {
            self.body.set_velocity(self.velocity.average());
        }
        if self.config.movement_type != MovementType::Kinematic {
            self.body.set_kinematic(false);
        }

        self.relinquish_after_time();
        self.send_to_server(NetMessage::RequestOwnership {
            requester: self.directory.local_id(),
            epoch: self.state.epoch(),
        });

        let timeout = ownership_request_timeout(self.directory.rtt_to_host());
        self.timers
            .schedule(TimerKind::OwnershipTimeout, self.now + timeout);

        debug!(
            object_id = self.id,
            epoch = self.state.epoch(),
            timeout_ms = timeout.as_millis() as u64,
            "ownership requested"
        );
        true
    }

    /// Applies an envelope received from the host.
    pub fn handle_message(&mut self, sender: ParticipantId, message: &NetMessage) {
        match message {
            NetMessage::OwnershipChanged { owner, epoch } => {
                self.apply_ownership(sender, *owner, *epoch)
            }
            NetMessage::FieldUpdate {
                field,
                value,
                writer,
            } => self.apply_field_update(sender, *field, *value, *writer),
            NetMessage::Interaction {
                kind,
                state,
                participant,
            } => self.apply_remote_interaction(*kind, *state, *participant),
            NetMessage::Despawned => self.on_network_despawn(),
            NetMessage::Spawned(_) => {
                debug!(object_id = self.id, "duplicate spawn ignored");
            }
            NetMessage::RequestOwnership { .. }
            | NetMessage::ReturnToHost
            | NetMessage::FieldWrite { .. } => {
                debug!(object_id = self.id, "host-bound message ignored");
            }
        }
    }

    fn apply_ownership(&mut self, sender: ParticipantId, owner: ParticipantId, epoch: u64) {
        if sender != self.directory.host_id() {
            warn!(object_id = self.id, sender, "ownership change not sent by host");
            return;
        }
        if epoch < self.state.epoch() {
            debug!(
                object_id = self.id,
                epoch,
                current = self.state.epoch(),
                "stale ownership change ignored"
            );
            return;
        }

        let was_owner = self.is_owner();
        if let Err(error) = self
            .state
            .ownership
            .write(Ownership { owner, epoch }, WriteContext::SERVER)
        {
            warn!(object_id = self.id, ?error, "ownership change rejected");
            return;
        }

        match (was_owner, self.is_owner()) {
            (false, true) => self.on_gained_ownership(),
            (true, false) => self.on_lost_ownership(),
            _ => {}
        }
    }

    fn on_gained_ownership(&mut self) {
        self.requesting = false;
        self.timers.cancel(TimerKind::OwnershipTimeout);
        self.timers.cancel(TimerKind::Relinquish);
        self.timers.schedule(
            TimerKind::InteractionCheck,
            self.now + self.config.interaction_check_time(),
        );
        self.replication_enabled = true;

        self.write_owned(FieldKind::IsInteracting, self.is_selected());
        if !self.is_selected() {
            if !self.body.is_kinematic() {
                // Hand the momentum observed so far over to the local simulation.
                self.body.set_velocity(self.velocity.average());
            }
            self.relinquish_after_time();
        }

        info!(object_id = self.id, epoch = self.state.epoch(), "ownership gained");
        self.events.push(InteractableEvent::OwnershipGained);
    }

    fn on_lost_ownership(&mut self) {
        self.timers.cancel(TimerKind::OwnershipTimeout);
        self.timers.cancel(TimerKind::Relinquish);
        self.timers.cancel(TimerKind::InteractionCheck);
        self.requesting = false;
        self.replication_enabled = true;

        info!(
            object_id = self.id,
            owner = self.state.owner(),
            epoch = self.state.epoch(),
            "ownership lost"
        );
        self.events.push(InteractableEvent::OwnershipLost);

        if self.is_selected() {
            self.selecting.clear();
            self.events.push(InteractableEvent::SelectionCancelled);
            self.release_selection();
        }
    }

    fn relinquish_after_time(&mut self) {
        if !self.config.relinquish_ownership_after_time {
            return;
        }
        self.timers.schedule(
            TimerKind::Relinquish,
            self.now + self.config.relinquish_ownership_time(),
        );
    }

    fn fire(&mut self, timer: TimerKind) {
        match timer {
            TimerKind::OwnershipTimeout => self.on_request_timeout(),
            TimerKind::Relinquish => self.on_relinquish_due(),
            TimerKind::InteractionCheck => self.check_owner_interaction(),
        }
    }

    fn on_request_timeout(&mut self) {
        if !self.is_owner() {
            info!(object_id = self.id, "ownership request timed out");
            self.events.push(InteractableEvent::RequestTimedOut);
        }
        self.requesting = false;
        self.replication_enabled = true;
    }

    fn on_relinquish_due(&mut self) {
        if !self.is_owner() || self.directory.is_host() || self.is_selected() {
            return;
        }

        debug!(object_id = self.id, "returning idle object to host");
        self.send_to_server(NetMessage::ReturnToHost);
    }

    fn check_owner_interaction(&mut self) {
        if !self.is_owner() {
            return;
        }

        if self.is_interacting() && (!self.is_selected() || self.is_selected_by_socket()) {
            warn!(
                object_id = self.id,
                selected = self.is_selected(),
                "interacting flag set without an exclusive hold; clearing"
            );
            self.write_owned(FieldKind::IsInteracting, false);
        }

        self.timers.schedule(
            TimerKind::InteractionCheck,
            self.now + self.config.interaction_check_time(),
        );
    }

    fn is_selected_by_socket(&self) -> bool {
        if self.config.socket_selection_counts_as_hold {
            return false;
        }
        self.is_selected()
            && self
                .selecting
                .iter()
                .all(|interactor| interactor.kind == InteractorKind::Socket)
    }

    // ---- replicated fields ----

    fn field_mut(&mut self, field: FieldKind) -> &mut ReplicatedField<bool> {
        match field {
            FieldKind::IsInteracting => &mut self.state.is_interacting,
            FieldKind::LockedOnSpawn => &mut self.state.locked_on_spawn,
            FieldKind::Resetting => &mut self.state.resetting,
        }
    }

    /// Writes an owner-authority field locally and forwards it to the host.
    fn write_owned(&mut self, field: FieldKind, value: bool) {
        if !self.is_owner() {
            warn!(object_id = self.id, ?field, "owner-only write without ownership");
            return;
        }
        if field == FieldKind::LockedOnSpawn && value && self.lock_released {
            return;
        }

        match self.field_mut(field).write(value, WriteContext::OWNER) {
            Ok(Some(change)) => {
                self.send_to_server(NetMessage::FieldWrite { field, value });
                self.on_field_changed(field, change);
            }
            Ok(None) => {}
            Err(error) => warn!(object_id = self.id, ?error, "field write rejected"),
        }
    }

    fn apply_field_update(
        &mut self,
        sender: ParticipantId,
        field: FieldKind,
        value: bool,
        writer: ParticipantId,
    ) {
        let host = self.directory.host_id();
        if sender != host {
            warn!(object_id = self.id, sender, "field update not relayed by host");
            return;
        }
        // Own writes were applied when they were made.
        if writer == self.directory.local_id() {
            return;
        }
        if field == FieldKind::LockedOnSpawn && value && self.lock_released {
            debug!(object_id = self.id, writer, "re-lock ignored");
            return;
        }

        let ctx = WriteContext {
            is_owner: writer == self.state.owner(),
            is_server: writer == host,
        };
        match self.field_mut(field).write(value, ctx) {
            Ok(Some(change)) => self.on_field_changed(field, change),
            Ok(None) => {}
            Err(error) => {
                warn!(object_id = self.id, writer, ?error, "field update rejected")
            }
        }
    }

    fn on_field_changed(&mut self, field: FieldKind, change: Change<bool>) {
        match field {
            FieldKind::IsInteracting => {
                self.events
                    .push(InteractableEvent::InteractingChanged(change.new));
                if change.new && self.is_owner() {
                    self.timers.cancel(TimerKind::Relinquish);
                    if self.locked_on_spawn() {
                        self.write_owned(FieldKind::LockedOnSpawn, false);
                    }
                }
            }
            FieldKind::LockedOnSpawn => {
                if !change.new {
                    self.lock_released = true;
                }
                self.apply_lock_constraints();
            }
            FieldKind::Resetting => {
                if change.new {
                    self.velocity.pause();
                } else {
                    self.velocity.resume();
                }
            }
        }
    }

    fn apply_lock_constraints(&mut self) {
        let constraints = if self.locked_on_spawn() {
            BodyConstraints::FreezeAll
        } else {
            BodyConstraints::None
        };
        self.body.set_constraints(constraints);
    }

    // ---- local interaction input ----

    pub fn hover_entered(&mut self) {
        self.hover(true);
    }

    pub fn hover_exited(&mut self) {
        self.hover(false);
    }

    fn hover(&mut self, state: bool) {
        self.push_local_interaction(InteractionKind::Hover, state);
        if self.config.sync_hover {
            self.send_interaction(InteractionKind::Hover, state);
        }
    }

    pub fn select_entered(&mut self, interactor: InteractorRef) {
        if !self.selecting.contains(&interactor) {
            self.selecting.push(interactor);
        }
        if self.config.ignore_socket_selected_callback && interactor.kind == InteractorKind::Socket
        {
            return;
        }
        if !self.can_hold() {
            return;
        }

        self.push_local_interaction(InteractionKind::Select, true);
        if self.config.sync_select {
            self.send_interaction(InteractionKind::Select, true);
        }

        if self.is_owner() {
            self.write_owned(FieldKind::IsInteracting, true);
        } else {
            // Move immediately; the host transfers ownership on the relayed select.
            self.replication_enabled = false;
        }
    }

    pub fn select_exited(&mut self, interactor: InteractorRef) {
        self.selecting.retain(|selecting| *selecting != interactor);
        if self.config.ignore_socket_selected_callback && interactor.kind == InteractorKind::Socket
        {
            return;
        }
        // Still held by another interactor.
        if self.is_selected() {
            return;
        }
        // Select exits also fire while the object is being destroyed.
        if !self.spawned {
            return;
        }

        self.release_selection();
    }

    fn release_selection(&mut self) {
        self.push_local_interaction(InteractionKind::Select, false);
        if self.config.sync_select {
            self.send_interaction(InteractionKind::Select, false);
        }

        if !self.is_owner() {
            self.replication_enabled = true;
            return;
        }

        self.write_owned(FieldKind::IsInteracting, false);
        self.relinquish_after_time();
        if self.config.movement_type == MovementType::VelocityTracking
            || self.config.throw_on_detach
        {
            self.body.set_kinematic(false);
        }
    }

    pub fn activated(&mut self) {
        self.activate(true);
    }

    pub fn deactivated(&mut self) {
        self.activate(false);
    }

    fn activate(&mut self, state: bool) {
        if !self.is_owner() {
            return;
        }

        self.push_local_interaction(InteractionKind::Activate, state);
        if self.config.sync_activate {
            self.send_interaction(InteractionKind::Activate, state);
        }
    }

    fn apply_remote_interaction(
        &mut self,
        kind: InteractionKind,
        state: bool,
        participant: ParticipantId,
    ) {
        if participant == self.directory.local_id() {
            return;
        }
        self.events.push(InteractableEvent::Interaction {
            kind,
            state,
            participant,
            remote: true,
        });
    }

    fn push_local_interaction(&mut self, kind: InteractionKind, state: bool) {
        self.events.push(InteractableEvent::Interaction {
            kind,
            state,
            participant: self.directory.local_id(),
            remote: false,
        });
    }

    fn send_interaction(&self, kind: InteractionKind, state: bool) {
        self.send_to_server(NetMessage::Interaction {
            kind,
            state,
            participant: self.directory.local_id(),
        });
    }

    fn send_to_server(&self, message: NetMessage) {
        let envelope = Envelope::to_server(self.directory.local_id(), self.id, message);
        if let Err(error) = self.transport.send(envelope) {
            warn!(object_id = self.id, %error, "failed to send to host");
        }
    }

    // ---- reset ----

    /// Returns the object to its original pose and scale and resets its physics.
    pub fn reset_object(&mut self) {
        self.restore_original_transform();
        self.reset_physics();
    }

    /// Forces the body to rest; modes are restored on the next simulation step.
    pub fn reset_physics(&mut self) {
        self.velocity.clear();
        if self.pending_reset.is_none() {
            self.pending_reset = Some(PendingReset::begin(self.body.as_mut(), self.step));
        }
        if self.may_write_reset_flag() {
            self.write_owned(FieldKind::Resetting, true);
        }
    }

    pub fn is_reset_pending(&self) -> bool {
        self.pending_reset.is_some()
    }

    fn restore_original_transform(&mut self) {
        self.body.set_pose(self.original_pose);
        self.body.set_scale(self.original_scale);
    }

    fn finish_pending_reset(&mut self) {
        let Some(pending) = self.pending_reset.take() else {
            return;
        };
        pending.complete(self.body.as_mut());
        if self.may_write_reset_flag() {
            self.write_owned(FieldKind::Resetting, false);
        }
    }

    fn may_write_reset_flag(&self) -> bool {
        self.spawned
            && self.is_owner()
            && self.directory.is_connected()
            && !self.directory.shutdown_in_progress()
    }
}
