use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::ports::{
    BodyConstraints, Interpolation, ParticipantDirectory, PhysicsBody, Transport,
};
use crate::domain::tuning::InteractableConfig;
use crate::domain::{Envelope, ObjectId, ObjectSnapshot, ParticipantId, Pose, SimTime, Vec3};
use crate::use_cases::host::HostAuthority;
use crate::use_cases::registry::InteractableRegistry;
use crate::use_cases::types::Outbound;

pub(crate) const HOST: ParticipantId = 0;

pub(crate) fn snapshot(owner: ParticipantId, locked_on_spawn: bool) -> ObjectSnapshot {
    ObjectSnapshot {
        kind: "crate".to_string(),
        owner,
        epoch: 0,
        is_interacting: false,
        locked_on_spawn,
        resetting: false,
    }
}

// Records every envelope instead of sending it.
#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    sent: Arc<Mutex<Vec<Envelope>>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn take(&self) -> Vec<Envelope> {
        let mut guard = self.sent.lock().expect("sent mutex poisoned");
        std::mem::take(&mut *guard)
    }
}

impl Transport for RecordingTransport {
    fn send(&self, envelope: Envelope) -> Result<(), String> {
        let mut guard = self.sent.lock().expect("sent mutex poisoned");
        guard.push(envelope);
        Ok(())
    }
}

#[derive(Clone)]
pub(crate) struct FixedDirectory {
    local: ParticipantId,
    host: ParticipantId,
    connected: bool,
    rtt: Arc<Mutex<Option<Duration>>>,
}

impl FixedDirectory {
    pub(crate) fn new(local: ParticipantId) -> Self {
        Self {
            local,
            host: HOST,
            connected: true,
            rtt: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn with_rtt(self, rtt: Option<Duration>) -> Self {
        self.set_rtt(rtt);
        self
    }

    pub(crate) fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub(crate) fn set_rtt(&self, rtt: Option<Duration>) {
        *self.rtt.lock().expect("rtt mutex poisoned") = rtt;
    }
}

impl ParticipantDirectory for FixedDirectory {
    fn local_id(&self) -> ParticipantId {
        self.local
    }

    fn host_id(&self) -> ParticipantId {
        self.host
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn rtt_to_host(&self) -> Option<Duration> {
        *self.rtt.lock().expect("rtt mutex poisoned")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BodyState {
    pub pose: Pose,
    pub scale: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub kinematic: bool,
    pub interpolation: Interpolation,
    pub constraints: BodyConstraints,
}

impl Default for BodyState {
    fn default() -> Self {
        Self {
            pose: Pose::default(),
            scale: Vec3::ONE,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            kinematic: true,
            interpolation: Interpolation::None,
            constraints: BodyConstraints::None,
        }
    }
}

// Shared handle: the interactable owns one clone, the test inspects another.
#[derive(Clone, Default)]
pub(crate) struct FakeBody {
    state: Arc<Mutex<BodyState>>,
}

impl FakeBody {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut BodyState) -> R) -> R {
        let mut guard = self.state.lock().expect("body mutex poisoned");
        f(&mut guard)
    }
}

impl PhysicsBody for FakeBody {
    fn position(&self) -> Vec3 {
        self.with(|s| s.pose.position)
    }

    fn pose(&self) -> Pose {
        self.with(|s| s.pose)
    }

    fn set_pose(&mut self, pose: Pose) {
        self.with(|s| s.pose = pose);
    }

    fn scale(&self) -> Vec3 {
        self.with(|s| s.scale)
    }

    fn set_scale(&mut self, scale: Vec3) {
        self.with(|s| s.scale = scale);
    }

    fn velocity(&self) -> Vec3 {
        self.with(|s| s.velocity)
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        self.with(|s| s.velocity = velocity);
    }

    fn angular_velocity(&self) -> Vec3 {
        self.with(|s| s.angular_velocity)
    }

    fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.with(|s| s.angular_velocity = velocity);
    }

    fn is_kinematic(&self) -> bool {
        self.with(|s| s.kinematic)
    }

    fn set_kinematic(&mut self, kinematic: bool) {
        self.with(|s| s.kinematic = kinematic);
    }

    fn interpolation(&self) -> Interpolation {
        self.with(|s| s.interpolation)
    }

    fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.with(|s| s.interpolation = interpolation);
    }

    fn set_constraints(&mut self, constraints: BodyConstraints) {
        self.with(|s| s.constraints = constraints);
    }
}

pub(crate) struct Peer {
    pub registry: InteractableRegistry,
    latency: Duration,
    transport: RecordingTransport,
    directory: FixedDirectory,
    bodies: Arc<Mutex<HashMap<ObjectId, FakeBody>>>,
}

impl Peer {
    fn new(id: ParticipantId, latency: Duration, config: InteractableConfig) -> Self {
        let transport = RecordingTransport::new();
        let directory = FixedDirectory::new(id);
        let bodies: Arc<Mutex<HashMap<ObjectId, FakeBody>>> = Arc::default();
        let factory_bodies = Arc::clone(&bodies);
        let registry = InteractableRegistry::new(
            Arc::new(directory.clone()),
            Arc::new(transport.clone()),
            config,
            Box::new(move |object_id, _kind| {
                let body = FakeBody::new();
                factory_bodies
                    .lock()
                    .expect("bodies mutex poisoned")
                    .insert(object_id, body.clone());
                Some(Box::new(body) as Box<dyn PhysicsBody>)
            }),
        );
        Self {
            registry,
            latency,
            transport,
            directory,
            bodies,
        }
    }

    pub(crate) fn body(&self, object_id: ObjectId) -> FakeBody {
        self.bodies
            .lock()
            .expect("bodies mutex poisoned")
            .get(&object_id)
            .cloned()
            .expect("object spawned on this peer")
    }

    pub(crate) fn set_rtt(&self, rtt: Option<Duration>) {
        self.directory.set_rtt(rtt);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Host,
    Peer(ParticipantId),
}

struct Flight {
    deliver_at: SimTime,
    seq: u64,
    from: ParticipantId,
    to: Endpoint,
    envelope: Envelope,
}

/// Host authority plus participants, connected by in-order links with a fixed
/// one-way latency per participant.
pub(crate) struct Network {
    pub host: HostAuthority,
    peers: Vec<(ParticipantId, Peer)>,
    in_flight: Vec<Flight>,
    now: SimTime,
    seq: u64,
}

impl Network {
    pub(crate) fn new(host_id: ParticipantId) -> Self {
        Self {
            host: HostAuthority::new(host_id),
            peers: Vec::new(),
            in_flight: Vec::new(),
            now: SimTime::ZERO,
            seq: 0,
        }
    }

    pub(crate) fn with_peer(
        mut self,
        id: ParticipantId,
        latency: Duration,
        config: InteractableConfig,
    ) -> Self {
        self.join(id, latency, config);
        self
    }

    pub(crate) fn join(&mut self, id: ParticipantId, latency: Duration, config: InteractableConfig) {
        self.peers.push((id, Peer::new(id, latency, config)));
        let out = self.host.join(id).expect("participant joins once");
        self.route_from_host(self.now, out);
    }

    pub(crate) fn disconnect(&mut self, id: ParticipantId) {
        self.peers.retain(|(peer_id, _)| *peer_id != id);
        self.in_flight.retain(|flight| flight.to != Endpoint::Peer(id) && flight.from != id);
        let out = self.host.leave(id).expect("participant was joined");
        self.route_from_host(self.now, out);
    }

    pub(crate) fn spawn(&mut self, kind: &str, spawn_locked: bool) -> ObjectId {
        let (object_id, out) = self.host.spawn(kind, spawn_locked);
        self.route_from_host(self.now, vec![out]);
        object_id
    }

    pub(crate) fn peer(&self, id: ParticipantId) -> &Peer {
        self.peers
            .iter()
            .find(|(peer_id, _)| *peer_id == id)
            .map(|(_, peer)| peer)
            .expect("peer exists")
    }

    pub(crate) fn peer_mut(&mut self, id: ParticipantId) -> &mut Peer {
        self.peers
            .iter_mut()
            .find(|(peer_id, _)| *peer_id == id)
            .map(|(_, peer)| peer)
            .expect("peer exists")
    }

    /// Advances simulated time in fixed steps, ticking every peer and
    /// delivering whatever has arrived.
    pub(crate) fn run_for(&mut self, duration: Duration, step: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.now += step;
            for (_, peer) in &mut self.peers {
                peer.registry.tick(self.now, step.as_secs_f32());
            }
            self.collect_sent(self.now);
            self.deliver_due();
        }
    }

    fn collect_sent(&mut self, at: SimTime) {
        let mut sent = Vec::new();
        for (id, peer) in &self.peers {
            for envelope in peer.transport.take() {
                sent.push((*id, peer.latency, envelope));
            }
        }
        for (from, latency, envelope) in sent {
            self.push(at + latency, from, Endpoint::Host, envelope);
        }
    }

    fn deliver_due(&mut self) {
        while let Some(index) = self
            .in_flight
            .iter()
            .enumerate()
            .filter(|(_, flight)| flight.deliver_at <= self.now)
            .min_by_key(|(_, flight)| (flight.deliver_at, flight.seq))
            .map(|(index, _)| index)
        {
            let flight = self.in_flight.remove(index);
            match flight.to {
                Endpoint::Host => {
                    // Rejected envelopes are dropped, exactly as the session task does.
                    if let Ok(out) = self.host.handle(flight.from, flight.envelope) {
                        self.route_from_host(flight.deliver_at, out);
                    }
                }
                Endpoint::Peer(id) => {
                    if let Some((_, peer)) = self.peers.iter_mut().find(|(p, _)| *p == id) {
                        peer.registry.handle_envelope(flight.envelope);
                    }
                    self.collect_sent(flight.deliver_at);
                }
            }
        }
    }

    fn route_from_host(&mut self, at: SimTime, out: Vec<Outbound>) {
        let host_id = self.host.host_id();
        for outbound in out {
            let targets: Vec<(ParticipantId, Duration)> = self
                .peers
                .iter()
                .filter(|(id, _)| outbound.recipient.includes(*id))
                .map(|(id, peer)| (*id, peer.latency))
                .collect();
            for (id, latency) in targets {
                self.push(at + latency, host_id, Endpoint::Peer(id), outbound.envelope.clone());
            }
        }
    }

    fn push(&mut self, deliver_at: SimTime, from: ParticipantId, to: Endpoint, envelope: Envelope) {
        self.seq += 1;
        self.in_flight.push(Flight {
            deliver_at,
            seq: self.seq,
            from,
            to,
            envelope,
        });
    }
}
