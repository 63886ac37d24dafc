// Participant-side registry of spawned interactables, fed by host envelopes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, error};

use crate::domain::ports::{ParticipantDirectory, PhysicsBody, Transport};
use crate::domain::tuning::InteractableConfig;
use crate::domain::{CollisionArbiter, ContactDecision, Envelope, NetMessage, ObjectId, SimTime};
use crate::use_cases::interactable::NetworkInteractable;
use crate::use_cases::types::InteractableEvent;

/// Creates the physics body for a freshly spawned object, if the scene has one.
pub type BodyFactory =
    Box<dyn Fn(ObjectId, &str) -> Option<Box<dyn PhysicsBody>> + Send + Sync>;

pub struct InteractableRegistry {
    directory: Arc<dyn ParticipantDirectory>,
    transport: Arc<dyn Transport>,
    default_config: InteractableConfig,
    configs: HashMap<String, InteractableConfig>,
    body_factory: BodyFactory,
    objects: BTreeMap<ObjectId, NetworkInteractable>,
}

impl InteractableRegistry {
    pub fn new(
        directory: Arc<dyn ParticipantDirectory>,
        transport: Arc<dyn Transport>,
        default_config: InteractableConfig,
        body_factory: BodyFactory,
    ) -> Self {
        Self {
            directory,
            transport,
            default_config,
            configs: HashMap::new(),
            body_factory,
            objects: BTreeMap::new(),
        }
    }

    /// Overrides the configuration used for objects of `kind`.
    pub fn with_kind_config(mut self, kind: impl Into<String>, config: InteractableConfig) -> Self {
        self.configs.insert(kind.into(), config);
        self
    }

    pub fn get(&self, object_id: ObjectId) -> Option<&NetworkInteractable> {
        self.objects.get(&object_id)
    }

    pub fn get_mut(&mut self, object_id: ObjectId) -> Option<&mut NetworkInteractable> {
        self.objects.get_mut(&object_id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn handle_envelope(&mut self, envelope: Envelope) {
        let object_id = envelope.object_id;
        match envelope.message {
            NetMessage::Spawned(snapshot) if !self.objects.contains_key(&object_id) => {
                let config = self
                    .configs
                    .get(&snapshot.kind)
                    .cloned()
                    .unwrap_or_else(|| self.default_config.clone());
                let body = (self.body_factory)(object_id, &snapshot.kind);
                match NetworkInteractable::new(
                    object_id,
                    snapshot.kind.clone(),
                    config,
                    body,
                    Arc::clone(&self.directory),
                    Arc::clone(&self.transport),
                ) {
                    Ok(mut object) => {
                        object.on_network_spawn(&snapshot);
                        self.objects.insert(object_id, object);
                    }
                    Err(e) => {
                        error!(object_id, kind = %snapshot.kind, error = ?e, "interactable not registered");
                    }
                }
            }
            NetMessage::Despawned => {
                if let Some(mut object) = self.objects.remove(&object_id) {
                    object.on_network_despawn();
                }
            }
            message => match self.objects.get_mut(&object_id) {
                Some(object) => object.handle_message(envelope.sender, &message),
                None => debug!(object_id, "envelope for unknown object dropped"),
            },
        }
    }

    pub fn tick(&mut self, now: SimTime, dt: f32) {
        for object in self.objects.values_mut() {
            object.tick(now, dt);
        }
    }

    pub fn drain_events(&mut self) -> Vec<(ObjectId, InteractableEvent)> {
        self.objects
            .iter_mut()
            .flat_map(|(id, object)| {
                let id = *id;
                object.drain_events().into_iter().map(move |event| (id, event))
            })
            .collect()
    }

    /// Contact reported by the physics engine between two interactables.
    ///
    /// Only the owner of `local` acts; it asks for `other` when it is held or
    /// moving faster. Returns whether a request was sent.
    pub fn on_contact(&mut self, local: ObjectId, other: ObjectId) -> bool {
        if local == other {
            return false;
        }
        let Some(source) = self.objects.get(&local) else {
            return false;
        };
        if !source.is_owner() || !source.config().allow_collision_ownership_exchange {
            return false;
        }
        let Some(target) = self.objects.get(&other) else {
            return false;
        };

        let arbiter = CollisionArbiter::new(source.config().min_exchange_velocity_magnitude);
        let decision = arbiter.decide(source.is_interacting(), source.speed(), target.speed());
        if decision != ContactDecision::RequestOwnership {
            return false;
        }

        self.objects
            .get_mut(&other)
            .is_some_and(NetworkInteractable::request_ownership)
    }
}
