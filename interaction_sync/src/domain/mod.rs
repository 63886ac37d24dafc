// Domain layer: per-object ownership state and the local rules that feed it.

pub mod arbiter;
pub mod errors;
pub mod math;
pub mod messages;
pub mod ports;
pub mod replicated;
pub mod state;
pub mod timers;
pub mod tuning;
pub mod velocity;

pub use arbiter::{CollisionArbiter, ContactDecision};
pub use math::{Pose, Quat, Vec3};
pub use messages::{
    Delivery, Envelope, FieldKind, InteractionKind, NetMessage, ObjectSnapshot,
};
pub use state::{ObjectId, Ownership, OwnershipState, ParticipantId};
pub use timers::{SimTime, TimerSet};
pub use velocity::VelocityEstimator;
