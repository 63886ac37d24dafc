// Ports the ownership protocol needs from its host environment.

use std::time::Duration;

use crate::domain::math::{Pose, Vec3};
use crate::domain::messages::Envelope;
use crate::domain::state::ParticipantId;

/// Outbound half of the replication channel.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<(), String>;
}

/// Session membership and link quality as seen by the local participant.
pub trait ParticipantDirectory: Send + Sync {
    fn local_id(&self) -> ParticipantId;
    fn host_id(&self) -> ParticipantId;
    fn is_connected(&self) -> bool;
    fn rtt_to_host(&self) -> Option<Duration>;

    fn shutdown_in_progress(&self) -> bool {
        false
    }

    fn is_host(&self) -> bool {
        self.local_id() == self.host_id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    None,
    Interpolate,
    Extrapolate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyConstraints {
    #[default]
    None,
    FreezeAll,
}

/// The rigid body backing one interactable, owned by the physics engine.
pub trait PhysicsBody: Send {
    fn position(&self) -> Vec3;
    fn pose(&self) -> Pose;
    fn set_pose(&mut self, pose: Pose);
    fn scale(&self) -> Vec3;
    fn set_scale(&mut self, scale: Vec3);

    fn velocity(&self) -> Vec3;
    fn set_velocity(&mut self, velocity: Vec3);
    fn angular_velocity(&self) -> Vec3;
    fn set_angular_velocity(&mut self, velocity: Vec3);

    fn is_kinematic(&self) -> bool;
    fn set_kinematic(&mut self, kinematic: bool);
    fn interpolation(&self) -> Interpolation;
    fn set_interpolation(&mut self, interpolation: Interpolation);
    fn set_constraints(&mut self, constraints: BodyConstraints);
}
