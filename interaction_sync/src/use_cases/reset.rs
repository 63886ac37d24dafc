// Two-phase physics reset: force the body kinematic at rest, then restore its
// modes one simulation step later.

use crate::domain::ports::{Interpolation, PhysicsBody};
use crate::domain::Vec3;

/// Body modes captured when a reset begins, restored when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReset {
    was_kinematic: bool,
    interpolation: Interpolation,
    /// Simulation step during which the reset began.
    started_at_step: u64,
}

impl PendingReset {
    /// Zeroes velocities (unless already kinematic), disables interpolation and
    /// forces the body kinematic.
    pub fn begin(body: &mut dyn PhysicsBody, step: u64) -> Self {
        let pending = Self {
            was_kinematic: body.is_kinematic(),
            interpolation: body.interpolation(),
            started_at_step: step,
        };

        if !pending.was_kinematic {
            body.set_velocity(Vec3::ZERO);
            body.set_angular_velocity(Vec3::ZERO);
        }
        body.set_interpolation(Interpolation::None);
        body.set_kinematic(true);

        pending
    }

    /// The physics step has to run once with the body held kinematic, otherwise
    /// interpolation blends the teleport with the old motion.
    pub fn is_due(&self, step: u64) -> bool {
        step > self.started_at_step
    }

    pub fn complete(self, body: &mut dyn PhysicsBody) {
        body.set_interpolation(self.interpolation);
        body.set_kinematic(self.was_kinematic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::test_support::FakeBody;

    #[test]
    fn when_dynamic_body_is_reset_then_it_rests_kinematic_until_completion() {
        let body = FakeBody::new();
        body.with(|s| {
            s.kinematic = false;
            s.interpolation = Interpolation::Interpolate;
            s.velocity = Vec3::new(1.0, 2.0, 3.0);
            s.angular_velocity = Vec3::new(0.0, 1.0, 0.0);
        });
        let mut handle = body.clone();

        let pending = PendingReset::begin(&mut handle, 4);
        body.with(|s| {
            assert!(s.kinematic);
            assert_eq!(s.interpolation, Interpolation::None);
            assert_eq!(s.velocity, Vec3::ZERO);
            assert_eq!(s.angular_velocity, Vec3::ZERO);
        });

        assert!(!pending.is_due(4));
        assert!(pending.is_due(5));
        pending.complete(&mut handle);

        body.with(|s| {
            assert!(!s.kinematic);
            assert_eq!(s.interpolation, Interpolation::Interpolate);
        });
    }

    #[test]
    fn when_kinematic_body_is_reset_then_velocities_are_left_alone() {
        let body = FakeBody::new();
        body.with(|s| {
            s.kinematic = true;
            s.velocity = Vec3::new(0.5, 0.0, 0.0);
        });
        let mut handle = body.clone();

        let pending = PendingReset::begin(&mut handle, 0);
        pending.complete(&mut handle);

        body.with(|s| {
            assert!(s.kinematic);
            assert_eq!(s.velocity, Vec3::new(0.5, 0.0, 0.0));
        });
    }
}
