// Contact-driven ownership requests with a velocity tie-break.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactDecision {
    RequestOwnership,
    Ignore,
}

/// Decides, for a locally owned object touching another interactable, whether
/// the other object's ownership should be requested.
///
/// Each participant decides alone; the host's serialized grant is the only
/// point where competing requests are resolved.
#[derive(Debug, Clone, Copy)]
pub struct CollisionArbiter {
    min_exchange_speed: f32,
}

impl CollisionArbiter {
    pub fn new(min_exchange_speed: f32) -> Self {
        Self { min_exchange_speed }
    }

    pub fn decide(&self, local_held: bool, local_speed: f32, other_speed: f32) -> ContactDecision {
        if local_held || self.is_moving_faster(local_speed, other_speed) {
            ContactDecision::RequestOwnership
        } else {
            ContactDecision::Ignore
        }
    }

    fn is_moving_faster(&self, local_speed: f32, other_speed: f32) -> bool {
        local_speed > self.min_exchange_speed && local_speed > other_speed
    }
}
