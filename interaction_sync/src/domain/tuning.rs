// Per-object interaction tuning.
//
// Keep this separate from runtime/server configuration (ports, channel sizes, etc.).
use serde::Deserialize;
use std::time::Duration;

/// Lower bound for a usable ownership request timeout.
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(25);
/// Upper bound for a usable ownership request timeout.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Used whenever the RTT-derived timeout falls outside the bounds above.
pub const FALLBACK_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// How a grab moves the body; decides whether a request or release makes it dynamic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Kinematic,
    VelocityTracking,
    #[default]
    Instantaneous,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InteractableConfig {
    /// Let users take objects that someone else is holding.
    pub allow_override_ownership: bool,

    /// Seconds between checks for a stale `is_interacting` flag while owning.
    pub interaction_check_seconds: f32,

    /// Ignore select callbacks coming from socket interactors.
    pub ignore_socket_selected_callback: bool,

    /// Treat a socket selection as a real hold during the interaction check.
    pub socket_selection_counts_as_hold: bool,

    /// Reset pose, scale and physics on spawn and despawn.
    pub reset_object_on_disconnect: bool,

    /// Hand an idle object back to the host after `relinquish_ownership_seconds`.
    pub relinquish_ownership_after_time: bool,
    pub relinquish_ownership_seconds: f32,

    pub sync_hover: bool,
    pub sync_select: bool,
    pub sync_activate: bool,

    /// Request ownership of other interactables this one collides with.
    pub allow_collision_ownership_exchange: bool,

    /// Minimum speed (units/second) before a contact may trigger a request.
    pub min_exchange_velocity_magnitude: f32,

    /// Freeze the body and block ownership requests until first picked up.
    pub spawn_locked: bool,

    /// Ring buffer length of the velocity estimator.
    pub velocity_frames: usize,

    pub movement_type: MovementType,
    pub throw_on_detach: bool,
}

impl Default for InteractableConfig {
    fn default() -> Self {
        Self {
            allow_override_ownership: false,
            interaction_check_seconds: 2.0,
            ignore_socket_selected_callback: true,
            socket_selection_counts_as_hold: false,
            reset_object_on_disconnect: true,
            relinquish_ownership_after_time: true,
            relinquish_ownership_seconds: 5.0,
            sync_hover: false,
            sync_select: true,
            sync_activate: true,
            allow_collision_ownership_exchange: true,
            min_exchange_velocity_magnitude: 0.025,
            spawn_locked: true,
            velocity_frames: 3,
            movement_type: MovementType::default(),
            throw_on_detach: true,
        }
    }
}

impl InteractableConfig {
    pub fn interaction_check_time(&self) -> Duration {
        seconds_or(self.interaction_check_seconds, Duration::from_secs(2))
    }

    pub fn relinquish_ownership_time(&self) -> Duration {
        seconds_or(self.relinquish_ownership_seconds, Duration::from_secs(5))
    }
}

/// Twice the round-trip time to the host, or the fallback when that is out of bounds.
pub fn ownership_request_timeout(rtt: Option<Duration>) -> Duration {
    let Some(rtt) = rtt else {
        return FALLBACK_REQUEST_TIMEOUT;
    };

    let wait = rtt.saturating_mul(2);
    if wait < MIN_REQUEST_TIMEOUT || wait > MAX_REQUEST_TIMEOUT {
        FALLBACK_REQUEST_TIMEOUT
    } else {
        wait
    }
}

// Zero would make a rescheduling timer due again within the same tick.
fn seconds_or(seconds: f32, fallback: Duration) -> Duration {
    match Duration::try_from_secs_f32(seconds) {
        Ok(duration) if !duration.is_zero() => duration,
        _ => fallback,
    }
}
