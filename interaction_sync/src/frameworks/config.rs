use std::{env, time::Duration};

use crate::domain::ParticipantId;

// Runtime/relay constants (not interaction tuning).

pub fn relay_port() -> u16 {
    env::var("RELAY_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001)
}

pub fn event_channel_capacity() -> usize {
    env::var("RELAY_EVENT_CHANNEL_CAPACITY")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(EVENT_CHANNEL_CAPACITY)
}

pub fn broadcast_capacity() -> usize {
    env::var("RELAY_BROADCAST_CAPACITY")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(BROADCAST_CAPACITY)
}

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
pub const BROADCAST_CAPACITY: usize = 256;

// The relay process itself plays the host.
pub const HOST_PARTICIPANT_ID: ParticipantId = 0;

pub const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_DISPLAY_NAME_LEN: usize = 32;
