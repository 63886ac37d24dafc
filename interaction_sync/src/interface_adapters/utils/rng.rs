use crate::domain::ParticipantId;
use std::{
    sync::{
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

fn counter() -> &'static AtomicU64 {
    static COUNTER: OnceLock<AtomicU64> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        AtomicU64::new(seed)
    })
}

/// Returns a process-unique, monotonically increasing identifier.
///
/// Seeded from the wall clock so ids from separate runs rarely collide in logs.
pub fn rand_id() -> u64 {
    counter().fetch_add(1, Ordering::Relaxed)
}

/// Like [`rand_id`] but never returns `reserved` (the host's participant id).
pub fn participant_id_excluding(reserved: ParticipantId) -> ParticipantId {
    loop {
        let id = rand_id();
        if id != reserved {
            return id;
        }
    }
}
