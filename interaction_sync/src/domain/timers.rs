// Cancellable keyed timers driven by explicit simulation time.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Simulation time since session start.
pub type SimTime = Duration;

/// At most one pending deadline per key; scheduling a key again replaces it.
#[derive(Debug, Clone)]
pub struct TimerSet<K> {
    deadlines: HashMap<K, SimTime>,
}

impl<K> Default for TimerSet<K> {
    fn default() -> Self {
        Self {
            deadlines: HashMap::new(),
        }
    }
}

impl<K> TimerSet<K>
where
    K: Copy + Eq + Hash + Ord,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, key: K, at: SimTime) {
        self.deadlines.insert(key, at);
    }

    /// Returns true if a pending timer was cancelled.
    pub fn cancel(&mut self, key: K) -> bool {
        self.deadlines.remove(&key).is_some()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_scheduled(&self, key: K) -> bool {
        self.deadlines.contains_key(&key)
    }

    pub fn deadline(&self, key: K) -> Option<SimTime> {
        self.deadlines.get(&key).copied()
    }

    /// Removes and returns the earliest timer whose deadline is at or before `now`.
    ///
    /// Callers fire one timer at a time so a handler can still cancel the others.
    pub fn pop_due(&mut self, now: SimTime) -> Option<K> {
        let (key, _) = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .min_by_key(|(key, at)| (**at, **key))
            .map(|(key, at)| (*key, *at))?;
        self.deadlines.remove(&key);
        Some(key)
    }
}
