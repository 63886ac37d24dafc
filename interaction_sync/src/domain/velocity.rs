// Rolling velocity estimate from observed position deltas.

use crate::domain::math::Vec3;

/// Fixed-size ring buffer of per-step `displacement / dt` samples.
///
/// The estimate is the plain mean of every slot, so the oldest sample is evicted
/// once the buffer has wrapped.
#[derive(Debug, Clone)]
pub struct VelocityEstimator {
    samples: Vec<Vec3>,
    cursor: usize,
    previous: Option<Vec3>,
    paused: bool,
}

impl VelocityEstimator {
    pub fn new(frames: usize) -> Self {
        Self {
            samples: vec![Vec3::ZERO; frames.max(1)],
            cursor: 0,
            previous: None,
            paused: false,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Records one simulation step. The first observed position only seeds tracking.
    pub fn sample(&mut self, position: Vec3, dt: f32) {
        if self.paused || !position.is_finite() {
            return;
        }
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }

        let Some(previous) = self.previous.replace(position) else {
            return;
        };

        self.samples[self.cursor] = (position - previous) / dt;
        self.cursor = (self.cursor + 1) % self.samples.len();
    }

    pub fn average(&self) -> Vec3 {
        let mut sum = Vec3::ZERO;
        for sample in &self.samples {
            sum += *sample;
        }
        sum / self.samples.len() as f32
    }

    /// Zero-fills the buffer without touching position tracking.
    pub fn clear(&mut self) {
        self.samples.fill(Vec3::ZERO);
    }

    /// Stops sampling; the buffer is zero-filled and position tracking is dropped.
    pub fn pause(&mut self) {
        self.paused = true;
        self.clear();
        self.previous = None;
    }

    /// Resumes sampling; the next observed position re-seeds tracking.
    pub fn resume(&mut self) {
        self.paused = false;
    }
}
