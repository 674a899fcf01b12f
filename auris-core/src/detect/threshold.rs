//! Adaptive silence threshold.
//!
//! Tracks the energy floor separating in-speech pauses from real silence.
//! The estimate climbs slowly while the engine hears speech well above it,
//! decays slowly toward the base otherwise, and snaps back to the base
//! when an episode ends.

/// Weight kept from the previous estimate when raising.
const RAISE_KEEP: f32 = 0.95;
/// Weight given to the new frame's energy when raising, pre-damped so a
/// single loud frame cannot spike the floor.
const RAISE_BLEND: f32 = 0.05 * 0.3;
/// Per-frame decay factor applied outside speech.
const DECAY: f32 = 0.995;

#[derive(Debug, Clone)]
pub struct ThresholdEstimator {
    base: f32,
    cap: f32,
    current: f32,
}

impl ThresholdEstimator {
    pub fn new(base: f32, cap: f32) -> Self {
        Self {
            base,
            cap,
            current: base,
        }
    }

    /// Advance one frame: `energy` is the frame's weighted RMS,
    /// `raw_speech` the engine's decision for it. Returns the updated
    /// threshold.
    pub fn update(&mut self, energy: f32, raw_speech: bool) -> f32 {
        if raw_speech && energy > self.current {
            self.current = (self.current * RAISE_KEEP + energy * RAISE_BLEND).min(self.cap);
        } else {
            self.current = (self.current * DECAY).max(self.base);
        }
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    /// Snap back to the base (episode end).
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
