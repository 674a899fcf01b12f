//! Perceptual volume publishing with throttling and de-duplication.
//!
//! Raw RMS tracks perceived loudness poorly at conversational levels, so
//! the level is compressed with a power curve before publishing. Events
//! are rate-limited and suppressed when the level barely moved, keeping
//! the activity channel quiet while nothing interesting happens.

use std::time::{Duration, Instant};

/// Every 4th sample is enough for a UI meter.
const SAMPLE_STRIDE: usize = 4;

/// Exponent of the loudness compression curve.
const LOUDNESS_EXPONENT: f32 = 0.4;

pub struct VolumeTracker {
    interval: Duration,
    change_threshold: f32,
    last_update: Option<Instant>,
    last_published: f32,
}

impl VolumeTracker {
    pub fn new(interval: Duration, change_threshold: f32) -> Self {
        Self {
            interval,
            change_threshold,
            last_update: None,
            last_published: 0.0,
        }
    }

    /// Consider one frame for publication.
    ///
    /// Returns `Some(level)` when a new volume should be published:
    /// at most once per interval, only when the level moved by at least
    /// the change threshold, plus a single `0.0` after speech ends so
    /// meters fall back to rest.
    pub fn sample(&mut self, samples: &[i16], speaking: bool) -> Option<f32> {
        let now = Instant::now();
        if let Some(at) = self.last_update {
            if now.duration_since(at) < self.interval {
                return None;
            }
        }

        if !speaking {
            if self.last_published > 0.0 {
                self.last_update = Some(now);
                self.last_published = 0.0;
                return Some(0.0);
            }
            return None;
        }

        let level = perceptual_level(samples);
        if (level - self.last_published).abs() < self.change_threshold {
            return None;
        }
        self.last_update = Some(now);
        self.last_published = level;
        Some(level)
    }

    /// Forget throttle and publish state. Called when an episode concludes
    /// with an explicit zero publish, so the tracker does not send a
    /// second one.
    pub fn reset(&mut self) {
        self.last_update = None;
        self.last_published = 0.0;
    }
}

/// Strided RMS mapped through the loudness curve, clamped to [0, 1].
fn perceptual_level(samples: &[i16]) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for &s in samples.iter().step_by(SAMPLE_STRIDE) {
        let s = f32::from(s);
        sum += s * s;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    let rms = (sum / count as f32).sqrt();
    (rms / 32_767.0).powf(LOUDNESS_EXPONENT).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unthrottled() -> VolumeTracker {
        VolumeTracker::new(Duration::ZERO, 0.05)
    }

    #[test]
    fn level_curve_spans_the_unit_range() {
        assert_eq!(perceptual_level(&[0; 640]), 0.0);
        assert_relative_eq!(perceptual_level(&[32_767; 640]), 1.0, epsilon = 1e-4);

        // Half scale compresses upward: (0.5)^0.4 ≈ 0.758.
        let half = perceptual_level(&[16_384; 640]);
        assert_relative_eq!(half, 0.5f32.powf(0.4), epsilon = 1e-3);
    }

    #[test]
    fn empty_input_is_silent() {
        assert_eq!(perceptual_level(&[]), 0.0);
    }

    #[test]
    fn first_loud_frame_publishes() {
        let mut tracker = unthrottled();
        let level = tracker.sample(&[16_384; 640], true);
        assert!(level.is_some());
        assert!(level.unwrap() > 0.7);
    }

    #[test]
    fn unchanged_levels_are_suppressed() {
        let mut tracker = unthrottled();
        assert!(tracker.sample(&[16_384; 640], true).is_some());
        assert!(tracker.sample(&[16_384; 640], true).is_none());
        assert!(tracker.sample(&[16_500; 640], true).is_none());

        // A real drop gets through.
        assert!(tracker.sample(&[2_000; 640], true).is_some());
    }

    #[test]
    fn interval_throttles_even_large_changes() {
        let mut tracker = VolumeTracker::new(Duration::from_secs(60), 0.05);
        assert!(tracker.sample(&[16_384; 640], true).is_some());
        assert!(tracker.sample(&[300; 640], true).is_none());
    }

    #[test]
    fn speech_end_publishes_a_single_zero() {
        let mut tracker = unthrottled();
        assert!(tracker.sample(&[16_384; 640], true).is_some());

        assert_eq!(tracker.sample(&[16_384; 640], false), Some(0.0));
        assert_eq!(tracker.sample(&[16_384; 640], false), None);
    }

    #[test]
    fn silence_without_prior_speech_stays_quiet() {
        let mut tracker = unthrottled();
        assert_eq!(tracker.sample(&[0; 640], false), None);
    }

    #[test]
    fn reset_swallows_the_pending_zero_and_rearms_publishing() {
        let mut tracker = VolumeTracker::new(Duration::from_secs(60), 0.05);
        assert!(tracker.sample(&[16_384; 640], true).is_some());

        tracker.reset();

        // No trailing zero: the caller already published one.
        assert_eq!(tracker.sample(&[0; 640], false), None);
        // The throttle window restarts too.
        assert!(tracker.sample(&[16_384; 640], true).is_some());
    }
}
