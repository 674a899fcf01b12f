//! Energy-based VAD over a buffered analysis window.
//!
//! ## Algorithm
//!
//! 1. Scale incoming i16 samples to [-1.0, 1.0] and append to the window
//!    buffer.
//! 2. Until a full analysis window (0.1 s) is available, report silence —
//!    leftovers persist across calls.
//! 3. Take one window off the front and report speech if any 10 ms
//!    sub-chunk's RMS exceeds the threshold.

use super::VadEngine;
use crate::buffering::frame::AudioFrame;
use crate::error::Result;

/// Samples per analysis window (0.1 s at 16 kHz).
const WINDOW_SAMPLES: usize = 1_600;
/// Samples per sub-chunk examined inside the window (10 ms).
const SUB_CHUNK_SAMPLES: usize = 160;
/// Engine sample rate in Hz.
const SAMPLE_RATE: u32 = 16_000;
/// Default normalized RMS threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.02;

/// A self-contained energy-threshold voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// Normalized RMS level above which a sub-chunk counts as speech.
    /// Typical range: 0.01–0.05 for a quiet microphone.
    threshold: f32,
    /// Accumulated normalized samples awaiting a full window.
    window: Vec<f32>,
}

impl EnergyVad {
    /// Create a new `EnergyVad` with the given RMS threshold.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            window: Vec::with_capacity(WINDOW_SAMPLES * 2),
        }
    }

    /// Compute the root-mean-square of a sample slice.
    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }

    fn window_has_speech(&self, window: &[f32]) -> bool {
        window
            .chunks(SUB_CHUNK_SAMPLES)
            .any(|sub| Self::rms(sub) > self.threshold)
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl VadEngine for EnergyVad {
    fn process(&mut self, frame: &AudioFrame) -> Result<bool> {
        self.window
            .extend(frame.samples.iter().map(|&s| s as f32 / 32_767.0));
        if self.window.len() < WINDOW_SAMPLES {
            return Ok(false);
        }
        let rest = self.window.split_off(WINDOW_SAMPLES);
        let window = std::mem::replace(&mut self.window, rest);
        Ok(self.window_has_speech(&window))
    }

    fn frame_length(&self) -> usize {
        WINDOW_SAMPLES
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn reset(&mut self) {
        self.window.clear();
    }

    fn dispose(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_frame(len: usize) -> AudioFrame {
        AudioFrame::new(vec![0i16; len], SAMPLE_RATE)
    }

    fn loud_frame(amplitude: i16, len: usize) -> AudioFrame {
        AudioFrame::new(vec![amplitude; len], SAMPLE_RATE)
    }

    #[test]
    fn reports_silence_until_a_window_is_complete() {
        let mut vad = EnergyVad::default();
        // 800 loud samples: half a window, decision deferred.
        assert!(!vad.process(&loud_frame(16_000, 800)).unwrap());
        // Second half completes the window and flips the decision.
        assert!(vad.process(&loud_frame(16_000, 800)).unwrap());
    }

    #[test]
    fn quiet_window_is_silence() {
        let mut vad = EnergyVad::default();
        assert!(!vad.process(&silent_frame(WINDOW_SAMPLES)).unwrap());
    }

    #[test]
    fn single_loud_sub_chunk_flips_the_window() {
        let mut vad = EnergyVad::default();
        let mut samples = vec![0i16; WINDOW_SAMPLES];
        for sample in samples.iter_mut().skip(800).take(SUB_CHUNK_SAMPLES) {
            *sample = 16_000;
        }
        let frame = AudioFrame::new(samples, SAMPLE_RATE);
        assert!(vad.process(&frame).unwrap());
    }

    #[test]
    fn leftovers_persist_across_windows() {
        let mut vad = EnergyVad::default();
        // 1700 samples: one window consumed, 100 loud samples retained.
        let mut samples = vec![0i16; 1_700];
        for sample in samples.iter_mut().skip(WINDOW_SAMPLES) {
            *sample = 16_000;
        }
        assert!(!vad.process(&AudioFrame::new(samples, SAMPLE_RATE)).unwrap());

        // The retained loud tail seeds the next window.
        assert!(vad.process(&silent_frame(WINDOW_SAMPLES - 100)).unwrap());
    }

    #[test]
    fn threshold_boundary_is_exclusive() {
        let mut vad = EnergyVad::new(1.0);
        // Full-scale input has RMS exactly 1.0, not above the threshold.
        assert!(!vad.process(&loud_frame(32_767, WINDOW_SAMPLES)).unwrap());
    }

    #[test]
    fn reset_discards_partial_window() {
        let mut vad = EnergyVad::default();
        assert!(!vad.process(&loud_frame(16_000, 1_500)).unwrap());
        vad.reset();
        // A quiet window now completes with no loud leftovers in front.
        assert!(!vad.process(&silent_frame(WINDOW_SAMPLES)).unwrap());
    }

    #[test]
    fn dispose_is_idempotent_and_processing_continues() {
        let mut vad = EnergyVad::default();
        vad.dispose();
        vad.dispose();
        // The energy engine holds no real resources, so processing after
        // dispose simply starts from an empty window.
        assert!(vad.process(&loud_frame(16_000, WINDOW_SAMPLES)).unwrap());
    }
}
