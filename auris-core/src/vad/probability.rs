//! Probability-smoothing VAD over an external speech-probability
//! estimator.
//!
//! The estimator (a neural model, a vendor SDK binding) lives behind
//! [`ProbabilityModel`]; this wrapper owns the exponential smoothing that
//! keeps single-frame probability spikes from flickering the decision.

use super::VadEngine;
use crate::buffering::frame::AudioFrame;
use crate::error::{AurisError, Result};

/// Default smoothing weight given to the newest probability.
pub const DEFAULT_ALPHA: f32 = 0.5;
/// Default smoothed-probability decision threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// External per-frame speech-probability source.
///
/// Implementations declare their own fixed frame geometry. Construction
/// failures (bad credential, unsupported locale, missing local resource)
/// belong in the implementor's constructor, surfaced as
/// [`AurisError::EngineConstruction`].
pub trait ProbabilityModel: Send + 'static {
    /// Speech probability in [0.0, 1.0] for one frame of the declared
    /// length.
    fn speech_probability(&mut self, frame: &[i16]) -> Result<f32>;

    /// Number of samples per frame the estimator expects.
    fn frame_length(&self) -> usize;

    /// Sample rate in Hz the estimator expects.
    fn sample_rate(&self) -> u32;
}

/// Exponentially smoothed decision layer over a [`ProbabilityModel`].
pub struct ProbabilityVad {
    /// `None` after `dispose` — the backing estimator has been released.
    model: Option<Box<dyn ProbabilityModel>>,
    frame_length: usize,
    sample_rate: u32,
    threshold: f32,
    alpha: f32,
    smoothed: f32,
}

impl ProbabilityVad {
    pub fn new(model: Box<dyn ProbabilityModel>) -> Result<Self> {
        Self::with_tuning(model, DEFAULT_THRESHOLD, DEFAULT_ALPHA)
    }

    /// Create with explicit tuning.
    ///
    /// # Errors
    /// `EngineConstruction` when `threshold` leaves [0, 1], `alpha` leaves
    /// (0, 1], or the estimator declares a zero frame length.
    pub fn with_tuning(
        model: Box<dyn ProbabilityModel>,
        threshold: f32,
        alpha: f32,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AurisError::EngineConstruction(format!(
                "decision threshold {threshold} outside [0, 1]"
            )));
        }
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(AurisError::EngineConstruction(format!(
                "smoothing alpha {alpha} outside (0, 1]"
            )));
        }
        if model.frame_length() == 0 {
            return Err(AurisError::EngineConstruction(
                "estimator declares a zero frame length".into(),
            ));
        }
        let frame_length = model.frame_length();
        let sample_rate = model.sample_rate();
        Ok(Self {
            model: Some(model),
            frame_length,
            sample_rate,
            threshold,
            alpha,
            smoothed: 0.0,
        })
    }

    /// Smoothed probability after the most recent frame.
    pub fn smoothed_probability(&self) -> f32 {
        self.smoothed
    }
}

impl VadEngine for ProbabilityVad {
    fn process(&mut self, frame: &AudioFrame) -> Result<bool> {
        let model = self.model.as_mut().ok_or_else(|| {
            AurisError::FrameProcessing("probability engine already disposed".into())
        })?;
        let probability = model.speech_probability(&frame.samples)?;
        self.smoothed = self.alpha * probability + (1.0 - self.alpha) * self.smoothed;
        Ok(self.smoothed >= self.threshold)
    }

    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn reset(&mut self) {
        self.smoothed = 0.0;
    }

    fn dispose(&mut self) {
        self.model = None;
        self.smoothed = 0.0;
    }
}

impl std::fmt::Debug for ProbabilityVad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbabilityVad")
            .field("frame_length", &self.frame_length)
            .field("sample_rate", &self.sample_rate)
            .field("threshold", &self.threshold)
            .field("alpha", &self.alpha)
            .field("smoothed", &self.smoothed)
            .field("disposed", &self.model.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Replays a scripted probability sequence; repeats the last entry.
    struct ScriptedModel {
        probabilities: Vec<f32>,
        index: usize,
        fail_at: Option<usize>,
    }

    impl ScriptedModel {
        fn new(probabilities: Vec<f32>) -> Self {
            Self {
                probabilities,
                index: 0,
                fail_at: None,
            }
        }
    }

    impl ProbabilityModel for ScriptedModel {
        fn speech_probability(&mut self, _frame: &[i16]) -> Result<f32> {
            if self.fail_at == Some(self.index) {
                self.fail_at = None;
                self.index += 1;
                return Err(AurisError::FrameProcessing("scripted fault".into()));
            }
            let probability = self
                .probabilities
                .get(self.index)
                .or(self.probabilities.last())
                .copied()
                .unwrap_or(0.0);
            self.index += 1;
            Ok(probability)
        }

        fn frame_length(&self) -> usize {
            512
        }

        fn sample_rate(&self) -> u32 {
            16_000
        }
    }

    fn frame() -> AudioFrame {
        AudioFrame::new(vec![0i16; 512], 16_000)
    }

    #[test]
    fn smoothing_delays_the_decision_by_one_confident_frame() {
        let model = ScriptedModel::new(vec![1.0, 1.0, 1.0]);
        let mut vad = ProbabilityVad::new(Box::new(model)).expect("construct");

        // 0.5 * 1.0 = 0.5 < 0.6
        assert!(!vad.process(&frame()).unwrap());
        assert_relative_eq!(vad.smoothed_probability(), 0.5, epsilon = 1e-6);

        // 0.5 + 0.5 * 0.5 = 0.75 >= 0.6
        assert!(vad.process(&frame()).unwrap());
        assert_relative_eq!(vad.smoothed_probability(), 0.75, epsilon = 1e-6);
    }

    #[test]
    fn low_probabilities_stay_silent() {
        let model = ScriptedModel::new(vec![0.3; 8]);
        let mut vad = ProbabilityVad::new(Box::new(model)).expect("construct");
        for _ in 0..8 {
            assert!(!vad.process(&frame()).unwrap());
        }
        // Smoothing converges toward 0.3 and never crosses 0.6.
        assert!(vad.smoothed_probability() < 0.6);
    }

    #[test]
    fn reset_clears_the_smoothed_state() {
        let model = ScriptedModel::new(vec![1.0; 4]);
        let mut vad = ProbabilityVad::new(Box::new(model)).expect("construct");
        vad.process(&frame()).unwrap();
        vad.process(&frame()).unwrap();
        assert!(vad.smoothed_probability() > 0.6);

        vad.reset();
        assert_eq!(vad.smoothed_probability(), 0.0);
        // First frame after reset starts the climb from zero again.
        assert!(!vad.process(&frame()).unwrap());
    }

    #[test]
    fn estimator_errors_surface_as_frame_errors() {
        let mut model = ScriptedModel::new(vec![1.0; 4]);
        model.fail_at = Some(1);
        let mut vad = ProbabilityVad::new(Box::new(model)).expect("construct");

        assert!(vad.process(&frame()).is_ok());
        let err = vad.process(&frame()).unwrap_err();
        assert!(matches!(err, AurisError::FrameProcessing(_)));

        // The wrapper itself stays usable afterwards.
        assert!(vad.process(&frame()).is_ok());
    }

    #[test]
    fn dispose_releases_the_model_and_later_frames_error() {
        let model = ScriptedModel::new(vec![1.0; 4]);
        let mut vad = ProbabilityVad::new(Box::new(model)).expect("construct");

        vad.dispose();
        vad.dispose();

        let err = vad.process(&frame()).unwrap_err();
        assert!(matches!(err, AurisError::FrameProcessing(_)));
    }

    #[test]
    fn construction_rejects_bad_tuning() {
        let model = ScriptedModel::new(vec![0.5]);
        let err = ProbabilityVad::with_tuning(Box::new(model), 1.5, 0.5).unwrap_err();
        assert!(matches!(err, AurisError::EngineConstruction(_)));

        let model = ScriptedModel::new(vec![0.5]);
        let err = ProbabilityVad::with_tuning(Box::new(model), 0.6, 0.0).unwrap_err();
        assert!(matches!(err, AurisError::EngineConstruction(_)));
    }
}
