//! Voice Activity Detection (VAD) abstraction.
//!
//! The `VadEngine` trait is the primary extensibility point: swap in
//! `EnergyVad` (default), `ProbabilityVad` over any external estimator, or
//! a future neural engine without touching the pipeline.
//!
//! `&mut self` on `process` intentionally expresses that engines are
//! stateful — window leftovers, smoothed probabilities, backend handles.
//! All mutation is therefore serialised through `EngineHandle`'s
//! `parking_lot::Mutex`.

pub mod energy;
pub mod probability;

pub use energy::EnergyVad;
pub use probability::{ProbabilityModel, ProbabilityVad};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffering::frame::AudioFrame;
use crate::error::Result;

/// Contract for all VAD implementations.
pub trait VadEngine: Send + 'static {
    /// Classify one frame: `true` when it carries speech.
    ///
    /// The frame's `sample_rate` should match [`VadEngine::sample_rate`];
    /// resampling is the caller's responsibility.
    ///
    /// # Errors
    /// An engine-internal fault classifying this frame. Callers treat it
    /// as a per-frame error, not a fatal one.
    fn process(&mut self, frame: &AudioFrame) -> Result<bool>;

    /// Number of samples per frame this engine expects.
    fn frame_length(&self) -> usize;

    /// Sample rate in Hz this engine expects.
    fn sample_rate(&self) -> u32;

    /// Reset any internal state (window leftovers, smoothed values).
    fn reset(&mut self);

    /// Release backing resources. Must be idempotent; engines that hold
    /// real resources report later `process` calls as frame errors.
    fn dispose(&mut self);
}

/// Thread-safe reference-counted handle to any `VadEngine` implementor.
///
/// Uses `parking_lot::Mutex` for:
/// - Non-poisoning on panic (unlike `std::sync::Mutex`)
/// - Cheap uncontended locking on the per-frame hot path
#[derive(Clone)]
pub struct EngineHandle(pub Arc<Mutex<dyn VadEngine>>);

impl EngineHandle {
    /// Wrap any `VadEngine` in an `EngineHandle`.
    pub fn new<E: VadEngine>(engine: E) -> Self {
        Self(Arc::new(Mutex::new(engine)))
    }

    /// Frame geometry snapshot: `(frame_length, sample_rate)`.
    pub fn geometry(&self) -> (usize, u32) {
        let engine = self.0.lock();
        (engine.frame_length(), engine.sample_rate())
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}
