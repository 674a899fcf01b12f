//! # auris-core
//!
//! Reusable speech segmentation SDK: always-on voice activity detection
//! that turns a live microphone into discrete, cleaned-up utterances.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → Pipeline(spawn_blocking)
//!                                                    │
//!                                       VadEngine decision per frame
//!                                                    │
//!                              SpeechDetector (threshold + hysteresis +
//!                               pre-roll seed + crossfade assembler)
//!                                                    │
//!                                trim → normalize → length gate
//!                                                    │
//!                                  broadcast::Sender<UtteranceEvent>
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens in the pipeline thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod detect;
pub mod error;
pub mod ipc;
pub mod monitor;
pub mod segment;
pub mod vad;

// Convenience re-exports for downstream crates
pub use error::AurisError;
pub use ipc::events::{
    EndReason, MonitorErrorEvent, MonitorStatus, MonitorStatusEvent, RecordedAudio,
    UtteranceEvent, VoiceActivityEvent,
};
pub use monitor::{MonitorConfig, SpeechMonitor};
pub use vad::{EnergyVad, EngineHandle, ProbabilityModel, ProbabilityVad, VadEngine};
