//! Per-frame speech detection state, one instance per capture session.
//!
//! `SpeechDetector` composes the pre-roll buffer, the adaptive threshold,
//! the hysteresis state machine and the recording assembler into a single
//! synchronous step: feed it one engine frame plus the engine's raw
//! decision, get back what (if anything) just happened.

use tracing::debug;

use crate::buffering::frame::AudioFrame;
use crate::buffering::preroll::{find_segment_start, PrerollBuffer};
use crate::detect::state::{SpeechStateMachine, SpeechTransition};
use crate::detect::threshold::ThresholdEstimator;
use crate::detect::weighted_rms;
use crate::ipc::events::EndReason;
use crate::monitor::MonitorConfig;
use crate::segment::assembler::RecordingAssembler;
use crate::segment::finalize::{finalize, FinalizeConfig};

/// What a single detector step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorOutcome {
    /// Nothing changed; keep feeding frames.
    Quiet,
    /// Speech was just confirmed; a recording is now in progress.
    SpeechStarted,
    /// An episode ended and survived the finalize policy.
    SegmentReady { samples: Vec<i16>, reason: EndReason },
    /// An episode ended but was dropped (too short after assembly).
    SegmentDiscarded { reason: EndReason, raw_len: usize },
}

pub struct SpeechDetector {
    analysis_frame: usize,
    finalize: FinalizeConfig,
    threshold: ThresholdEstimator,
    state: SpeechStateMachine,
    preroll: PrerollBuffer,
    assembler: RecordingAssembler,
}

impl SpeechDetector {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            analysis_frame: config.analysis_frame,
            finalize: config.finalize_config(),
            threshold: ThresholdEstimator::new(config.base_threshold, config.threshold_cap),
            state: SpeechStateMachine::new(config.state_config()),
            preroll: PrerollBuffer::new(config.preroll_samples),
            assembler: RecordingAssembler::new(config.frame_overlap),
        }
    }

    /// Advance the detector by one engine frame.
    ///
    /// `raw_speech` is the engine's decision for this frame. The frame is
    /// always pushed into the pre-roll first, so a speech start seeded
    /// from the pre-roll already contains it.
    pub fn advance(&mut self, frame: &AudioFrame, raw_speech: bool) -> DetectorOutcome {
        self.preroll.push(&frame.samples);
        let energy = weighted_rms(&frame.samples);
        let threshold = self.threshold.update(energy, raw_speech);
        let was_speaking = self.state.speaking();

        match self.state.observe(raw_speech, energy, threshold) {
            SpeechTransition::Started => {
                self.begin_recording(frame);
                DetectorOutcome::SpeechStarted
            }
            SpeechTransition::Ended(reason) => {
                self.assembler.append(&frame.samples);
                self.finish_episode(reason)
            }
            SpeechTransition::None => {
                if was_speaking {
                    self.assembler.append(&frame.samples);
                }
                DetectorOutcome::Quiet
            }
        }
    }

    /// End the current episode with `reason` regardless of frame counters
    /// (watchdog timeout, session stop). No-op when not speaking.
    pub fn force_end(&mut self, reason: EndReason) -> Option<DetectorOutcome> {
        match self.state.force_end(reason) {
            Some(SpeechTransition::Ended(reason)) => Some(self.finish_episode(reason)),
            _ => None,
        }
    }

    /// Drop the in-progress episode without emitting anything.
    pub fn abort_episode(&mut self) {
        self.state.abort();
        self.assembler.clear();
    }

    /// Manual-mode step: everything is recorded, nothing is detected.
    pub fn append_manual(&mut self, frame: &AudioFrame) {
        self.preroll.push(&frame.samples);
        self.assembler.append(&frame.samples);
    }

    /// Finish a manual recording window and run the finalize policy on it.
    pub fn finish_manual(&mut self) -> DetectorOutcome {
        self.finish_episode(EndReason::Manual)
    }

    pub fn speaking(&self) -> bool {
        self.state.speaking()
    }

    pub fn recording_len(&self) -> usize {
        self.assembler.len()
    }

    pub fn current_threshold(&self) -> f32 {
        self.threshold.current()
    }

    /// Drain the pre-roll so it can be carried into the next session.
    pub fn take_preroll(&mut self) -> Vec<i16> {
        self.preroll.take()
    }

    /// Seed the pre-roll with samples carried over from a prior session.
    pub fn restore_preroll(&mut self, samples: &[i16]) {
        if !samples.is_empty() {
            self.preroll.push(samples);
        }
    }

    fn begin_recording(&mut self, frame: &AudioFrame) {
        let buffered = self.preroll.as_slice();
        let start = find_segment_start(buffered, self.analysis_frame);
        debug!(
            buffered = buffered.len(),
            start, "speech confirmed; seeding recording from pre-roll"
        );
        self.assembler.seed(&buffered[start..], &frame.samples);
    }

    fn finish_episode(&mut self, reason: EndReason) -> DetectorOutcome {
        self.threshold.reset();
        let recording = self.assembler.take();
        let raw_len = recording.len();
        match finalize(recording, &self.finalize) {
            Some(samples) => DetectorOutcome::SegmentReady { samples, reason },
            None => DetectorOutcome::SegmentDiscarded { reason, raw_len },
        }
    }
}
