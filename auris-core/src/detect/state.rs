//! Two-stage hysteresis state machine.
//!
//! Stage 1 turns the engine's raw per-frame decision into an enhanced
//! decision, overriding short energy dips while speech is already
//! confirmed. Stage 2 demands sustained evidence (a run of enhanced
//! speech frames) to enter Speaking and one of three racing silence
//! conditions to leave it: a consecutive-silence run, the episode's total
//! silence budget, or the wall-clock watchdog (reported via
//! [`SpeechStateMachine::force_end`]).

use std::collections::VecDeque;

use crate::ipc::events::EndReason;

/// Tunables for the state machine; see `MonitorConfig` for defaults.
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Consecutive enhanced-speech frames required to confirm speech.
    pub min_active_frames: usize,
    /// Consecutive silent frames that end an episode.
    pub min_silent_frames: usize,
    /// Total silent frames per episode that force an end.
    pub max_silent_frames: usize,
    /// Enhanced-decision history depth.
    pub history_len: usize,
    /// Multiplier on the adaptive threshold for the in-speech energy
    /// override.
    pub silence_multiplier: f32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            min_active_frames: 3,
            min_silent_frames: 5,
            max_silent_frames: 30,
            history_len: 10,
            silence_multiplier: 0.8,
        }
    }
}

/// Outcome of feeding one frame to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechTransition {
    /// No confirmed-state change on this frame.
    None,
    /// NotSpeaking→Speaking confirmed on this frame.
    Started,
    /// Speaking→NotSpeaking; the episode ended for the given reason.
    Ended(EndReason),
}

#[derive(Debug)]
pub struct SpeechStateMachine {
    config: StateConfig,
    speaking: bool,
    history: VecDeque<bool>,
    active_frames: usize,
    consecutive_silent: usize,
    accumulated_silent: usize,
}

impl SpeechStateMachine {
    pub fn new(config: StateConfig) -> Self {
        let history = VecDeque::with_capacity(config.history_len + 1);
        Self {
            config,
            speaking: false,
            history,
            active_frames: 0,
            consecutive_silent: 0,
            accumulated_silent: 0,
        }
    }

    /// Feed one frame: the engine's raw decision, the frame's weighted RMS
    /// energy, and the adaptive threshold after its own update.
    pub fn observe(&mut self, raw_speech: bool, energy: f32, threshold: f32) -> SpeechTransition {
        let decision = self.enhance(raw_speech, energy, threshold);

        self.history.push_back(decision);
        if self.history.len() > self.config.history_len {
            self.history.pop_front();
        }

        if decision {
            self.active_frames += 1;
        } else {
            self.active_frames = 0;
        }

        if !self.speaking {
            if decision && self.recent_all_active() {
                self.speaking = true;
                return SpeechTransition::Started;
            }
            return SpeechTransition::None;
        }

        if !decision {
            self.accumulated_silent += 1;
            let consecutive_hit = self.consecutive_silent >= self.config.min_silent_frames;
            let accumulated_hit = self.accumulated_silent >= self.config.max_silent_frames;
            if consecutive_hit || accumulated_hit {
                let reason = if consecutive_hit {
                    EndReason::Silence
                } else {
                    EndReason::SilenceBudget
                };
                self.end_episode();
                return SpeechTransition::Ended(reason);
            }
        }
        SpeechTransition::None
    }

    /// End the episode from outside the frame path (wall-clock watchdog,
    /// operator stop). Returns `None` unless currently Speaking.
    pub fn force_end(&mut self, reason: EndReason) -> Option<SpeechTransition> {
        if !self.speaking {
            return None;
        }
        self.end_episode();
        Some(SpeechTransition::Ended(reason))
    }

    /// Abandon the episode without reporting a transition (session stop,
    /// frame error).
    pub fn abort(&mut self) {
        self.speaking = false;
        self.reset_counters();
    }

    pub fn speaking(&self) -> bool {
        self.speaking
    }

    pub fn active_frames(&self) -> usize {
        self.active_frames
    }

    pub fn consecutive_silent(&self) -> usize {
        self.consecutive_silent
    }

    pub fn accumulated_silent(&self) -> usize {
        self.accumulated_silent
    }

    /// Stage 1: raw decisions pass through; while speech is confirmed, a
    /// frame whose energy still clears a fraction of the adaptive
    /// threshold is kept as speech so brief dips do not break the run.
    fn enhance(&mut self, raw_speech: bool, energy: f32, threshold: f32) -> bool {
        if raw_speech {
            self.consecutive_silent = 0;
            return true;
        }
        if self.speaking && energy > threshold * self.config.silence_multiplier {
            self.consecutive_silent = 0;
            return true;
        }
        self.consecutive_silent += 1;
        false
    }

    /// The newest `min_active_frames` history entries are all speech.
    fn recent_all_active(&self) -> bool {
        if self.history.len() < self.config.min_active_frames {
            return false;
        }
        self.history
            .iter()
            .rev()
            .take(self.config.min_active_frames)
            .all(|&decision| decision)
    }

    fn end_episode(&mut self) {
        self.speaking = false;
        self.reset_counters();
    }

    fn reset_counters(&mut self) {
        self.active_frames = 0;
        self.consecutive_silent = 0;
        self.accumulated_silent = 0;
        self.history.clear();
    }
}
