//! Rolling pre-roll store and the segment start search.
//!
//! The store is fed on every frame regardless of speaking state, so when
//! speech is confirmed a few frames late the utterance onset is still in
//! hand. On the NotSpeaking→Speaking transition the recording is seeded
//! from here, starting at an index chosen by [`find_segment_start`].

use crate::detect::weighted_rms;

/// Energy above which a pre-roll frame counts as candidate activity.
const ACTIVITY_THRESHOLD: f32 = 350.0;
/// Floor for the adaptive confirmation threshold.
const CONFIRM_FLOOR: f32 = 600.0;
/// Confirmation threshold as a multiple of the buffer's average energy.
const CONFIRM_FACTOR: f32 = 1.5;
/// Frames kept before a confirmed speech onset.
const CONFIRM_BACKTRACK_FRAMES: usize = 3;
/// Frames kept before an unconfirmed candidate onset.
const ACTIVITY_BACKTRACK_FRAMES: usize = 2;
/// Newest frames kept when the buffer holds no activity at all.
const SEED_TAIL_FRAMES: usize = 10;

/// Bounded FIFO of the most recent mono i16 samples.
///
/// Length never exceeds the configured capacity: pushing past it evicts
/// the oldest samples first.
#[derive(Debug)]
pub struct PrerollBuffer {
    samples: Vec<i16>,
    capacity: usize,
}

impl PrerollBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest samples once full.
    pub fn push(&mut self, frame: &[i16]) {
        if frame.len() >= self.capacity {
            self.samples.clear();
            self.samples
                .extend_from_slice(&frame[frame.len() - self.capacity..]);
            return;
        }
        let overflow = (self.samples.len() + frame.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.samples.drain(..overflow);
        }
        self.samples.extend_from_slice(frame);
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Hand the buffered samples to a successor session.
    pub fn take(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }
}

/// Choose where in the pre-roll a new recording should begin.
///
/// Two passes over `buffer` in `analysis_frame`-sized steps:
///
/// 1. Find the first frame above [`ACTIVITY_THRESHOLD`] and the buffer's
///    average frame energy. No such frame means the buffer is ambient
///    noise only and the seed shrinks to the newest
///    [`SEED_TAIL_FRAMES`] frames.
/// 2. Re-scan at half-frame steps from just before the candidate, looking
///    for the first frame above the adaptive confirmation threshold.
///    Confirmed onsets keep [`CONFIRM_BACKTRACK_FRAMES`] frames of lead-in,
///    unconfirmed ones [`ACTIVITY_BACKTRACK_FRAMES`].
pub fn find_segment_start(buffer: &[i16], analysis_frame: usize) -> usize {
    if buffer.is_empty() {
        return 0;
    }
    let frame = analysis_frame.max(1);

    let mut first_activity = None;
    let mut total_energy = 0.0f32;
    let mut frame_count = 0usize;

    let mut i = 0;
    while i < buffer.len() {
        let end = (i + frame).min(buffer.len());
        // Skip a trailing sliver too short to measure meaningfully.
        if end - i < frame / 3 {
            break;
        }
        let energy = weighted_rms(&buffer[i..end]);
        total_energy += energy;
        frame_count += 1;
        if energy > ACTIVITY_THRESHOLD && first_activity.is_none() {
            first_activity = Some(i);
        }
        i += frame;
    }

    let Some(first_activity) = first_activity else {
        return buffer.len().saturating_sub(SEED_TAIL_FRAMES * frame);
    };

    let avg_energy = if frame_count > 0 {
        total_energy / frame_count as f32
    } else {
        0.0
    };
    let confirm_threshold = CONFIRM_FLOOR.max(avg_energy * CONFIRM_FACTOR);

    let step = (frame / 2).max(1);
    let mut i = first_activity.saturating_sub(frame);
    while i < buffer.len() {
        let end = (i + frame).min(buffer.len());
        if weighted_rms(&buffer[i..end]) > confirm_threshold {
            return i.saturating_sub(CONFIRM_BACKTRACK_FRAMES * frame);
        }
        i += step;
    }

    first_activity.saturating_sub(ACTIVITY_BACKTRACK_FRAMES * frame)
}
