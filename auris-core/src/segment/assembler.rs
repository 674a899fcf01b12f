//! Crossfading recording assembler.
//!
//! Frames are appended with a short linear crossfade over the previous
//! frame's tail so stitched playback carries no boundary clicks. The
//! overlap shrinks to the shortest adjacent frame and a zero overlap
//! degrades to plain concatenation.

/// Accumulates the in-progress utterance.
#[derive(Debug)]
pub struct RecordingAssembler {
    overlap: usize,
    recording: Vec<i16>,
    /// Newest appended frame, kept as crossfade memory. Empty means the
    /// next append has nothing to blend against.
    last_frame: Vec<i16>,
}

impl RecordingAssembler {
    pub fn new(overlap: usize) -> Self {
        Self {
            overlap,
            recording: Vec::new(),
            last_frame: Vec::new(),
        }
    }

    /// Begin a new recording from pre-roll samples. `tail_frame` is the
    /// newest captured frame (already inside `seed`), remembered so the
    /// next append blends against it.
    pub fn seed(&mut self, seed: &[i16], tail_frame: &[i16]) {
        self.recording.clear();
        self.recording.extend_from_slice(seed);
        self.last_frame.clear();
        self.last_frame.extend_from_slice(tail_frame);
    }

    /// Append one frame, crossfading over the boundary with the frame
    /// before it.
    pub fn append(&mut self, frame: &[i16]) {
        if frame.is_empty() {
            return;
        }

        let overlap = self
            .overlap
            .min(self.last_frame.len())
            .min(frame.len())
            .min(self.recording.len());

        if overlap > 0 {
            let last_tail = self.last_frame.len() - overlap;
            let recording_tail = self.recording.len() - overlap;
            for i in 0..overlap {
                let fade_out = (overlap - i) as f32 / overlap as f32;
                let fade_in = i as f32 / overlap as f32;
                let previous = self.last_frame[last_tail + i] as f32;
                let incoming = frame[i] as f32;
                // A convex blend of two i16 values stays on the i16 scale.
                self.recording[recording_tail + i] =
                    (previous * fade_out + incoming * fade_in) as i16;
            }
            self.recording.extend_from_slice(&frame[overlap..]);
        } else {
            self.recording.extend_from_slice(frame);
        }

        self.last_frame.clear();
        self.last_frame.extend_from_slice(frame);
    }

    /// Take the finished recording, clearing all state.
    pub fn take(&mut self) -> Vec<i16> {
        self.last_frame.clear();
        std::mem::take(&mut self.recording)
    }

    /// Drop any in-progress recording.
    pub fn clear(&mut self) {
        self.recording.clear();
        self.last_frame.clear();
    }

    pub fn len(&self) -> usize {
        self.recording.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recording.is_empty()
    }

    pub fn samples(&self) -> &[i16] {
        &self.recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_append_is_verbatim() {
        let mut assembler = RecordingAssembler::new(10);
        assembler.append(&[1, 2, 3, 4]);
        assert_eq!(assembler.samples(), &[1, 2, 3, 4]);
    }

    #[test]
    fn crossfade_starts_at_the_previous_frame_and_fades_to_the_new_one() {
        let mut assembler = RecordingAssembler::new(4);
        assembler.append(&[1_000; 8]);
        assembler.append(&[-1_000; 8]);

        // Blended tail of the first frame: index 0 is still purely the
        // previous frame; later indices lean toward the new one.
        let samples = assembler.samples();
        assert_eq!(samples.len(), 8 + 8 - 4);
        assert_eq!(samples[4], 1_000);
        assert_eq!(samples[5], 500); // 1000*0.75 + (-1000)*0.25
        assert_eq!(samples[6], 0); // 1000*0.5  + (-1000)*0.5
        assert_eq!(samples[7], -500); // 1000*0.25 + (-1000)*0.75
        assert_eq!(samples[8], -1_000);
    }

    #[test]
    fn overlap_shrinks_to_the_shorter_frame() {
        let mut assembler = RecordingAssembler::new(10);
        assembler.append(&[100; 20]);
        assembler.append(&[-100; 3]);
        // Only 3 samples blended, none dropped.
        assert_eq!(assembler.len(), 20);
        assembler.append(&[50; 20]);
        assert_eq!(assembler.len(), 20 + 20 - 3);
    }

    #[test]
    fn seed_replaces_state_and_blends_against_the_tail_frame() {
        let mut assembler = RecordingAssembler::new(2);
        assembler.append(&[9; 6]);

        assembler.seed(&[1_000; 6], &[1_000; 4]);
        assembler.append(&[-1_000; 4]);

        let samples = assembler.samples();
        assert_eq!(samples.len(), 6 + 4 - 2);
        assert_eq!(samples[4], 1_000); // fade-out weight 1.0
        assert_eq!(samples[5], 0); // halfway blend
        assert_eq!(samples[6], -1_000);
    }

    #[test]
    fn take_returns_the_recording_and_resets() {
        let mut assembler = RecordingAssembler::new(4);
        assembler.append(&[7; 12]);
        let recording = assembler.take();
        assert_eq!(recording.len(), 12);
        assert!(assembler.is_empty());

        // Crossfade memory is gone: the next append is verbatim again.
        assembler.append(&[3; 5]);
        assert_eq!(assembler.samples(), &[3; 5]);
    }

    #[test]
    fn zero_overlap_concatenates() {
        let mut assembler = RecordingAssembler::new(0);
        assembler.append(&[1; 4]);
        assembler.append(&[2; 4]);
        assert_eq!(assembler.samples(), &[1, 1, 1, 1, 2, 2, 2, 2]);
    }
}
