//! Typed audio frames passed from the ring buffer to the detection stages.

/// A contiguous block of mono 16-bit PCM samples at a known sample rate.
///
/// Allocated once per frame (on the non-RT pipeline thread).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Mono signed 16-bit samples.
    pub samples: Vec<i16>,
    /// Sample rate in Hz (dictated by the active VAD engine).
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Map a [-1.0, 1.0] float sample onto the i16 scale, saturating outside it.
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Slices the resampled f32 stream into engine-length i16 frames.
///
/// Capture hands the pipeline arbitrarily sized chunks while VAD engines
/// declare a fixed frame length. Leftover samples persist across calls
/// until the next chunk completes them.
#[derive(Debug)]
pub struct FrameSlicer {
    frame_len: usize,
    sample_rate: u32,
    pending: Vec<i16>,
}

impl FrameSlicer {
    pub fn new(frame_len: usize, sample_rate: u32) -> Self {
        Self {
            frame_len: frame_len.max(1),
            sample_rate,
            pending: Vec::with_capacity(frame_len.max(1) * 2),
        }
    }

    /// Convert and buffer `samples`, returning every complete frame now
    /// available.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.reserve(samples.len());
        for &sample in samples {
            self.pending.push(sample_to_i16(sample));
        }

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let head = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(head, self.sample_rate));
        }
        frames
    }

    /// Samples still waiting for the next full frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
