//! Episode finalization: the minimum-length gate, trailing-silence trim,
//! and peak normalization.

use crate::detect::weighted_rms;

/// Fraction of the recording's average energy used as the trim threshold.
const TRIM_ENERGY_FACTOR: f32 = 0.12;
/// Bounds on the derived trim threshold.
const TRIM_THRESHOLD_FLOOR: f32 = 250.0;
const TRIM_THRESHOLD_CEILING: f32 = 800.0;
/// Peaks inside this band are left untouched by normalization.
const PEAK_FLOOR: f32 = 100.0;
const PEAK_CEILING: f32 = 32_000.0;
/// Peak level recordings are rescaled to.
const TARGET_PEAK: f32 = 24_000.0;

/// Policy knobs for finalization; see `MonitorConfig` for defaults.
#[derive(Debug, Clone)]
pub struct FinalizeConfig {
    /// Analysis frame in samples for the length gate and trim scan.
    pub analysis_frame: usize,
    /// Minimum recording length in analysis frames.
    pub min_recording_frames: usize,
    /// Analysis frames kept after the last speech when trimming.
    pub trim_keep_frames: usize,
}

/// Run the full policy on a finished recording. Returns `None` when the
/// recording is shorter than the minimum length (a spurious trigger).
pub fn finalize(recording: Vec<i16>, config: &FinalizeConfig) -> Option<Vec<i16>> {
    let min_samples = config.min_recording_frames * config.analysis_frame;
    if recording.len() < min_samples {
        return None;
    }
    let trimmed = trim_trailing_silence(recording, config);
    Some(normalize_levels(trimmed))
}

/// Cut trailing silence using a threshold derived from the recording's own
/// average energy. Recordings of two analysis frames or fewer pass through
/// untouched.
pub fn trim_trailing_silence(mut recording: Vec<i16>, config: &FinalizeConfig) -> Vec<i16> {
    let frame = config.analysis_frame.max(1);
    if recording.len() <= 2 * frame {
        return recording;
    }

    let mut total_energy = 0.0f32;
    let mut frames = 0usize;
    let mut i = 0;
    while i + frame <= recording.len() {
        total_energy += weighted_rms(&recording[i..i + frame]);
        frames += 1;
        i += frame;
    }
    let avg_energy = if frames > 0 {
        total_energy / frames as f32
    } else {
        0.0
    };
    let threshold = (avg_energy * TRIM_ENERGY_FACTOR)
        .clamp(TRIM_THRESHOLD_FLOOR, TRIM_THRESHOLD_CEILING);

    // Scan backward for the last frame still above the threshold. Finding
    // none leaves the recording untrimmed.
    let mut last_speech_end = recording.len();
    let mut i = recording.len() as isize - frame as isize;
    while i >= 0 {
        let start = i as usize;
        let end = (start + frame).min(recording.len());
        if weighted_rms(&recording[start..end]) > threshold {
            last_speech_end = end;
            break;
        }
        i -= frame as isize;
    }

    let end_position = (last_speech_end + frame * config.trim_keep_frames).min(recording.len());
    recording.truncate(end_position);
    recording
}

/// Rescale to a healthy peak when the recording's peak falls outside the
/// accepted band; values are clipped at ±32767. All-zero recordings pass
/// through unscaled.
pub fn normalize_levels(samples: Vec<i16>) -> Vec<i16> {
    if samples.is_empty() {
        return samples;
    }
    let peak = samples
        .iter()
        .map(|&sample| (sample as f32).abs())
        .fold(0.0f32, f32::max);
    if (PEAK_FLOOR..=PEAK_CEILING).contains(&peak) {
        return samples;
    }
    let scale = if peak > 0.0 { TARGET_PEAK / peak } else { 1.0 };
    samples
        .into_iter()
        .map(|sample| {
            let scaled = sample as f32 * scale;
            scaled.clamp(-32_767.0, 32_767.0) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FinalizeConfig {
        FinalizeConfig {
            analysis_frame: 160,
            min_recording_frames: 30,
            trim_keep_frames: 5,
        }
    }

    #[test]
    fn recordings_below_the_minimum_are_discarded() {
        let short = vec![1_000i16; 20];
        assert!(finalize(short, &config()).is_none());

        let boundary = vec![1_000i16; 30 * 160];
        assert!(finalize(boundary, &config()).is_some());
    }

    #[test]
    fn trailing_silence_is_cut_but_a_tail_margin_is_kept() {
        // 40 frames of speech followed by 60 frames of silence.
        let mut recording = vec![4_000i16; 40 * 160];
        recording.extend(std::iter::repeat(0i16).take(60 * 160));

        let trimmed = trim_trailing_silence(recording, &config());
        assert_eq!(trimmed.len(), 40 * 160 + 5 * 160);
    }

    #[test]
    fn quiet_recordings_are_not_trimmed() {
        let recording = vec![50i16; 20 * 160];
        let trimmed = trim_trailing_silence(recording.clone(), &config());
        assert_eq!(trimmed.len(), recording.len());
    }

    #[test]
    fn tiny_recordings_pass_through_the_trim() {
        let recording = vec![0i16; 320];
        let trimmed = trim_trailing_silence(recording.clone(), &config());
        assert_eq!(trimmed, recording);
    }

    #[test]
    fn quiet_recordings_are_amplified_to_the_target_peak() {
        let samples = vec![0, 50, -50, 25];
        let normalized = normalize_levels(samples);
        let peak = normalized.iter().map(|&s| (s as i32).abs()).max();
        assert_eq!(peak, Some(24_000));
    }

    #[test]
    fn clipping_recordings_are_attenuated() {
        let samples = vec![32_500i16, -32_500, 16_250];
        let normalized = normalize_levels(samples);
        assert!((normalized[0] - 24_000).abs() <= 1, "got {}", normalized[0]);
        assert!((normalized[1] + 24_000).abs() <= 1, "got {}", normalized[1]);
        assert!((normalized[2] - 12_000).abs() <= 1, "got {}", normalized[2]);
    }

    #[test]
    fn healthy_recordings_pass_through_unchanged() {
        let samples = vec![12_000i16, -9_000, 3_000];
        assert_eq!(normalize_levels(samples.clone()), samples);
    }

    #[test]
    fn silent_recordings_stay_silent() {
        let samples = vec![0i16; 1_000];
        assert_eq!(normalize_levels(samples.clone()), samples);
    }

    #[test]
    fn finalized_output_peak_lands_in_the_accepted_band() {
        let mut recording = vec![30i16; 40 * 160];
        recording[100] = 60;
        let finalized = finalize(recording, &config()).expect("long enough");
        let peak = finalized.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0);
        assert!((100..=32_000).contains(&peak), "peak {peak} outside band");
    }
}
