//! Frame-level speech detection: energy measurement, the adaptive silence
//! threshold, and the two-stage hysteresis state machine.

pub mod state;
pub mod threshold;

/// Weighted RMS energy of a sample slice on the raw i16 scale.
///
/// Later samples carry more weight (linear 0.5→1.0 ramp), biasing the
/// measurement toward the newest signal so decisions track where speech
/// is heading rather than where it has been.
pub fn weighted_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f32;
    let mut sum = 0.0f32;
    let mut weight_total = 0.0f32;
    for (i, &sample) in samples.iter().enumerate() {
        let weight = 0.5 + 0.5 * i as f32 / n;
        let value = sample as f32 * weight;
        sum += value * value;
        weight_total += weight;
    }
    if weight_total > 0.0 {
        (sum / weight_total).sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_rms_of_empty_slice_is_zero() {
        assert_eq!(weighted_rms(&[]), 0.0);
    }

    #[test]
    fn weighted_rms_of_silence_is_zero() {
        assert_eq!(weighted_rms(&[0; 160]), 0.0);
    }

    #[test]
    fn weighted_rms_grows_with_amplitude() {
        let quiet = weighted_rms(&[100; 160]);
        let loud = weighted_rms(&[3_000; 160]);
        assert!(quiet > 0.0);
        assert!(loud > quiet * 20.0);
    }

    #[test]
    fn weighted_rms_favors_the_newest_samples() {
        let mut rising = vec![0i16; 80];
        rising.extend(std::iter::repeat(2_000i16).take(80));
        let mut falling = rising.clone();
        falling.reverse();

        assert!(weighted_rms(&rising) > weighted_rms(&falling));
    }
}
