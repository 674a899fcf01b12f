//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated
//! (TIME_CRITICAL on Windows) priority. It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module satisfies that contract by writing directly into an SPSC
//! ring buffer producer whose `push_slice` is lock-free and
//! allocation-free. The downmix scratch buffer is retained across
//! callbacks, so it stops allocating once it has seen the largest
//! callback size.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio
//! on macOS). `AudioCapture` therefore must be created and dropped on the
//! same thread. The pipeline accomplishes this by calling
//! `open_with_preference` inside `spawn_blocking`.

pub mod device;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::{AudioProducer, Producer},
    error::{AurisError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to signal the callback to no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

/// Map a backend failure message onto the capture error kinds, promoting
/// OS permission refusals to their own variant.
#[cfg(feature = "audio-cpal")]
fn capture_error(message: String) -> AurisError {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("permission") || lowered.contains("access denied") {
        AurisError::PermissionDenied
    } else {
        AurisError::CaptureStart(message)
    }
}

/// Average interleaved channels into mono f32 samples.
///
/// `mix_buf` is resized, never shrunk, so steady-state callbacks reuse
/// the same allocation.
#[cfg(feature = "audio-cpal")]
fn mix_to_mono<S: Copy>(
    data: &[S],
    channels: usize,
    mix_buf: &mut Vec<f32>,
    to_f32: impl Fn(S) -> f32,
) {
    let frames = data.len() / channels;
    mix_buf.resize(frames, 0.0);
    if channels == 1 {
        for (idx, sample) in data.iter().take(frames).enumerate() {
            mix_buf[idx] = to_f32(*sample);
        }
    } else {
        for frame in 0..frames {
            let mut sum = 0f32;
            let base = frame * channels;
            for channel in 0..channels {
                sum += to_f32(data[base + channel]);
            }
            mix_buf[frame] = sum / channels as f32;
        }
    }
}

#[cfg(feature = "audio-cpal")]
fn push_mono(producer: &mut AudioProducer, samples: &[f32], format: &str) {
    let written = producer.push_slice(samples);
    if written < samples.len() {
        warn!(
            "ring buffer full: dropped {} {format} frames",
            samples.len() - written
        );
    }
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|candidate| {
                        candidate
                            .name()
                            .map(|name| device::matches_preference(&name, preferred_name))
                            .unwrap_or(false)
                    });

                    if selected_device.is_none() {
                        warn!(
                            "preferred input device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| AurisError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(AurisError::NoInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| AurisError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Pre-clone one Arc per sample format branch so each closure owns its flag.
        let running_f32 = Arc::clone(&running);
        let running_i16 = Arc::clone(&running);
        let running_u8 = Arc::clone(&running);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let ch = channels as usize;
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running_f32.load(Ordering::Relaxed) {
                            return;
                        }
                        if ch == 1 {
                            // Mono fast path: no conversion needed at all.
                            push_mono(&mut producer, data, "f32");
                            return;
                        }
                        mix_to_mono(data, ch, &mut mix_buf, |sample| sample);
                        push_mono(&mut producer, &mix_buf, "f32");
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I16 => {
                let ch = channels as usize;
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running_i16.load(Ordering::Relaxed) {
                            return;
                        }
                        mix_to_mono(data, ch, &mut mix_buf, |sample| sample as f32 / 32_768.0);
                        push_mono(&mut producer, &mix_buf, "i16");
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::U8 => {
                let ch = channels as usize;
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _info| {
                        if !running_u8.load(Ordering::Relaxed) {
                            return;
                        }
                        mix_to_mono(data, ch, &mut mix_buf, |sample| {
                            (sample as f32 - 128.0) / 128.0
                        });
                        push_mono(&mut producer, &mix_buf, "u8");
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(AurisError::CaptureStart(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| capture_error(e.to_string()))?;

        stream.play().map_err(|e| capture_error(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Open the system default microphone and push f32 PCM frames into
    /// `producer`.
    ///
    /// Must be called from the thread that will also drop this value.
    /// In practice this means calling it inside `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    /// Returns `AurisError::NoInputDevice` when no microphone is available,
    /// `AurisError::PermissionDenied` when the OS refuses microphone
    /// access, or `AurisError::CaptureStart` if cpal fails to build the
    /// stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(AurisError::CaptureStart(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(all(test, feature = "audio-cpal"))]
mod tests {
    use super::*;

    #[test]
    fn mix_to_mono_averages_interleaved_channels() {
        let data = [0.2f32, 0.4, -0.5, 0.5];
        let mut mix_buf = Vec::new();
        mix_to_mono(&data, 2, &mut mix_buf, |sample| sample);
        assert_eq!(mix_buf.len(), 2);
        assert!((mix_buf[0] - 0.3).abs() < 1e-6);
        assert!(mix_buf[1].abs() < 1e-6);
    }

    #[test]
    fn mix_to_mono_converts_mono_without_averaging() {
        let data = [16_384i16, -16_384];
        let mut mix_buf = Vec::new();
        mix_to_mono(&data, 1, &mut mix_buf, |sample| sample as f32 / 32_768.0);
        assert_eq!(mix_buf, vec![0.5, -0.5]);
    }

    #[test]
    fn permission_failures_get_their_own_variant() {
        assert!(matches!(
            capture_error("Operation not permitted: permission denied".into()),
            AurisError::PermissionDenied
        ));
        assert!(matches!(
            capture_error("device busy".into()),
            AurisError::CaptureStart(_)
        ));
    }
}
