//! `SpeechMonitor` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! SpeechMonitor::new(config, engine)
//!     └─► start()        → audio open, pipeline spawned, status = Listening
//!         └─► stop()     → running=false, pipeline drains, status = Stopped
//! ```
//!
//! `start()`, `start_manual()` and `stop()` are idempotent: calling them
//! in the state they already produced is a logged no-op, not an error.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). `AudioCapture` is therefore created *inside* the
//! `spawn_blocking` closure so it never crosses a thread boundary. A sync
//! oneshot channel propagates any open-device errors back to the
//! `start()` caller; a second channel signals pipeline exit so `stop()`
//! and `swap_engine()` can wait for the wind-down.

pub mod detector;
pub mod pipeline;
pub mod volume;
pub mod watchdog;

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::AudioCapture,
    buffering::create_audio_ring,
    detect::state::StateConfig,
    error::Result,
    ipc::events::{
        MonitorErrorEvent, MonitorStatus, MonitorStatusEvent, UtteranceEvent, VoiceActivityEvent,
    },
    segment::finalize::FinalizeConfig,
    vad::EngineHandle,
};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// How long `stop()` waits for the pipeline thread to confirm its exit.
const PIPELINE_WIND_DOWN: Duration = Duration::from_secs(2);

/// Configuration for `SpeechMonitor`.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pre-roll capacity in samples (1.5 s at 16 kHz). Default: 24000.
    pub preroll_samples: usize,
    /// Samples crossfaded at each frame boundary. Default: 10.
    pub frame_overlap: usize,
    /// Consecutive enhanced-speech frames required to confirm speech.
    /// Default: 3.
    pub min_active_frames: usize,
    /// Consecutive silent frames that end an episode. Default: 5.
    pub min_silent_frames: usize,
    /// Total silent frames per episode that force an end. Default: 30.
    pub max_silent_frames: usize,
    /// Minimum recording length in analysis frames; shorter episodes are
    /// discarded as spurious triggers. Default: 30 (4800 samples).
    pub min_recording_frames: usize,
    /// Enhanced-decision history depth. Default: 10.
    pub vad_history: usize,
    /// Multiplier on the adaptive threshold for the in-speech energy
    /// override. Default: 0.8.
    pub silence_multiplier: f32,
    /// Adaptive threshold base, on the raw i16 energy scale. Default: 350.
    pub base_threshold: f32,
    /// Adaptive threshold upper cap. Default: 1500.
    pub threshold_cap: f32,
    /// Analysis frame in samples for the start search, trim scan and
    /// length gate. Default: 160 (10 ms at 16 kHz).
    pub analysis_frame: usize,
    /// Analysis frames kept after the last speech when trimming.
    /// Default: 5.
    pub trim_keep_frames: usize,
    /// Wall-clock silence timeout backing the frame-driven end conditions.
    /// Default: 2 s.
    pub silence_timeout: Duration,
    /// Minimum interval between volume publishes. Default: 100 ms.
    pub volume_interval: Duration,
    /// Minimum volume change worth publishing. Default: 0.05.
    pub volume_change_threshold: f32,
    /// Clear the pre-roll when monitoring stops (`true`), or carry it into
    /// the next session so speech right after a restart keeps its onset
    /// (`false`). Default: `true`.
    pub clear_preroll_on_stop: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            preroll_samples: 24_000,
            frame_overlap: 10,
            min_active_frames: 3,
            min_silent_frames: 5,
            max_silent_frames: 30,
            min_recording_frames: 30,
            vad_history: 10,
            silence_multiplier: 0.8,
            base_threshold: 350.0,
            threshold_cap: 1_500.0,
            analysis_frame: 160,
            trim_keep_frames: 5,
            silence_timeout: Duration::from_secs(2),
            volume_interval: Duration::from_millis(100),
            volume_change_threshold: 0.05,
            clear_preroll_on_stop: true,
        }
    }
}

impl MonitorConfig {
    pub(crate) fn state_config(&self) -> StateConfig {
        StateConfig {
            min_active_frames: self.min_active_frames,
            min_silent_frames: self.min_silent_frames,
            max_silent_frames: self.max_silent_frames,
            history_len: self.vad_history,
            silence_multiplier: self.silence_multiplier,
        }
    }

    pub(crate) fn finalize_config(&self) -> FinalizeConfig {
        FinalizeConfig {
            analysis_frame: self.analysis_frame,
            min_recording_frames: self.min_recording_frames,
            trim_keep_frames: self.trim_keep_frames,
        }
    }
}

/// The top-level monitor handle.
///
/// `SpeechMonitor` is `Send + Sync` — all fields use interior mutability.
/// Wrap in `Arc<SpeechMonitor>` to share between host state and
/// event-forwarding async tasks.
pub struct SpeechMonitor {
    config: MonitorConfig,
    /// Currently installed VAD engine; replaced whole by `swap_engine`.
    engine: Mutex<EngineHandle>,
    /// `true` while capture + pipeline are active.
    running: Arc<AtomicBool>,
    /// `true` while the active session is a manual recording window.
    manual: Arc<AtomicBool>,
    /// `true` while speech is confirmed (mirror of the pipeline state).
    speaking: Arc<AtomicBool>,
    /// Latest perceptual volume as f32 bits.
    volume_bits: Arc<AtomicU32>,
    /// Canonical status (written atomically via Mutex, read from commands).
    status: Arc<Mutex<MonitorStatus>>,
    /// Broadcast sender for finished utterances.
    utterance_tx: broadcast::Sender<UtteranceEvent>,
    /// Broadcast sender for status events.
    status_tx: broadcast::Sender<MonitorStatusEvent>,
    /// Broadcast sender for live speaking / volume activity events.
    activity_tx: broadcast::Sender<VoiceActivityEvent>,
    /// Broadcast sender for recoverable fault events.
    error_tx: broadcast::Sender<MonitorErrorEvent>,
    /// Monotonically increasing event sequence counter.
    seq: Arc<AtomicU64>,
    /// Shared pipeline diagnostics counters.
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    /// Signalled by the pipeline thread when it exits; present while a
    /// session is (or was) active.
    done_rx: Mutex<Option<crossbeam_channel::Receiver<()>>>,
    /// Pre-roll samples carried across sessions when the policy preserves
    /// them.
    preroll_carry: Arc<Mutex<Vec<i16>>>,
}

impl SpeechMonitor {
    /// Create a new monitor. Does not start capturing — call `start()`.
    pub fn new(config: MonitorConfig, engine: EngineHandle) -> Self {
        let (utterance_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (error_tx, _) = broadcast::channel(BROADCAST_CAP);
        let diagnostics = Arc::new(pipeline::PipelineDiagnostics::default());

        Self {
            config,
            engine: Mutex::new(engine),
            running: Arc::new(AtomicBool::new(false)),
            manual: Arc::new(AtomicBool::new(false)),
            speaking: Arc::new(AtomicBool::new(false)),
            volume_bits: Arc::new(AtomicU32::new(0f32.to_bits())),
            status: Arc::new(Mutex::new(MonitorStatus::Idle)),
            utterance_tx,
            status_tx,
            activity_tx,
            error_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics,
            done_rx: Mutex::new(None),
            preroll_carry: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start listening with voice activity detection.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then
    /// returns. The pipeline continues running in a background blocking
    /// thread. Already listening is a no-op.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start listening using a preferred input device name.
    ///
    /// If `preferred_input_device` is `None`, default input selection is
    /// used.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        self.launch(preferred_input_device, false)
    }

    /// Start a manual recording window: capture without detection, the
    /// entire window becoming one utterance candidate on `stop()`.
    pub fn start_manual(&self) -> Result<()> {
        self.launch(None, true)
    }

    /// Stop the active session.
    ///
    /// Waits for the pipeline thread to wind down, which for a manual
    /// window includes finalizing and emitting the recording. Already
    /// stopped is a no-op.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            info!("monitor already stopped; stop request is a no-op");
            return Ok(());
        }

        self.running.store(false, Ordering::SeqCst);
        self.wait_pipeline_done();
        self.manual.store(false, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);
        self.volume_bits.store(0f32.to_bits(), Ordering::SeqCst);
        self.set_status(MonitorStatus::Stopped, None);
        info!("monitor stopped");
        Ok(())
    }

    /// Flip between listening and stopped.
    pub fn toggle(&self) -> Result<()> {
        if self.listening() {
            self.stop()
        } else {
            self.start()
        }
    }

    /// Swap the VAD engine: stop capture if needed, wait for the pipeline
    /// to wind down, dispose the old engine, install the new one, and
    /// restart detection if the monitor was listening.
    pub fn swap_engine(&self, new_engine: EngineHandle) -> Result<()> {
        let was_listening = self.running.load(Ordering::SeqCst);
        if was_listening {
            self.stop()?;
        }

        let old_engine = {
            let mut slot = self.engine.lock();
            std::mem::replace(&mut *slot, new_engine)
        };
        old_engine.0.lock().dispose();
        info!(restart = was_listening, "VAD engine swapped");

        if was_listening {
            self.start()
        } else {
            Ok(())
        }
    }

    /// `true` while capture + pipeline are active.
    pub fn listening(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// `true` while speech is currently confirmed.
    pub fn speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Latest perceptual volume in [0.0, 1.0].
    pub fn voice_volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::SeqCst))
    }

    /// Current monitor status (snapshot).
    pub fn status(&self) -> MonitorStatus {
        *self.status.lock()
    }

    /// The active configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Subscribe to finished utterances.
    pub fn subscribe_utterances(&self) -> broadcast::Receiver<UtteranceEvent> {
        self.utterance_tx.subscribe()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<MonitorStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to live voice activity events (speaking flips + volume).
    pub fn subscribe_activity(&self) -> broadcast::Receiver<VoiceActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Subscribe to recoverable fault events.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<MonitorErrorEvent> {
        self.error_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn pipeline_diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn launch(&self, preferred_input_device: Option<String>, manual: bool) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            info!("monitor already listening; start request is a no-op");
            return Ok(());
        }

        let engine = self.engine.lock().clone();
        let (frame_length, engine_rate) = engine.geometry();
        // A previous session may have left window state behind.
        engine.0.lock().reset();

        self.diagnostics.reset();
        self.manual.store(manual, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        self.set_status(MonitorStatus::Listening, None);

        let (producer, consumer) = create_audio_ring();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        *self.done_rx.lock() = Some(done_rx);

        // Clone all Arc-wrapped state before moving into the closure.
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let manual_flag = Arc::clone(&self.manual);
        let speaking = Arc::clone(&self.speaking);
        let volume_bits = Arc::clone(&self.volume_bits);
        let utterance_tx = self.utterance_tx.clone();
        let activity_tx = self.activity_tx.clone();
        let error_tx = self.error_tx.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);
        let preroll_carry = Arc::clone(&self.preroll_carry);

        // Sync oneshot: pipeline thread signals open success/failure to
        // the caller. Carries the actual capture sample rate on success.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            // ── Open audio device (must happen on THIS thread — cpal::Stream is !Send) ──
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&running),
                preferred_input_device.as_deref(),
            ) {
                Ok(capture) => {
                    let _ = open_tx.send(Ok(capture.sample_rate));
                    capture
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    let _ = done_tx.send(());
                    return;
                }
            };

            let capture_sample_rate = capture.sample_rate;

            // ── Run pipeline ──────────────────────────────────────────────────────────
            pipeline::run(pipeline::PipelineContext {
                config,
                engine,
                frame_length,
                engine_rate,
                consumer,
                running,
                manual: manual_flag,
                speaking,
                volume_bits,
                utterance_tx,
                activity_tx,
                error_tx,
                seq,
                capture_sample_rate,
                diagnostics,
                preroll_carry,
            });

            // Stream drops here, releasing the audio device on this thread.
            drop(capture);
            let _ = done_tx.send(());
        });

        // Block until device open is confirmed (receives actual sample rate).
        match open_rx.recv() {
            Ok(Ok(_rate)) => {
                info!(manual, "monitor started — listening");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.manual.store(false, Ordering::SeqCst);
                *self.done_rx.lock() = None;
                self.set_status(MonitorStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent — spawn_blocking panicked?
                self.running.store(false, Ordering::SeqCst);
                self.manual.store(false, Ordering::SeqCst);
                *self.done_rx.lock() = None;
                self.set_status(MonitorStatus::Error, Some("pipeline failed to start".into()));
                Err(crate::error::AurisError::Other(anyhow::anyhow!(
                    "pipeline task died unexpectedly"
                )))
            }
        }
    }

    fn wait_pipeline_done(&self) {
        let done_rx = self.done_rx.lock().take();
        if let Some(done_rx) = done_rx {
            if done_rx.recv_timeout(PIPELINE_WIND_DOWN).is_err() {
                warn!(
                    "pipeline did not confirm exit within {:?}",
                    PIPELINE_WIND_DOWN
                );
            }
        }
    }

    fn set_status(&self, new_status: MonitorStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(MonitorStatusEvent {
            status: new_status,
            detail,
        });
    }
}
