//! Blocking pipeline loop.
//!
//! ## Pipeline stages (per iteration)
//!
//! ```text
//! 1. Poll the silence watchdog; a latched timeout force-ends the episode
//! 2. Drain ring buffer → Vec<f32> (one chunk per iteration)
//! 3. Resample to the engine rate, slice into engine-length i16 frames
//! 4. Per frame: VAD engine decision → SpeechDetector::advance
//! 5. SpeechStarted  → mark speaking, open a tracing span, arm watchdog
//!    SegmentReady   → broadcast UtteranceEvent
//!    SegmentDiscarded → count it, log it, emit nothing
//! 6. Publish throttled volume / speaking flips on the activity channel
//! ```
//!
//! This entire loop runs in `spawn_blocking`, keeping the Tokio async
//! executor free for the host's own work (IPC, file system, UI).

use std::sync::OnceLock;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Span};

use crate::{
    audio::resample::RateAdapter,
    buffering::{
        frame::{AudioFrame, FrameSlicer},
        AudioConsumer, Consumer,
    },
    error::{AurisError, Result},
    ipc::events::{
        EndReason, MonitorErrorEvent, RecordedAudio, UtteranceEvent, VoiceActivityEvent,
    },
    monitor::{
        detector::{DetectorOutcome, SpeechDetector},
        volume::VolumeTracker,
        watchdog::SilenceWatchdog,
        MonitorConfig,
    },
    vad::EngineHandle,
};

pub struct PipelineDiagnostics {
    pub samples_in: AtomicUsize,
    pub frames_processed: AtomicUsize,
    pub frame_errors: AtomicUsize,
    pub episodes_started: AtomicUsize,
    pub segments_emitted: AtomicUsize,
    pub segments_discarded: AtomicUsize,
    pub watchdog_fires: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            samples_in: AtomicUsize::new(0),
            frames_processed: AtomicUsize::new(0),
            frame_errors: AtomicUsize::new(0),
            episodes_started: AtomicUsize::new(0),
            segments_emitted: AtomicUsize::new(0),
            segments_discarded: AtomicUsize::new(0),
            watchdog_fires: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.samples_in.store(0, Ordering::Relaxed);
        self.frames_processed.store(0, Ordering::Relaxed);
        self.frame_errors.store(0, Ordering::Relaxed);
        self.episodes_started.store(0, Ordering::Relaxed);
        self.segments_emitted.store(0, Ordering::Relaxed);
        self.segments_discarded.store(0, Ordering::Relaxed);
        self.watchdog_fires.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            samples_in: self.samples_in.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            episodes_started: self.episodes_started.load(Ordering::Relaxed),
            segments_emitted: self.segments_emitted.load(Ordering::Relaxed),
            segments_discarded: self.segments_discarded.load(Ordering::Relaxed),
            watchdog_fires: self.watchdog_fires.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub samples_in: usize,
    pub frames_processed: usize,
    pub frame_errors: usize,
    pub episodes_started: usize,
    pub segments_emitted: usize,
    pub segments_discarded: usize,
    pub watchdog_fires: usize,
}

/// All context the pipeline needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub config: MonitorConfig,
    pub engine: EngineHandle,
    pub frame_length: usize,
    pub engine_rate: u32,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub manual: Arc<AtomicBool>,
    pub speaking: Arc<AtomicBool>,
    pub volume_bits: Arc<AtomicU32>,
    pub utterance_tx: broadcast::Sender<UtteranceEvent>,
    pub activity_tx: broadcast::Sender<VoiceActivityEvent>,
    pub error_tx: broadcast::Sender<MonitorErrorEvent>,
    pub seq: Arc<AtomicU64>,
    pub capture_sample_rate: u32,
    pub diagnostics: Arc<PipelineDiagnostics>,
    pub preroll_carry: Arc<Mutex<Vec<i16>>>,
}

/// Chunk size drained from the ring buffer per iteration.
/// 20 ms at 48 kHz = 960 samples; at 16 kHz = 320 samples.
/// Using 960 keeps per-iteration work small at common capture rates.
const DRAIN_CHUNK: usize = 960;

/// Minimum sleep when the ring is empty (avoids busy-wait burning a core).
const DEFAULT_SLEEP_EMPTY_MS: u64 = 5;

/// Per-session mutable state, bundled so the helpers below stay callable.
struct LiveState {
    detector: SpeechDetector,
    volume: VolumeTracker,
    /// Independent sequence for activity events.
    activity_seq: u64,
    next_utterance_id: u64,
    /// Episode span for tracing, open from confirmation to conclusion.
    episode_span: Option<Span>,
}

/// Run the blocking pipeline until `ctx.running` becomes false.
pub fn run(mut ctx: PipelineContext) {
    info!("pipeline started");

    // Initialise resampler (passthrough when rates match)
    let mut resampler =
        match RateAdapter::new(ctx.capture_sample_rate, ctx.engine_rate, DRAIN_CHUNK) {
            Ok(r) => r,
            Err(e) => {
                error!("failed to create resampler: {e}");
                ctx.running.store(false, Ordering::SeqCst);
                return;
            }
        };

    if !resampler.is_passthrough() {
        info!(
            "resampling enabled from={} to={}",
            ctx.capture_sample_rate, ctx.engine_rate
        );
    }

    // Temporary scratch buffer, reused each iteration.
    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut slicer = FrameSlicer::new(ctx.frame_length, ctx.engine_rate);
    let mut st = LiveState {
        detector: SpeechDetector::new(&ctx.config),
        volume: VolumeTracker::new(
            ctx.config.volume_interval,
            ctx.config.volume_change_threshold,
        ),
        activity_seq: 0,
        next_utterance_id: 0,
        episode_span: None,
    };

    {
        let carried = ctx.preroll_carry.lock();
        if !carried.is_empty() {
            debug!(
                samples = carried.len(),
                "pre-roll carried over from previous session"
            );
            st.detector.restore_preroll(&carried);
        }
    }

    let watchdog = SilenceWatchdog::new(ctx.config.silence_timeout);
    let manual_mode = ctx.manual.load(Ordering::SeqCst);

    if manual_mode {
        // The whole window counts as speech.
        ctx.speaking.store(true, Ordering::SeqCst);
        send_activity(&ctx, &mut st, true, 0.0);
        info!("manual recording window open");
    }

    loop {
        // ── 0. Check running flag ─────────────────────────────────────────
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        // ── 1. Poll the silence watchdog ──────────────────────────────────
        if !manual_mode && watchdog.take_fired() {
            if let Some(outcome) = st.detector.force_end(EndReason::Timeout) {
                ctx.diagnostics.watchdog_fires.fetch_add(1, Ordering::Relaxed);
                warn!("silence timeout; episode force-ended");
                conclude_episode(&ctx, &mut st, &watchdog, outcome);
            }
        }

        // ── 2. Drain ring buffer ──────────────────────────────────────────
        let n = ctx.consumer.pop_slice(&mut raw);

        if n == 0 {
            // Nothing to process — yield to avoid burning 100 % CPU
            std::thread::sleep(Duration::from_millis(empty_sleep_ms()));
            continue;
        }

        ctx.diagnostics.samples_in.fetch_add(n, Ordering::Relaxed);

        // ── 3. Resample and slice into engine frames ──────────────────────
        let resampled = resampler.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial chunk — waiting for more data to fill rubato's input buffer
            continue;
        }

        for frame in slicer.push(&resampled) {
            if manual_mode {
                process_manual_frame(&ctx, &mut st, &frame);
            } else {
                process_frame(&ctx, &mut st, &watchdog, &frame);
            }
        }
    }

    // ── Wind-down ─────────────────────────────────────────────────────────
    let was_speaking = manual_mode || st.detector.speaking();
    if manual_mode {
        finish_manual_window(&ctx, &mut st);
    } else if st.detector.speaking() {
        st.detector.abort_episode();
        debug!("stop requested mid-episode; partial recording dropped");
    }
    if was_speaking {
        ctx.speaking.store(false, Ordering::SeqCst);
        store_volume(&ctx, 0.0);
        send_activity(&ctx, &mut st, false, 0.0);
    }
    st.episode_span = None;

    {
        let mut carry = ctx.preroll_carry.lock();
        if ctx.config.clear_preroll_on_stop {
            carry.clear();
        } else {
            *carry = st.detector.take_preroll();
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        samples_in = snap.samples_in,
        frames_processed = snap.frames_processed,
        frame_errors = snap.frame_errors,
        episodes_started = snap.episodes_started,
        segments_emitted = snap.segments_emitted,
        segments_discarded = snap.segments_discarded,
        watchdog_fires = snap.watchdog_fires,
        "pipeline stopped — diagnostics"
    );
}

fn empty_sleep_ms() -> u64 {
    static EMPTY_SLEEP_MS: OnceLock<u64> = OnceLock::new();
    *EMPTY_SLEEP_MS.get_or_init(|| {
        std::env::var("AURIS_PIPELINE_EMPTY_SLEEP_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(1, 20))
            .unwrap_or(DEFAULT_SLEEP_EMPTY_MS)
    })
}

/// One detection-mode frame: engine decision, detector step, publications.
fn process_frame(
    ctx: &PipelineContext,
    st: &mut LiveState,
    watchdog: &SilenceWatchdog,
    frame: &AudioFrame,
) {
    ctx.diagnostics
        .frames_processed
        .fetch_add(1, Ordering::Relaxed);

    let raw_speech = match ctx.engine.0.lock().process(frame) {
        Ok(decision) => decision,
        Err(e) => {
            handle_frame_error(ctx, st, watchdog, &e);
            return;
        }
    };

    let outcome = st.detector.advance(frame, raw_speech);

    // Wall-clock deadline tracks the last frame with raw speech evidence.
    if raw_speech && st.detector.speaking() {
        watchdog.arm();
    }

    match outcome {
        DetectorOutcome::SpeechStarted => {
            ctx.diagnostics
                .episodes_started
                .fetch_add(1, Ordering::Relaxed);
            ctx.speaking.store(true, Ordering::SeqCst);

            let uid = st.next_utterance_id;
            st.next_utterance_id += 1;
            let span = info_span!(
                "utterance",
                utterance_id = uid,
                engine_rate = ctx.engine_rate,
            );
            {
                let _enter = span.enter();
                info!(
                    seeded_samples = st.detector.recording_len(),
                    "speech confirmed"
                );
            }
            st.episode_span = Some(span);

            let volume = f32::from_bits(ctx.volume_bits.load(Ordering::Relaxed));
            send_activity(ctx, st, true, volume);
        }
        outcome @ (DetectorOutcome::SegmentReady { .. } | DetectorOutcome::SegmentDiscarded { .. }) => {
            conclude_episode(ctx, st, watchdog, outcome);
        }
        DetectorOutcome::Quiet => {}
    }

    if let Some(level) = st.volume.sample(&frame.samples, st.detector.speaking()) {
        store_volume(ctx, level);
        send_activity(ctx, st, st.detector.speaking(), level);
    }
}

/// One manual-mode frame: record everything, publish volume.
fn process_manual_frame(ctx: &PipelineContext, st: &mut LiveState, frame: &AudioFrame) {
    ctx.diagnostics
        .frames_processed
        .fetch_add(1, Ordering::Relaxed);
    st.detector.append_manual(frame);

    if let Some(level) = st.volume.sample(&frame.samples, true) {
        store_volume(ctx, level);
        send_activity(ctx, st, true, level);
    }
}

/// Engine fault: report it, drop the partial episode, keep the session alive.
fn handle_frame_error(
    ctx: &PipelineContext,
    st: &mut LiveState,
    watchdog: &SilenceWatchdog,
    error: &AurisError,
) {
    ctx.diagnostics.frame_errors.fetch_add(1, Ordering::Relaxed);
    report_error(ctx, error);

    let was_speaking = st.detector.speaking();
    st.detector.abort_episode();
    if was_speaking {
        watchdog.disarm();
        ctx.speaking.store(false, Ordering::SeqCst);
        store_volume(ctx, 0.0);
        st.volume.reset();
        send_activity(ctx, st, false, 0.0);
        st.episode_span = None;
    }
}

/// Shared conclusion for frame-driven and watchdog-driven episode ends.
fn conclude_episode(
    ctx: &PipelineContext,
    st: &mut LiveState,
    watchdog: &SilenceWatchdog,
    outcome: DetectorOutcome,
) {
    watchdog.disarm();
    ctx.speaking.store(false, Ordering::SeqCst);

    match outcome {
        DetectorOutcome::SegmentReady { samples, reason } => {
            emit_segment(ctx, st, samples, reason);
        }
        DetectorOutcome::SegmentDiscarded { reason, raw_len } => {
            ctx.diagnostics
                .segments_discarded
                .fetch_add(1, Ordering::Relaxed);
            let _enter = st.episode_span.as_ref().map(Span::enter);
            warn!(?reason, raw_len, "episode too short; discarded");
        }
        DetectorOutcome::Quiet | DetectorOutcome::SpeechStarted => {}
    }

    store_volume(ctx, 0.0);
    st.volume.reset();
    send_activity(ctx, st, false, 0.0);
    st.episode_span = None;
}

/// Manual wind-down: finalize the window, gate it on a speech scan, emit.
fn finish_manual_window(ctx: &PipelineContext, st: &mut LiveState) {
    match st.detector.finish_manual() {
        DetectorOutcome::SegmentReady { samples, reason } => {
            match scan_for_speech(ctx, &samples) {
                Ok(true) => emit_segment(ctx, st, samples, reason),
                Ok(false) => {
                    ctx.diagnostics
                        .segments_discarded
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        samples = samples.len(),
                        "manual window contains no speech; discarded"
                    );
                }
                Err(e) => {
                    ctx.diagnostics
                        .segments_discarded
                        .fetch_add(1, Ordering::Relaxed);
                    report_error(ctx, &e);
                    warn!("speech scan failed; manual window discarded");
                }
            }
        }
        DetectorOutcome::SegmentDiscarded { raw_len, .. } => {
            ctx.diagnostics
                .segments_discarded
                .fetch_add(1, Ordering::Relaxed);
            warn!(raw_len, "manual window too short; discarded");
        }
        DetectorOutcome::Quiet | DetectorOutcome::SpeechStarted => {}
    }
}

/// Run the engine over a finalized recording to check it holds any speech.
/// Resets the engine on both sides so scan state never leaks into live
/// detection.
fn scan_for_speech(ctx: &PipelineContext, samples: &[i16]) -> Result<bool> {
    let mut engine = ctx.engine.0.lock();
    engine.reset();

    let mut result = Ok(false);
    for chunk in samples.chunks(ctx.frame_length) {
        let frame = AudioFrame::new(chunk.to_vec(), ctx.engine_rate);
        match engine.process(&frame) {
            Ok(true) => {
                result = Ok(true);
                break;
            }
            Ok(false) => {}
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    engine.reset();
    result
}

/// Broadcast a finished utterance.
fn emit_segment(ctx: &PipelineContext, st: &LiveState, samples: Vec<i16>, reason: EndReason) {
    ctx.diagnostics
        .segments_emitted
        .fetch_add(1, Ordering::Relaxed);

    let audio = RecordedAudio {
        samples,
        sample_rate: ctx.engine_rate,
    };
    let samples_len = audio.samples.len();
    let duration_secs = audio.duration_secs();
    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    let emitted = ctx.utterance_tx.send(UtteranceEvent { seq, audio, reason }).is_ok();

    let _enter = st.episode_span.as_ref().map(Span::enter);
    info!(
        seq,
        samples = samples_len,
        duration_secs = format_args!("{duration_secs:.2}"),
        ?reason,
        emitted,
        "utterance emitted"
    );
}

fn report_error(ctx: &PipelineContext, error: &AurisError) {
    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    error!(error = %error, "pipeline fault");
    let _ = ctx.error_tx.send(MonitorErrorEvent {
        seq,
        message: error.to_string(),
    });
}

fn store_volume(ctx: &PipelineContext, level: f32) {
    ctx.volume_bits.store(level.to_bits(), Ordering::Relaxed);
}

fn send_activity(ctx: &PipelineContext, st: &mut LiveState, speaking: bool, volume: f32) {
    let event = VoiceActivityEvent {
        seq: st.activity_seq,
        volume,
        speaking,
    };
    st.activity_seq = st.activity_seq.saturating_add(1);
    let _ = ctx.activity_tx.send(event);
}
