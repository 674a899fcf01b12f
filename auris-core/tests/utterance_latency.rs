use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use auris_core::buffering::{create_audio_ring, frame::AudioFrame, Producer};
use auris_core::ipc::events::{EndReason, UtteranceEvent};
use auris_core::monitor::{pipeline, MonitorConfig};
use auris_core::vad::{EngineHandle, VadEngine};
use auris_core::AurisError;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

const FRAME: usize = 160;
const RATE: u32 = 16_000;

struct ScriptedEngine {
    decisions: Vec<bool>,
    idx: usize,
}

impl ScriptedEngine {
    fn new(decisions: Vec<bool>) -> Self {
        Self { decisions, idx: 0 }
    }
}

impl VadEngine for ScriptedEngine {
    fn process(&mut self, _frame: &AudioFrame) -> std::result::Result<bool, AurisError> {
        let decision = self.decisions.get(self.idx).copied().unwrap_or(false);
        self.idx += 1;
        Ok(decision)
    }

    fn frame_length(&self) -> usize {
        FRAME
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn reset(&mut self) {}

    fn dispose(&mut self) {}
}

fn recv_event_with_timeout(
    rx: &mut broadcast::Receiver<UtteranceEvent>,
    timeout: Duration,
) -> UtteranceEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for utterance event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("utterance channel closed unexpectedly"),
        }
    }
}

#[test]
fn first_utterance_latency_under_500ms() {
    let (mut producer, consumer) = create_audio_ring();

    // Audio and the decision script line up frame for frame:
    // 20 quiet frames, 40 loud frames, 10 quiet frames to close the episode.
    let mut pcm = vec![0.0f32; FRAME * 20];
    pcm.extend(vec![0.5f32; FRAME * 40]);
    pcm.extend(vec![0.0f32; FRAME * 10]);
    assert_eq!(producer.push_slice(&pcm), pcm.len(), "capture ring overflowed");
    let decisions = [vec![false; 20], vec![true; 40]].concat();

    let running = Arc::new(AtomicBool::new(true));
    let seq = Arc::new(AtomicU64::new(0));
    let (utterance_tx, mut utterance_rx) = broadcast::channel(16);
    let (activity_tx, _) = broadcast::channel(16);
    let (error_tx, _) = broadcast::channel(16);

    let ctx = pipeline::PipelineContext {
        config: MonitorConfig::default(),
        engine: EngineHandle::new(ScriptedEngine::new(decisions)),
        frame_length: FRAME,
        engine_rate: RATE,
        consumer,
        running: Arc::clone(&running),
        manual: Arc::new(AtomicBool::new(false)),
        speaking: Arc::new(AtomicBool::new(false)),
        volume_bits: Arc::new(AtomicU32::new(0)),
        utterance_tx,
        activity_tx,
        error_tx,
        seq,
        capture_sample_rate: RATE,
        diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        preroll_carry: Arc::new(Mutex::new(Vec::new())),
    };

    let start = Instant::now();
    let handle = thread::spawn(move || pipeline::run(ctx));

    let first = recv_event_with_timeout(&mut utterance_rx, Duration::from_secs(2));
    let elapsed = start.elapsed();

    running.store(false, Ordering::SeqCst);
    handle.join().expect("pipeline thread panicked");

    assert_eq!(first.reason, EndReason::Silence);
    assert_eq!(first.audio.sample_rate, RATE);
    assert!(
        first.audio.samples.len() >= 4_800,
        "utterance shorter than the minimum window: {}",
        first.audio.samples.len()
    );
    assert!(
        elapsed < Duration::from_millis(500),
        "utterance latency too high: {:?} (target < 500ms)",
        elapsed
    );
}
