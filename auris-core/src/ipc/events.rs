//! Event types broadcast to host applications.
//!
//! ## Subscriptions
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `UtteranceEvent` | `SpeechMonitor::subscribe_utterances` |
//! | `VoiceActivityEvent` | `SpeechMonitor::subscribe_activity` |
//! | `MonitorStatusEvent` | `SpeechMonitor::subscribe_status` |
//! | `MonitorErrorEvent` | `SpeechMonitor::subscribe_errors` |
//!
//! All payloads serialize to camelCase JSON so host shells can forward
//! them over whatever IPC they use without renaming fields.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Utterance events
// ---------------------------------------------------------------------------

/// Emitted when a finished speech episode survives finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtteranceEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// The extracted speech segment, trimmed and level-normalized.
    pub audio: RecordedAudio,
    /// What ended the episode.
    pub reason: EndReason,
}

/// A finished speech segment: mono 16-bit PCM at a known rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedAudio {
    /// Mono signed 16-bit samples.
    pub samples: Vec<i16>,
    /// Sample rate in Hz (the active VAD engine's rate).
    pub sample_rate: u32,
}

impl RecordedAudio {
    /// Duration of the segment in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// What ended a speech episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// A run of consecutive silent frames reached the limit.
    Silence,
    /// The episode's total silent-frame budget ran out.
    SilenceBudget,
    /// The wall-clock silence watchdog lapsed.
    Timeout,
    /// The operator stopped a manual recording window.
    Manual,
}

// ---------------------------------------------------------------------------
// Voice activity events
// ---------------------------------------------------------------------------

/// Emitted when the speaking state flips or the perceptual volume moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Perceptual volume in [0.0, 1.0].
    pub volume: f32,
    /// Whether speech is currently confirmed.
    pub speaking: bool,
}

// ---------------------------------------------------------------------------
// Monitor status events
// ---------------------------------------------------------------------------

/// Emitted when the monitor lifecycle state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatusEvent {
    pub status: MonitorStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the speech monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    /// Monitor created but `start()` not yet called.
    Idle,
    /// Actively capturing audio and detecting speech.
    Listening,
    /// Capture stopped; the monitor may be restarted.
    Stopped,
    /// Capture could not be started — see `detail`.
    Error,
}

// ---------------------------------------------------------------------------
// Monitor error events
// ---------------------------------------------------------------------------

/// Emitted for recoverable faults (e.g. a VAD engine frame error).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorErrorEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Human-readable description of the fault.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utterance_event_serializes_with_camel_case_and_lowercase_reason() {
        let event = UtteranceEvent {
            seq: 7,
            audio: RecordedAudio {
                samples: vec![0, 120, -340],
                sample_rate: 16_000,
            },
            reason: EndReason::Silence,
        };

        let json = serde_json::to_value(&event).expect("serialize utterance event");
        assert_eq!(json["seq"], 7);
        assert_eq!(json["audio"]["sampleRate"], 16_000);
        assert_eq!(json["audio"]["samples"][2], -340);
        assert_eq!(json["reason"], "silence");

        let round_trip: UtteranceEvent =
            serde_json::from_value(json).expect("deserialize utterance event");
        assert_eq!(round_trip.seq, 7);
        assert_eq!(round_trip.audio.samples.len(), 3);
        assert_eq!(round_trip.reason, EndReason::Silence);
    }

    #[test]
    fn end_reason_variants_serialize_lowercase() {
        let pairs = [
            (EndReason::Silence, "silence"),
            (EndReason::SilenceBudget, "silencebudget"),
            (EndReason::Timeout, "timeout"),
            (EndReason::Manual, "manual"),
        ];
        for (reason, expected) in pairs {
            let json = serde_json::to_value(reason).expect("serialize end reason");
            assert_eq!(json, *expected);
        }
    }

    #[test]
    fn monitor_status_event_serializes_with_lowercase_status() {
        let event = MonitorStatusEvent {
            status: MonitorStatus::Listening,
            detail: None,
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "listening");
        assert_eq!(json["detail"], serde_json::Value::Null);

        let round_trip: MonitorStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, MonitorStatus::Listening);
        assert!(round_trip.detail.is_none());
    }

    #[test]
    fn end_reason_rejects_non_lowercase_values() {
        let invalid = r#""Silence""#;
        let err = serde_json::from_str::<EndReason>(invalid);
        assert!(err.is_err(), "expected invalid casing to fail");
    }

    #[test]
    fn voice_activity_event_serializes_with_camel_case_fields() {
        let event = VoiceActivityEvent {
            seq: 3,
            volume: 0.42,
            speaking: true,
        };

        let json = serde_json::to_value(&event).expect("serialize activity event");
        assert_eq!(json["seq"], 3);
        let volume = json["volume"]
            .as_f64()
            .expect("volume should serialize as number");
        assert!((volume - 0.42).abs() < 1e-5);
        assert_eq!(json["speaking"], true);

        let round_trip: VoiceActivityEvent =
            serde_json::from_value(json).expect("deserialize activity event");
        assert_eq!(round_trip.seq, 3);
        assert!(round_trip.speaking);
    }

    #[test]
    fn recorded_audio_duration_tracks_sample_count() {
        let audio = RecordedAudio {
            samples: vec![0; 8_000],
            sample_rate: 16_000,
        };
        assert!((audio.duration_secs() - 0.5).abs() < 1e-9);

        let empty = RecordedAudio {
            samples: Vec::new(),
            sample_rate: 0,
        };
        assert_eq!(empty.duration_secs(), 0.0);
    }
}
