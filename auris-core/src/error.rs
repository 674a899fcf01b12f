use thiserror::Error;

/// All errors produced by auris-core.
#[derive(Debug, Error)]
pub enum AurisError {
    #[error("engine construction failed: {0}")]
    EngineConstruction(String),

    #[error("audio capture failed to start: {0}")]
    CaptureStart(String),

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("no input device found")]
    NoInputDevice,

    #[error("frame processing error: {0}")]
    FrameProcessing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AurisError>;
