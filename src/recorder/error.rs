use std::time::Duration;
use thiserror::Error;

/// Everything that can end a recording session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecorderError {
    #[error("no media source available")]
    NoMediaSource,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("failed to start media capture: {0}")]
    Capture(String),

    #[error("failed to initialize upload: {0}")]
    TransportInit(String),

    #[error("failed to upload part {part}: {message}")]
    PartUpload { part: u32, message: String },

    #[error("failed to upload recording: {0}")]
    DirectUpload(String),

    #[error("media source did not flush within {0:?}")]
    FlushTimeout(Duration),

    #[error("no data recorded")]
    NoData,

    #[error("failed to complete upload: {0}")]
    Completion(String),

    #[error("recording was cancelled")]
    Cancelled,
}
