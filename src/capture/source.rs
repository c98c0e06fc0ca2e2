use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// What is being recorded
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RecordingKind {
    /// Camera capture
    Webcam,
    /// Display capture
    #[default]
    Screen,
}

impl RecordingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingKind::Webcam => "webcam",
            RecordingKind::Screen => "screen",
        }
    }
}

impl fmt::Display for RecordingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of encoded media emitted by a capture source
#[derive(Debug, Clone)]
pub struct MediaChunk {
    /// Encoded media bytes
    pub data: Bytes,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Media capture source trait
///
/// Implementations:
/// - `ChannelSource`: bytes pushed by the embedding application
/// - `FileSource`: replays an existing media file as a live stream
#[async_trait::async_trait]
pub trait MediaSource: Send + Sync {
    /// Start capturing, emitting one chunk per `timeslice`
    ///
    /// Returns a channel receiver that will receive media chunks
    async fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<MediaChunk>>;

    /// Flush any buffered data and stop capturing
    ///
    /// The chunk channel is closed once the last chunk has been sent.
    async fn stop(&mut self) -> Result<()>;

    /// Whether the source can (still) produce data
    fn is_live(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}
