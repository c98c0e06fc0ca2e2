pub mod capture;
pub mod config;
pub mod http;
pub mod nats;
pub mod recorder;
pub mod upload;

pub use capture::{
    ChannelSource, ChunkSender, FileEnd, FileSource, MediaChunk, MediaSource, RecordingKind,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use nats::{NatsClient, RecordingEvent, RecordingEventMessage};
pub use recorder::{
    ChunkRecorder, PartBuffer, RecorderCallbacks, RecorderConfig, RecorderError, RecorderState,
    RecorderStatus,
};
pub use upload::{
    BytesSentCallback, HttpTransport, LocalTransport, TransportFactory, UploadPart, UploadProgress,
    UploadTarget, UploadTransport,
};
