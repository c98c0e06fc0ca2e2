pub mod channel;
pub mod file;
pub mod source;

pub use channel::{ChannelSource, ChunkSender};
pub use file::{FileEnd, FileSource};
pub use source::{MediaChunk, MediaSource, RecordingKind};
