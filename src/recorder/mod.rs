//! Chunked recording upload
//!
//! This module provides the `ChunkRecorder` that:
//! - Buffers media chunks into fixed-size multipart parts
//! - Uploads parts strictly in sequence through one worker
//! - Finalizes through multipart completion or a direct upload
//! - Surfaces progress and errors through caller callbacks

mod buffer;
mod config;
mod error;
mod recorder;
mod state;

pub use buffer::PartBuffer;
pub use config::{
    ErrorCallback, ProgressCallback, RecorderCallbacks, RecorderConfig,
    DEFAULT_DIRECT_UPLOAD_THRESHOLD, DEFAULT_PART_SIZE,
};
pub use error::RecorderError;
pub use recorder::ChunkRecorder;
pub use state::{RecorderState, RecorderStatus};
