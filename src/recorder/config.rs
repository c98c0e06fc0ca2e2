use std::sync::Arc;
use std::time::Duration;

use super::error::RecorderError;
use crate::capture::RecordingKind;
use crate::upload::UploadProgress;

const MIB: usize = 1024 * 1024;

/// Part size required by the multipart storage backend (10 MiB)
pub const DEFAULT_PART_SIZE: usize = 10 * MIB;

/// Recordings smaller than this skip multipart (10 MiB)
pub const DEFAULT_DIRECT_UPLOAD_THRESHOLD: u64 = 10 * MIB as u64;

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub kind: RecordingKind,
    /// How often the media source emits a chunk
    pub timeslice: Duration,
    /// Size of every multipart part except the last
    pub part_size: usize,
    /// Total size below which an unsplit recording is uploaded directly
    pub direct_upload_threshold: u64,
    /// Upper bound on waiting for the source's final chunk after stop
    pub flush_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            kind: RecordingKind::default(),
            timeslice: Duration::from_millis(5000),
            part_size: DEFAULT_PART_SIZE,
            direct_upload_threshold: DEFAULT_DIRECT_UPLOAD_THRESHOLD,
            flush_timeout: Duration::from_secs(10),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&RecorderError) + Send + Sync>;

/// Caller hooks for progress and errors
#[derive(Clone, Default)]
pub struct RecorderCallbacks {
    on_progress: Option<ProgressCallback>,
    on_error: Option<ErrorCallback>,
}

impl RecorderCallbacks {
    pub fn on_progress(mut self, f: impl Fn(UploadProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&RecorderError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn progress(&self, progress: UploadProgress) {
        if let Some(f) = &self.on_progress {
            f(progress);
        }
    }

    pub(crate) fn error(&self, err: &RecorderError) {
        if let Some(f) = &self.on_error {
            f(err);
        }
    }
}
