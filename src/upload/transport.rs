use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::capture::RecordingKind;

/// One slice of a multipart upload (immutable once cut)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    /// 1-based sequence number
    pub number: u32,
    pub data: Bytes,
}

impl UploadPart {
    pub fn new(number: u32, data: Bytes) -> Self {
        Self { number, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Snapshot of upload progress
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub bytes_total: u64,
    /// 0.0 to 100.0
    pub percentage: f64,
}

impl UploadProgress {
    pub fn new(bytes_sent: u64, bytes_total: u64) -> Self {
        let percentage = if bytes_total == 0 {
            0.0
        } else {
            (bytes_sent as f64 / bytes_total as f64 * 100.0).min(100.0)
        };

        Self {
            bytes_sent,
            bytes_total,
            percentage,
        }
    }
}

/// Receives the cumulative bytes a transport has sent for its open upload
pub type BytesSentCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Object being uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub recording_id: Uuid,
    pub kind: RecordingKind,
}

impl UploadTarget {
    /// Storage key, e.g. `screen/5f0c...e1.webm`
    pub fn key(&self) -> String {
        format!("{}/{}.webm", self.kind, self.recording_id)
    }
}

/// Storage transport trait
///
/// A transport instance carries at most one upload at a time; calling either
/// `init_*` method replaces whatever upload was in progress.
#[async_trait::async_trait]
pub trait UploadTransport: Send + Sync {
    /// Open a multipart upload for `target`
    async fn init_multipart(&self, target: &UploadTarget) -> Result<()>;

    /// Open a single-shot upload for `target`
    async fn init_direct(&self, target: &UploadTarget) -> Result<()>;

    /// Upload one part of the open multipart upload
    async fn upload_part(&self, part: &UploadPart) -> Result<()>;

    /// Upload the whole payload of the open direct upload
    async fn upload_direct(&self, data: Bytes) -> Result<()>;

    /// Total object size, announced before completion
    fn set_total_size(&self, bytes: u64);

    /// Register a callback for bytes sent on the open upload
    ///
    /// The count restarts at zero on every `init_*`. Transports that cannot
    /// observe bytes while a request is in flight keep the default and never
    /// report; the recorder still counts each acknowledged part.
    fn set_progress_callback(&self, _callback: Option<BytesSentCallback>) {}

    /// Finalize the open upload
    ///
    /// Returns the playable URL, or `None` if the backend produced no object.
    async fn complete(&self) -> Result<Option<String>>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = UploadProgress::new(5, 20);
        assert_eq!(progress.percentage, 25.0);
    }

    #[test]
    fn test_progress_zero_total() {
        let progress = UploadProgress::new(0, 0);
        assert_eq!(progress.percentage, 0.0);
    }

    #[test]
    fn test_progress_is_capped() {
        let progress = UploadProgress::new(30, 20);
        assert_eq!(progress.percentage, 100.0);
    }

    #[test]
    fn test_target_key() {
        let id = Uuid::nil();
        let target = UploadTarget {
            recording_id: id,
            kind: RecordingKind::Webcam,
        };
        assert_eq!(target.key(), format!("webcam/{}.webm", id));
    }
}
