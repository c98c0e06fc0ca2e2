use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::upload::UploadProgress;

/// Recording lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingEvent {
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
}

/// Recording event published to NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingEventMessage {
    pub recording_id: Uuid,
    pub event: RecordingEvent,
    pub bytes_sent: u64,
    pub bytes_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String, // RFC3339 timestamp
}

impl RecordingEventMessage {
    pub fn new(recording_id: Uuid, event: RecordingEvent) -> Self {
        Self {
            recording_id,
            event,
            bytes_sent: 0,
            bytes_total: 0,
            url: None,
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn progress(recording_id: Uuid, progress: UploadProgress) -> Self {
        Self {
            bytes_sent: progress.bytes_sent,
            bytes_total: progress.bytes_total,
            ..Self::new(recording_id, RecordingEvent::Progress)
        }
    }

    pub fn completed(recording_id: Uuid, url: String) -> Self {
        Self {
            url: Some(url),
            ..Self::new(recording_id, RecordingEvent::Completed)
        }
    }

    pub fn failed(recording_id: Uuid, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(recording_id, RecordingEvent::Failed)
        }
    }
}
