use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use uuid::Uuid;

use crate::capture::RecordingKind;

/// Recorder lifecycle
///
/// `Idle → Recording → Stopping → {FinalizingDirect | FinalizingMultipart} → Idle`;
/// cancel returns to `Idle` from anywhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Stopping,
    FinalizingDirect,
    FinalizingMultipart,
}

/// Point-in-time view of a recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderStatus {
    pub state: RecorderState,

    pub recording_id: Option<Uuid>,

    pub kind: Option<RecordingKind>,

    pub started_at: Option<DateTime<Utc>>,

    /// Bytes received from the media source
    pub bytes_recorded: u64,

    /// Parts handed to the upload queue
    pub parts_queued: u32,

    /// Parts acknowledged by the transport
    pub parts_uploaded: u32,

    /// Bytes acknowledged by the transport
    pub bytes_sent: u64,

    /// Last error reported by the session
    pub error: Option<String>,
}

/// Counters shared between the recorder and its session tasks
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub bytes_recorded: AtomicU64,
    pub parts_queued: AtomicU32,
    pub parts_uploaded: AtomicU32,
    pub bytes_sent: AtomicU64,
}

/// Identity of the active session
#[derive(Debug, Clone)]
pub(crate) struct SessionInfo {
    pub id: Uuid,
    pub kind: RecordingKind,
    pub started_at: DateTime<Utc>,
    pub counters: std::sync::Arc<SessionCounters>,
}

impl SessionInfo {
    pub fn status(&self, state: RecorderState, error: Option<String>) -> RecorderStatus {
        RecorderStatus {
            state,
            recording_id: Some(self.id),
            kind: Some(self.kind),
            started_at: Some(self.started_at),
            bytes_recorded: self.counters.bytes_recorded.load(Ordering::SeqCst),
            parts_queued: self.counters.parts_queued.load(Ordering::SeqCst),
            parts_uploaded: self.counters.parts_uploaded.load(Ordering::SeqCst),
            bytes_sent: self.counters.bytes_sent.load(Ordering::SeqCst),
            error,
        }
    }
}

impl RecorderStatus {
    pub(crate) fn idle(error: Option<String>) -> Self {
        Self {
            state: RecorderState::Idle,
            recording_id: None,
            kind: None,
            started_at: None,
            bytes_recorded: 0,
            parts_queued: 0,
            parts_uploaded: 0,
            bytes_sent: 0,
            error,
        }
    }
}
