use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{RecorderSettings, StorageConfig};
use crate::nats::{NatsClient, RecordingEventMessage};
use crate::recorder::{ChunkRecorder, RecorderCallbacks};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active recordings (recording_id → recorder)
    pub recordings: Arc<RwLock<HashMap<Uuid, Arc<ChunkRecorder>>>>,

    /// Defaults for new recordings
    pub recorder: Arc<RecorderSettings>,

    /// Where recordings are uploaded
    pub storage: Arc<StorageConfig>,

    /// Optional event publisher
    pub nats: Option<Arc<NatsClient>>,
}

impl AppState {
    pub fn new(recorder: RecorderSettings, storage: StorageConfig) -> Self {
        Self {
            recordings: Arc::new(RwLock::new(HashMap::new())),
            recorder: Arc::new(recorder),
            storage: Arc::new(storage),
            nats: None,
        }
    }

    pub fn with_nats(mut self, nats: NatsClient) -> Self {
        self.nats = Some(Arc::new(nats));
        self
    }

    /// Publish an event if NATS is configured
    pub async fn publish(&self, message: RecordingEventMessage) {
        if let Some(nats) = &self.nats {
            if let Err(e) = nats.publish_event(&message).await {
                warn!("Failed to publish recording event: {:#}", e);
            }
        }
    }

    /// Callbacks that forward progress and failures to NATS
    pub fn event_callbacks(&self, recording_id: Uuid) -> RecorderCallbacks {
        let Some(nats) = self.nats.clone() else {
            return RecorderCallbacks::default();
        };
        let progress_nats = Arc::clone(&nats);

        RecorderCallbacks::default()
            .on_progress(move |progress| {
                let nats = Arc::clone(&progress_nats);
                let message = RecordingEventMessage::progress(recording_id, progress);
                tokio::spawn(async move {
                    if let Err(e) = nats.publish_event(&message).await {
                        warn!("Failed to publish progress event: {:#}", e);
                    }
                });
            })
            .on_error(move |err| {
                let nats = Arc::clone(&nats);
                let message = RecordingEventMessage::failed(recording_id, err.to_string());
                tokio::spawn(async move {
                    if let Err(e) = nats.publish_event(&message).await {
                        warn!("Failed to publish failure event: {:#}", e);
                    }
                });
            })
    }

    /// Remove `recording_id` if it still maps to `recorder`
    ///
    /// A cancel may already have dropped the entry, or a new recording may
    /// have claimed the id since.
    pub async fn forget(&self, recording_id: Uuid, recorder: &Arc<ChunkRecorder>) {
        let mut recordings = self.recordings.write().await;
        if recordings
            .get(&recording_id)
            .is_some_and(|current| Arc::ptr_eq(current, recorder))
        {
            recordings.remove(&recording_id);
        }
    }

    /// Cancel every active recording (used on shutdown)
    pub async fn cancel_all(&self) {
        let recorders: Vec<Arc<ChunkRecorder>> = {
            let mut recordings = self.recordings.write().await;
            recordings.drain().map(|(_, recorder)| recorder).collect()
        };

        if recorders.is_empty() {
            return;
        }

        info!("Cancelling {} active recordings", recorders.len());
        join_all(recorders.iter().map(|recorder| recorder.cancel())).await;
    }
}
