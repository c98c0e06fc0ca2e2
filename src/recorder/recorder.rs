use bytes::Bytes;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::buffer::PartBuffer;
use super::config::{RecorderCallbacks, RecorderConfig};
use super::error::RecorderError;
use super::state::{RecorderState, RecorderStatus, SessionCounters, SessionInfo};
use crate::capture::{MediaChunk, MediaSource};
use crate::upload::{UploadPart, UploadProgress, UploadTarget, UploadTransport};

/// What the ingest task hands back once the source has closed its channel
struct Ingested {
    buffer: PartBuffer,
    queue: mpsc::UnboundedSender<UploadPart>,
}

struct ActiveSession {
    info: SessionInfo,
    source: Box<dyn MediaSource>,
    ingest: JoinHandle<Ingested>,
    uploader: JoinHandle<Result<(), RecorderError>>,
}

/// Records a media stream straight into object storage
///
/// Incoming chunks are cut into fixed-size parts which a single upload
/// worker sends in sequence. On stop the trailing bytes become the final
/// part, or the whole recording goes through a direct upload when it never
/// filled a part and stays below the direct-upload threshold.
pub struct ChunkRecorder {
    config: RecorderConfig,
    transport: Arc<dyn UploadTransport>,
    callbacks: RecorderCallbacks,
    session: Mutex<Option<ActiveSession>>,
    current: Mutex<Option<SessionInfo>>,
    state: Mutex<RecorderState>,
    last_error: Arc<Mutex<Option<RecorderError>>>,
    cancelled: Notify,
}

impl ChunkRecorder {
    pub fn new(config: RecorderConfig, transport: Arc<dyn UploadTransport>) -> Self {
        info!(
            "Chunk recorder initialized: {} via {} transport (parts: {} bytes, direct below {} bytes)",
            config.kind,
            transport.name(),
            config.part_size,
            config.direct_upload_threshold
        );

        Self {
            config,
            transport,
            callbacks: RecorderCallbacks::default(),
            session: Mutex::new(None),
            current: Mutex::new(None),
            state: Mutex::new(RecorderState::Idle),
            last_error: Arc::new(Mutex::new(None)),
            cancelled: Notify::new(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: RecorderCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Start recording `source` under a fresh recording ID
    pub async fn start(&self, source: Box<dyn MediaSource>) -> Result<Uuid, RecorderError> {
        self.start_with_id(source, Uuid::new_v4()).await
    }

    /// Start recording `source`
    ///
    /// Opens the multipart upload first; if that fails nothing else changes.
    pub async fn start_with_id(
        &self,
        mut source: Box<dyn MediaSource>,
        recording_id: Uuid,
    ) -> Result<Uuid, RecorderError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            warn!("Recording already started");
            return Err(RecorderError::AlreadyRecording);
        }

        if !source.is_live() {
            return Err(self.report(RecorderError::NoMediaSource).await);
        }

        let target = UploadTarget {
            recording_id,
            kind: self.config.kind,
        };

        if let Err(e) = self.transport.init_multipart(&target).await {
            return Err(self
                .report(RecorderError::TransportInit(format!("{:#}", e)))
                .await);
        }

        let chunks = match source.start(self.config.timeslice).await {
            Ok(chunks) => chunks,
            Err(e) => {
                // Transports have no abort call, so the upload stays open
                // on the backend until it expires or the next init replaces it
                warn!(
                    "Multipart upload for {} left open on {} transport after capture failed",
                    target.key(),
                    self.transport.name()
                );
                return Err(self
                    .report(RecorderError::Capture(format!("{:#}", e)))
                    .await);
            }
        };

        let info = SessionInfo {
            id: recording_id,
            kind: self.config.kind,
            started_at: Utc::now(),
            counters: Arc::new(SessionCounters::default()),
        };

        let progress_counters = Arc::clone(&info.counters);
        let progress_callbacks = self.callbacks.clone();
        self.transport
            .set_progress_callback(Some(Arc::new(move |sent: u64| {
                report_sent(&progress_counters, &progress_callbacks, sent);
            })));

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let uploader = tokio::spawn(drain_parts(
            queue_rx,
            Arc::clone(&self.transport),
            Arc::clone(&info.counters),
            self.callbacks.clone(),
            Arc::clone(&self.last_error),
        ));

        let ingest = tokio::spawn(ingest_chunks(
            chunks,
            PartBuffer::new(self.config.part_size),
            queue_tx,
            Arc::clone(&info.counters),
        ));

        *self.last_error.lock().await = None;
        *self.current.lock().await = Some(info.clone());
        self.set_state(RecorderState::Recording).await;

        info!(
            "Recording {} started ({} from {} source)",
            recording_id,
            self.config.kind,
            source.name()
        );

        *session = Some(ActiveSession {
            info,
            source,
            ingest,
            uploader,
        });

        Ok(recording_id)
    }

    /// Stop recording and finalize the upload
    ///
    /// Returns the playable URL. Errors are also passed to the error callback
    /// and kept as the recorder's last error. Session state is released on
    /// every path.
    pub async fn stop(&self) -> Result<String, RecorderError> {
        let cancelled = self.cancelled.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        let mut session = self.session.lock().await;
        let Some(active) = session.take() else {
            return Err(RecorderError::NotRecording);
        };

        let recording_id = active.info.id;
        let abort_handles = [active.ingest.abort_handle(), active.uploader.abort_handle()];

        info!("Stopping recording {}", recording_id);
        self.set_state(RecorderState::Stopping).await;

        let result = tokio::select! {
            result = self.finalize(active) => result,
            _ = &mut cancelled => {
                for handle in abort_handles {
                    handle.abort();
                }
                Err(RecorderError::Cancelled)
            }
        };

        self.release().await;
        drop(session);

        match result {
            Ok(url) => {
                info!("Recording {} uploaded: {}", recording_id, url);
                Ok(url)
            }
            // The upload worker reports part failures as they happen
            Err(err @ RecorderError::PartUpload { .. }) => Err(err),
            Err(RecorderError::Cancelled) => {
                info!("Recording {} cancelled while stopping", recording_id);
                Err(RecorderError::Cancelled)
            }
            Err(err) => Err(self.report(err).await),
        }
    }

    /// Drop the session without uploading or finalizing anything
    ///
    /// Safe to call in any state, including when nothing is recording.
    /// Parts already handed to the transport are not recalled.
    pub async fn cancel(&self) {
        self.cancelled.notify_waiters();

        let mut session = self.session.lock().await;
        if let Some(mut active) = session.take() {
            if let Err(e) = active.source.stop().await {
                debug!("Source did not stop cleanly during cancel: {:#}", e);
            }
            active.ingest.abort();
            active.uploader.abort();

            info!("Recording {} cancelled", active.info.id);
        }

        self.release().await;
        *self.last_error.lock().await = None;
    }

    pub async fn state(&self) -> RecorderState {
        *self.state.lock().await
    }

    pub async fn last_error(&self) -> Option<RecorderError> {
        self.last_error.lock().await.clone()
    }

    /// Get current recorder status
    pub async fn status(&self) -> RecorderStatus {
        let state = *self.state.lock().await;
        let error = self.last_error.lock().await.as_ref().map(|e| e.to_string());

        match self.current.lock().await.as_ref() {
            Some(info) => info.status(state, error),
            None => RecorderStatus::idle(error),
        }
    }

    async fn finalize(&self, active: ActiveSession) -> Result<String, RecorderError> {
        let ActiveSession {
            info,
            mut source,
            mut ingest,
            uploader,
        } = active;

        // Ask for buffered data and stop capture; ingest ends once the
        // source closes its channel
        if let Err(e) = source.stop().await {
            warn!("Failed to stop {} source cleanly: {:#}", source.name(), e);
        }

        let Ingested { mut buffer, queue } =
            match tokio::time::timeout(self.config.flush_timeout, &mut ingest).await {
                Ok(Ok(ingested)) => ingested,
                Ok(Err(e)) => {
                    uploader.abort();
                    return Err(RecorderError::Capture(format!("ingest task failed: {}", e)));
                }
                Err(_) => {
                    ingest.abort();
                    uploader.abort();
                    return Err(RecorderError::FlushTimeout(self.config.flush_timeout));
                }
            };

        let target = UploadTarget {
            recording_id: info.id,
            kind: info.kind,
        };
        let total = buffer.total_bytes();

        if buffer.parts_cut() == 0 && total < self.config.direct_upload_threshold {
            drop(queue);
            // Nothing was queued, so the worker exits as soon as its queue closes
            let _ = uploader.await;

            let data = buffer.take_remainder();
            if data.is_empty() {
                return Err(RecorderError::NoData);
            }

            return self.finalize_direct(&target, &info, data).await;
        }

        self.set_state(RecorderState::FinalizingMultipart).await;

        if let Some(part) = buffer.finish() {
            debug!("Queued final part {} ({} bytes)", part.number, part.len());
            info.counters.parts_queued.fetch_add(1, Ordering::SeqCst);
            if queue.send(part).is_err() {
                warn!("Upload queue halted, final part left unsent");
            }
        }
        drop(queue);

        match uploader.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(e) => {
                return Err(RecorderError::Completion(format!(
                    "upload worker failed: {}",
                    e
                )))
            }
        }

        if buffer.parts_cut() == 0 {
            return Err(RecorderError::NoData);
        }

        info!(
            "All {} parts uploaded for recording {}, completing",
            buffer.parts_cut(),
            info.id
        );

        self.transport.set_total_size(total);
        self.complete_upload().await
    }

    async fn finalize_direct(
        &self,
        target: &UploadTarget,
        info: &SessionInfo,
        data: Bytes,
    ) -> Result<String, RecorderError> {
        self.set_state(RecorderState::FinalizingDirect).await;

        let len = data.len() as u64;
        info!(
            "Recording {} is {} bytes, uploading directly",
            target.recording_id, len
        );

        self.transport
            .init_direct(target)
            .await
            .map_err(|e| RecorderError::TransportInit(format!("{:#}", e)))?;

        self.transport.set_total_size(len);

        self.transport
            .upload_direct(data)
            .await
            .map_err(|e| RecorderError::DirectUpload(format!("{:#}", e)))?;

        report_sent(&info.counters, &self.callbacks, len);

        self.complete_upload().await
    }

    async fn complete_upload(&self) -> Result<String, RecorderError> {
        match self.transport.complete().await {
            Ok(Some(url)) => Ok(url),
            Ok(None) => Err(RecorderError::Completion(
                "storage returned no URL".to_string(),
            )),
            Err(e) => Err(RecorderError::Completion(format!("{:#}", e))),
        }
    }

    async fn set_state(&self, state: RecorderState) {
        *self.state.lock().await = state;
    }

    async fn release(&self) {
        self.transport.set_progress_callback(None);
        *self.current.lock().await = None;
        self.set_state(RecorderState::Idle).await;
    }

    async fn report(&self, err: RecorderError) -> RecorderError {
        error!("Recording failed: {}", err);
        *self.last_error.lock().await = Some(err.clone());
        self.callbacks.error(&err);
        err
    }
}

/// Append chunks to the buffer and queue every part they complete
async fn ingest_chunks(
    mut chunks: mpsc::Receiver<MediaChunk>,
    mut buffer: PartBuffer,
    queue: mpsc::UnboundedSender<UploadPart>,
    counters: Arc<SessionCounters>,
) -> Ingested {
    while let Some(chunk) = chunks.recv().await {
        counters
            .bytes_recorded
            .fetch_add(chunk.data.len() as u64, Ordering::SeqCst);

        for part in buffer.push(&chunk.data) {
            debug!("Queued part {} ({} bytes)", part.number, part.len());
            counters.parts_queued.fetch_add(1, Ordering::SeqCst);
            if queue.send(part).is_err() {
                warn!("Upload queue halted, part left unsent");
            }
        }
    }

    debug!(
        "Media source closed after {} bytes ({} buffered)",
        buffer.total_bytes(),
        buffer.buffered()
    );

    Ingested { buffer, queue }
}

/// Upload queued parts in order until the queue closes or a part fails
///
/// This is the session's only queue consumer. The first failure halts it
/// for good; parts still queued are never sent.
async fn drain_parts(
    mut queue: mpsc::UnboundedReceiver<UploadPart>,
    transport: Arc<dyn UploadTransport>,
    counters: Arc<SessionCounters>,
    callbacks: RecorderCallbacks,
    last_error: Arc<Mutex<Option<RecorderError>>>,
) -> Result<(), RecorderError> {
    let mut acknowledged = 0u64;

    while let Some(part) = queue.recv().await {
        let number = part.number;
        let len = part.len() as u64;

        if let Err(e) = transport.upload_part(&part).await {
            let err = RecorderError::PartUpload {
                part: number,
                message: format!("{:#}", e),
            };
            error!("Upload queue halted: {}", err);
            *last_error.lock().await = Some(err.clone());
            callbacks.error(&err);
            return Err(err);
        }

        acknowledged += len;
        counters.parts_uploaded.fetch_add(1, Ordering::SeqCst);

        debug!("Part {} uploaded ({} bytes acknowledged)", number, acknowledged);
        report_sent(&counters, &callbacks, acknowledged);
    }

    Ok(())
}

/// Raise the session's bytes-sent mark and report progress if it moved
///
/// Byte counts from the transport and per-part acknowledgements both land
/// here, so each position is reported once.
fn report_sent(counters: &SessionCounters, callbacks: &RecorderCallbacks, sent: u64) {
    let previous = counters.bytes_sent.fetch_max(sent, Ordering::SeqCst);
    if sent <= previous {
        return;
    }

    let total = counters.bytes_recorded.load(Ordering::SeqCst).max(sent);
    callbacks.progress(UploadProgress::new(sent, total));
}
