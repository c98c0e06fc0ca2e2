use anyhow::{bail, Context, Result};
use bytes::Bytes;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::transport::{BytesSentCallback, UploadPart, UploadTarget, UploadTransport};

/// Request bodies are streamed in slices of this size so progress can be
/// reported while a part is in flight
const STREAM_SLICE: usize = 64 * 1024;
use crate::capture::RecordingKind;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct InitUploadRequest {
    pub kind: RecordingKind,
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitUploadResponse {
    pub upload_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    pub total_size: u64,
    /// Number of parts (multipart uploads only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    pub url: Option<String>,
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Multipart,
    Direct,
}

impl Mode {
    fn path(&self) -> &'static str {
        match self {
            Mode::Multipart => "multipart",
            Mode::Direct => "direct",
        }
    }
}

struct RemoteUpload {
    mode: Mode,
    upload_id: String,
    parts_uploaded: u32,
}

/// Client for a remote upload API
pub struct HttpTransport {
    client: Client,
    base_url: String,
    upload: Mutex<Option<RemoteUpload>>,
    total_size: AtomicU64,
    bytes_sent: Arc<AtomicU64>,
    progress: RwLock<Option<BytesSentCallback>>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            base_url,
            upload: Mutex::new(None),
            total_size: AtomicU64::new(0),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            progress: RwLock::new(None),
        }
    }

    async fn init(&self, mode: Mode, target: &UploadTarget) -> Result<()> {
        let url = format!("{}/uploads/{}", self.base_url, mode.path());

        let response: InitUploadResponse = self
            .client
            .post(&url)
            .json(&InitUploadRequest {
                kind: target.kind,
                key: target.key(),
            })
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?
            .error_for_status()
            .with_context(|| format!("Upload API rejected {} upload init", mode.path()))?
            .json()
            .await
            .context("Invalid init response")?;

        info!(
            "Remote {} upload {} opened for {}",
            mode.path(),
            response.upload_id,
            target.key()
        );

        *self.upload.lock().await = Some(RemoteUpload {
            mode,
            upload_id: response.upload_id,
            parts_uploaded: 0,
        });
        self.total_size.store(0, Ordering::SeqCst);
        self.bytes_sent.store(0, Ordering::SeqCst);

        Ok(())
    }

    /// Body that counts each slice as the connection pulls it
    fn counted_body(&self, data: Bytes) -> Body {
        let bytes_sent = Arc::clone(&self.bytes_sent);
        let progress = self.progress.read().ok().and_then(|p| p.clone());
        let len = data.len();

        let slices = (0..len).step_by(STREAM_SLICE).map(move |start| {
            let slice = data.slice(start..(start + STREAM_SLICE).min(len));
            let sent = bytes_sent.fetch_add(slice.len() as u64, Ordering::SeqCst)
                + slice.len() as u64;
            if let Some(progress) = &progress {
                progress(sent);
            }
            Ok::<Bytes, std::io::Error>(slice)
        });

        Body::wrap_stream(futures::stream::iter(slices))
    }

    async fn put(&self, url: &str, body: Bytes) -> Result<()> {
        let len = body.len();

        self.client
            .put(url)
            .header(CONTENT_LENGTH, len)
            .body(self.counted_body(body))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?
            .error_for_status()
            .with_context(|| format!("Upload API rejected {}", url))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl UploadTransport for HttpTransport {
    async fn init_multipart(&self, target: &UploadTarget) -> Result<()> {
        self.init(Mode::Multipart, target).await
    }

    async fn init_direct(&self, target: &UploadTarget) -> Result<()> {
        self.init(Mode::Direct, target).await
    }

    async fn upload_part(&self, part: &UploadPart) -> Result<()> {
        let url = {
            let upload = self.upload.lock().await;
            match upload.as_ref() {
                Some(upload) if upload.mode == Mode::Multipart => format!(
                    "{}/uploads/multipart/{}/parts/{}",
                    self.base_url, upload.upload_id, part.number
                ),
                _ => bail!("No multipart upload in progress"),
            }
        };

        self.put(&url, part.data.clone()).await?;

        if let Some(upload) = self.upload.lock().await.as_mut() {
            upload.parts_uploaded += 1;
        }

        debug!("Uploaded part {} ({} bytes)", part.number, part.len());

        Ok(())
    }

    async fn upload_direct(&self, data: Bytes) -> Result<()> {
        let url = {
            let upload = self.upload.lock().await;
            match upload.as_ref() {
                Some(upload) if upload.mode == Mode::Direct => {
                    format!("{}/uploads/direct/{}", self.base_url, upload.upload_id)
                }
                _ => bail!("No direct upload in progress"),
            }
        };

        let len = data.len();
        self.put(&url, data).await?;

        debug!("Uploaded direct payload ({} bytes)", len);

        Ok(())
    }

    fn set_total_size(&self, bytes: u64) {
        self.total_size.store(bytes, Ordering::SeqCst);
    }

    fn set_progress_callback(&self, callback: Option<BytesSentCallback>) {
        if let Ok(mut progress) = self.progress.write() {
            *progress = callback;
        }
    }

    async fn complete(&self) -> Result<Option<String>> {
        let Some(upload) = self.upload.lock().await.take() else {
            bail!("No upload in progress");
        };

        let url = format!(
            "{}/uploads/{}/{}/complete",
            self.base_url,
            upload.mode.path(),
            upload.upload_id
        );

        let request = CompleteUploadRequest {
            total_size: self.total_size.load(Ordering::SeqCst),
            parts: (upload.mode == Mode::Multipart).then_some(upload.parts_uploaded),
        };

        let response: CompleteUploadResponse = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?
            .error_for_status()
            .context("Upload API rejected completion")?
            .json()
            .await
            .context("Invalid completion response")?;

        info!(
            "Remote {} upload {} completed",
            upload.mode.path(),
            upload.upload_id
        );

        Ok(response.url)
    }

    fn name(&self) -> &str {
        "http"
    }
}
