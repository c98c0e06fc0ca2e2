use anyhow::{bail, Context, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};

use super::source::{MediaChunk, MediaSource};

/// Default number of bytes read per timeslice (1 MiB)
pub const DEFAULT_READ_SIZE: usize = 1024 * 1024;

/// Why a `FileSource` stopped emitting chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEnd {
    /// The whole file was emitted
    Eof,
    /// Reading the file failed part way through
    Failed(String),
    /// Stopped by the recorder, or the chunk receiver went away
    Stopped,
}

/// Replays an existing media file as a live capture stream
///
/// Every timeslice the next `read_size` bytes of the file are emitted as one
/// chunk. The channel closes at end of file or when the source is stopped.
pub struct FileSource {
    path: PathBuf,
    file: Option<tokio::fs::File>,
    read_size: usize,
    stop_tx: Option<oneshot::Sender<()>>,
    read_handle: Option<JoinHandle<()>>,
    live: Arc<AtomicBool>,
    end_tx: Arc<watch::Sender<Option<FileEnd>>>,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening media file: {}", path.display());

        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open media file: {}", path.display()))?;

        let (end_tx, _) = watch::channel(None);

        Ok(Self {
            path,
            file: Some(file),
            read_size: DEFAULT_READ_SIZE,
            stop_tx: None,
            read_handle: None,
            live: Arc::new(AtomicBool::new(true)),
            end_tx: Arc::new(end_tx),
        })
    }

    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set once the source has stopped emitting, whatever the reason
    pub fn subscribe_end(&self) -> watch::Receiver<Option<FileEnd>> {
        self.end_tx.subscribe()
    }
}

#[async_trait::async_trait]
impl MediaSource for FileSource {
    async fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<MediaChunk>> {
        let Some(mut file) = self.file.take() else {
            bail!("File source has already been started: {}", self.path.display());
        };

        info!(
            "Starting file source: {} ({} bytes every {:?})",
            self.path.display(),
            self.read_size,
            timeslice
        );

        let (chunk_tx, chunk_rx) = mpsc::channel(100);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let live = Arc::clone(&self.live);
        let end_tx = Arc::clone(&self.end_tx);
        let read_size = self.read_size as u64;
        let path = self.path.clone();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(timeslice.max(Duration::from_millis(1)));

            let end = loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break FileEnd::Stopped,
                    _ = ticker.tick() => {
                        let mut data = Vec::with_capacity(read_size as usize);
                        match (&mut file).take(read_size).read_to_end(&mut data).await {
                            Ok(0) => {
                                info!("Reached end of media file: {}", path.display());
                                break FileEnd::Eof;
                            }
                            Ok(_) => {
                                let chunk = MediaChunk {
                                    data: Bytes::from(data),
                                    timestamp_ms: started.elapsed().as_millis() as u64,
                                };
                                if chunk_tx.send(chunk).await.is_err() {
                                    break FileEnd::Stopped;
                                }
                            }
                            Err(e) => {
                                error!("Failed to read media file {}: {}", path.display(), e);
                                break FileEnd::Failed(e.to_string());
                            }
                        }
                    }
                }
            };

            live.store(false, Ordering::SeqCst);
            end_tx.send_replace(Some(end));
        });

        self.stop_tx = Some(stop_tx);
        self.read_handle = Some(handle);

        Ok(chunk_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.read_handle.take() {
            handle.await.context("File source task panicked")?;
        }

        self.file = None;
        self.live.store(false, Ordering::SeqCst);
        self.end_tx.send_if_modified(|end| {
            if end.is_some() {
                return false;
            }
            *end = Some(FileEnd::Stopped);
            true
        });

        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
