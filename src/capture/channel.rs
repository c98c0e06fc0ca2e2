// Capture source fed by the embedding application
//
// Bytes pushed through a `ChunkSender` are batched and emitted once per
// timeslice, the same way a browser media recorder hands out data. Stopping
// the source flushes whatever is still pending before closing the channel.

use anyhow::{bail, Context, Result};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::source::{MediaChunk, MediaSource};

/// Producer half of a `ChannelSource`
#[derive(Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<Bytes>,
}

impl ChunkSender {
    /// Push encoded media into the source
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(data.into())
            .await
            .context("Channel source is no longer accepting data")
    }
}

pub struct ChannelSource {
    input: Option<mpsc::Receiver<Bytes>>,
    stop_tx: Option<oneshot::Sender<()>>,
    forward_handle: Option<JoinHandle<()>>,
    live: Arc<AtomicBool>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    pub fn new(capacity: usize) -> (Self, ChunkSender) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let source = Self {
            input: Some(rx),
            stop_tx: None,
            forward_handle: None,
            live: Arc::new(AtomicBool::new(true)),
        };

        (source, ChunkSender { tx })
    }
}

#[async_trait::async_trait]
impl MediaSource for ChannelSource {
    async fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<MediaChunk>> {
        let Some(mut input) = self.input.take() else {
            bail!("Channel source has already been started");
        };

        info!("Starting channel source (timeslice: {:?})", timeslice);

        let (chunk_tx, chunk_rx) = mpsc::channel(100);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let live = Arc::clone(&self.live);

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut pending = BytesMut::new();
            let mut ticker = tokio::time::interval(timeslice.max(Duration::from_millis(1)));
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    data = input.recv() => match data {
                        Some(data) => pending.extend_from_slice(&data),
                        None => {
                            debug!("Channel source producer closed");
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if pending.is_empty() {
                            continue;
                        }
                        let chunk = MediaChunk {
                            data: pending.split().freeze(),
                            timestamp_ms: started.elapsed().as_millis() as u64,
                        };
                        if chunk_tx.send(chunk).await.is_err() {
                            debug!("Chunk receiver dropped, stopping channel source");
                            live.store(false, Ordering::SeqCst);
                            return;
                        }
                    }
                }
            }

            // Flush data that was pushed but not yet emitted
            while let Ok(data) = input.try_recv() {
                pending.extend_from_slice(&data);
            }

            if !pending.is_empty() {
                let chunk = MediaChunk {
                    data: pending.freeze(),
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                if let Err(e) = chunk_tx.send(chunk).await {
                    error!("Failed to flush final chunk: {}", e);
                }
            }

            live.store(false, Ordering::SeqCst);
            debug!("Channel source stopped");
        });

        self.stop_tx = Some(stop_tx);
        self.forward_handle = Some(handle);

        Ok(chunk_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The forwarding task may already have exited on its own
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.forward_handle.take() {
            handle.await.context("Channel source task panicked")?;
        }

        self.input = None;
        self.live.store(false, Ordering::SeqCst);

        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "channel"
    }
}
