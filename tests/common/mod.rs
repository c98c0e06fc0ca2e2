// Shared fixtures for recorder integration tests

#![allow(dead_code)]

use anyhow::{bail, Result};
use bytes::Bytes;
use recording_uploader::{BytesSentCallback, UploadPart, UploadTarget, UploadTransport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const MIB: usize = 1024 * 1024;

/// Every call a `MemoryTransport` received, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    InitMultipart(String),
    InitDirect(String),
    Part { number: u32, len: usize },
    Direct { len: usize },
    TotalSize(u64),
    Complete { direct: bool },
}

/// In-memory transport that records calls and can be told to fail
#[derive(Default)]
pub struct MemoryTransport {
    pub calls: Mutex<Vec<Call>>,
    pub parts: Mutex<Vec<UploadPart>>,
    pub direct: Mutex<Option<Bytes>>,
    pub mode_direct: Mutex<bool>,
    pub total_size: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub progress: Mutex<Option<BytesSentCallback>>,
    pub fail_init: bool,
    pub fail_part: Option<u32>,
    pub fail_complete: bool,
    pub complete_delay: Option<Duration>,
    /// Report bytes sent half way through each part and again at its end
    pub report_halves: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn parts(&self) -> Vec<UploadPart> {
        self.parts.lock().unwrap().clone()
    }

    pub fn direct_payload(&self) -> Option<Bytes> {
        self.direct.lock().unwrap().clone()
    }

    /// Uploaded parts joined in sequence order
    pub fn reassembled(&self) -> Vec<u8> {
        let mut parts = self.parts();
        parts.sort_by_key(|p| p.number);
        parts.iter().flat_map(|p| p.data.iter().copied()).collect()
    }

    pub fn completions(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Complete { .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn report(&self, sent: u64) {
        let progress = self.progress.lock().unwrap().clone();
        if let Some(progress) = progress {
            progress(sent);
        }
    }
}

#[async_trait::async_trait]
impl UploadTransport for MemoryTransport {
    async fn init_multipart(&self, target: &UploadTarget) -> Result<()> {
        if self.fail_init {
            bail!("multipart init refused");
        }
        *self.mode_direct.lock().unwrap() = false;
        self.bytes_sent.store(0, Ordering::SeqCst);
        self.record(Call::InitMultipart(target.key()));
        Ok(())
    }

    async fn init_direct(&self, target: &UploadTarget) -> Result<()> {
        *self.mode_direct.lock().unwrap() = true;
        self.bytes_sent.store(0, Ordering::SeqCst);
        self.record(Call::InitDirect(target.key()));
        Ok(())
    }

    async fn upload_part(&self, part: &UploadPart) -> Result<()> {
        if self.fail_part == Some(part.number) {
            bail!("connection reset");
        }
        let len = part.len() as u64;
        if self.report_halves {
            let base = self.bytes_sent.load(Ordering::SeqCst);
            self.report(base + len / 2);
        }
        let sent = self.bytes_sent.fetch_add(len, Ordering::SeqCst) + len;
        if self.report_halves {
            self.report(sent);
        }
        self.record(Call::Part {
            number: part.number,
            len: part.len(),
        });
        self.parts.lock().unwrap().push(part.clone());
        Ok(())
    }

    async fn upload_direct(&self, data: Bytes) -> Result<()> {
        self.record(Call::Direct { len: data.len() });
        *self.direct.lock().unwrap() = Some(data);
        Ok(())
    }

    fn set_total_size(&self, bytes: u64) {
        self.total_size.store(bytes, Ordering::SeqCst);
        self.record(Call::TotalSize(bytes));
    }

    fn set_progress_callback(&self, callback: Option<BytesSentCallback>) {
        *self.progress.lock().unwrap() = callback;
    }

    async fn complete(&self) -> Result<Option<String>> {
        if let Some(delay) = self.complete_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_complete {
            bail!("completion rejected");
        }
        let direct = *self.mode_direct.lock().unwrap();
        self.record(Call::Complete { direct });
        Ok(Some(format!(
            "memory://recording?direct={}&size={}",
            direct,
            self.total_size.load(Ordering::SeqCst)
        )))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Deterministic, non-repeating-ish test payload
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
