// Integration tests for media capture sources

use anyhow::Result;
use recording_uploader::{ChannelSource, FileEnd, FileSource, MediaChunk, MediaSource};
use std::io::Write;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::mpsc;

async fn collect(mut rx: mpsc::Receiver<MediaChunk>) -> Vec<MediaChunk> {
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    chunks
}

fn joined(chunks: &[MediaChunk]) -> Vec<u8> {
    chunks.iter().flat_map(|c| c.data.iter().copied()).collect()
}

#[tokio::test]
async fn test_channel_source_flushes_pending_data_on_stop() -> Result<()> {
    // A long timeslice keeps everything pending until stop
    let (mut source, sender) = ChannelSource::new(16);
    let rx = source.start(Duration::from_secs(60)).await?;

    sender.send(vec![1u8, 2, 3]).await?;
    sender.send(vec![4u8, 5]).await?;

    source.stop().await?;
    let chunks = collect(rx).await;

    assert_eq!(chunks.len(), 1, "pending bytes are flushed as one chunk");
    assert_eq!(joined(&chunks), vec![1, 2, 3, 4, 5]);
    assert!(!source.is_live());

    Ok(())
}

#[tokio::test]
async fn test_channel_source_emits_per_timeslice() -> Result<()> {
    let (mut source, sender) = ChannelSource::new(16);
    let mut rx = source.start(Duration::from_millis(10)).await?;

    sender.send(vec![7u8; 100]).await?;
    let first = rx.recv().await.expect("chunk after one timeslice");
    assert_eq!(first.data.len(), 100);

    sender.send(vec![8u8; 50]).await?;
    let second = rx.recv().await.expect("chunk after another timeslice");
    assert_eq!(second.data.len(), 50);
    assert!(second.timestamp_ms >= first.timestamp_ms);

    source.stop().await?;
    assert!(rx.recv().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_channel_source_closes_when_producer_drops() -> Result<()> {
    let (mut source, sender) = ChannelSource::new(16);
    let rx = source.start(Duration::from_secs(60)).await?;

    sender.send(vec![9u8; 10]).await?;
    drop(sender);

    let chunks = collect(rx).await;
    assert_eq!(joined(&chunks), vec![9u8; 10]);

    Ok(())
}

#[tokio::test]
async fn test_channel_source_starts_once() -> Result<()> {
    let (mut source, _sender) = ChannelSource::new(16);
    let _rx = source.start(Duration::from_millis(10)).await?;

    assert!(source.start(Duration::from_millis(10)).await.is_err());

    source.stop().await?;

    Ok(())
}

#[tokio::test]
async fn test_file_source_replays_whole_file() -> Result<()> {
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
    let mut file = NamedTempFile::new()?;
    file.write_all(&payload)?;

    let source = FileSource::open(file.path()).await?.with_read_size(3000);
    let mut ended = source.subscribe_end();
    let mut source: Box<dyn MediaSource> = Box::new(source);

    let rx = source.start(Duration::from_millis(1)).await?;
    let chunks = collect(rx).await;

    let sizes: Vec<usize> = chunks.iter().map(|c| c.data.len()).collect();
    assert_eq!(sizes, vec![3000, 3000, 3000, 1000]);
    assert_eq!(joined(&chunks), payload);

    let end = ended.wait_for(|end| end.is_some()).await?.clone();
    assert_eq!(end, Some(FileEnd::Eof));
    assert!(!source.is_live());

    source.stop().await?;

    Ok(())
}

#[tokio::test]
async fn test_file_source_stop_closes_channel() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(&vec![0u8; 4096])?;

    let mut source = FileSource::open(file.path()).await?.with_read_size(16);
    let ended = source.subscribe_end();
    let rx = source.start(Duration::from_secs(60)).await?;

    source.stop().await?;
    let chunks = collect(rx).await;

    // Only the immediate first tick can have produced data
    assert!(chunks.len() <= 1);
    assert!(!source.is_live());
    assert_eq!(*ended.borrow(), Some(FileEnd::Stopped));

    Ok(())
}

#[tokio::test]
async fn test_file_source_missing_file() {
    assert!(FileSource::open("/definitely/not/here.webm").await.is_err());
}

#[tokio::test]
async fn test_file_source_read_failure_ends_source() -> Result<()> {
    // Directories open fine but every read fails
    let dir = TempDir::new()?;
    let source = FileSource::open(dir.path()).await?;
    let mut ended = source.subscribe_end();
    let mut source: Box<dyn MediaSource> = Box::new(source);

    let rx = source.start(Duration::from_millis(1)).await?;
    let chunks = collect(rx).await;
    assert!(chunks.is_empty());

    let end = tokio::time::timeout(Duration::from_secs(5), ended.wait_for(|end| end.is_some()))
        .await??
        .clone();
    assert!(matches!(end, Some(FileEnd::Failed(_))), "{:?}", end);
    assert!(!source.is_live());

    // Stopping afterwards keeps the failure as the reason
    source.stop().await?;
    assert!(matches!(*ended.borrow(), Some(FileEnd::Failed(_))));

    Ok(())
}
