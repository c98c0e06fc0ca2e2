// Directory-backed object store
//
// Multipart parts are staged under `<root>/.multipart/<upload-id>/` and
// concatenated into `<root>/<key>` on completion. Completion enforces the
// same rules as a remote multipart backend: part numbers must be exactly
// 1..=N and every part except the last must have the configured part size.

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transport::{UploadPart, UploadTarget, UploadTransport};

const STAGING_DIR: &str = ".multipart";

enum LocalUpload {
    Multipart {
        key: String,
        staging_dir: PathBuf,
        /// part number -> size in bytes
        parts: BTreeMap<u32, u64>,
    },
    Direct {
        key: String,
        data: Option<Bytes>,
    },
}

pub struct LocalTransport {
    root: PathBuf,
    public_base_url: String,
    part_size: usize,
    upload: Mutex<Option<LocalUpload>>,
    total_size: AtomicU64,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>, part_size: usize) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
            part_size: part_size.max(1),
            upload: Mutex::new(None),
            total_size: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/objects/{}", self.public_base_url.trim_end_matches('/'), key)
    }

    async fn discard(&self, upload: Option<LocalUpload>) {
        if let Some(LocalUpload::Multipart { staging_dir, .. }) = upload {
            if let Err(e) = fs::remove_dir_all(&staging_dir).await {
                warn!(
                    "Failed to remove abandoned multipart staging dir {}: {}",
                    staging_dir.display(),
                    e
                );
            }
        }
    }

    async fn write_object(&self, key: &str) -> Result<(PathBuf, fs::File)> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create object directory")?;
        }

        let file = fs::File::create(&path)
            .await
            .with_context(|| format!("Failed to create object: {}", path.display()))?;

        Ok((path, file))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        staging_dir: &Path,
        parts: &BTreeMap<u32, u64>,
    ) -> Result<Option<String>> {
        if parts.is_empty() {
            return Ok(None);
        }

        for (expected, (&number, &size)) in (1u32..).zip(parts.iter()) {
            ensure!(
                number == expected,
                "Part numbers are not contiguous: expected part {}, found part {}",
                expected,
                number
            );

            let is_last = number as usize == parts.len();
            ensure!(
                is_last || size == self.part_size as u64,
                "Part {} is {} bytes; every part except the last must be {} bytes",
                number,
                size,
                self.part_size
            );
        }

        let uploaded: u64 = parts.values().sum();
        let announced = self.total_size.load(Ordering::SeqCst);
        ensure!(
            announced == 0 || announced == uploaded,
            "Announced size {} does not match uploaded size {}",
            announced,
            uploaded
        );

        let (path, mut object) = self.write_object(key).await?;
        for number in parts.keys() {
            let mut part = fs::File::open(part_path(staging_dir, *number))
                .await
                .with_context(|| format!("Failed to open staged part {}", number))?;
            tokio::io::copy(&mut part, &mut object)
                .await
                .with_context(|| format!("Failed to append part {}", number))?;
        }
        object.flush().await.context("Failed to flush object")?;

        fs::remove_dir_all(staging_dir)
            .await
            .context("Failed to remove multipart staging dir")?;

        info!(
            "Multipart upload complete: {} ({} parts, {} bytes)",
            path.display(),
            parts.len(),
            uploaded
        );

        Ok(Some(self.object_url(key)))
    }
}

fn part_path(staging_dir: &Path, number: u32) -> PathBuf {
    staging_dir.join(format!("part-{:05}", number))
}

#[async_trait::async_trait]
impl UploadTransport for LocalTransport {
    async fn init_multipart(&self, target: &UploadTarget) -> Result<()> {
        let upload_id = Uuid::new_v4().to_string();
        let staging_dir = self.root.join(STAGING_DIR).join(&upload_id);

        fs::create_dir_all(&staging_dir)
            .await
            .with_context(|| format!("Failed to create staging dir: {}", staging_dir.display()))?;

        let previous = {
            let mut upload = self.upload.lock().await;
            upload.replace(LocalUpload::Multipart {
                key: target.key(),
                staging_dir,
                parts: BTreeMap::new(),
            })
        };
        self.discard(previous).await;
        self.total_size.store(0, Ordering::SeqCst);

        info!("Multipart upload {} opened for {}", upload_id, target.key());

        Ok(())
    }

    async fn init_direct(&self, target: &UploadTarget) -> Result<()> {
        let previous = {
            let mut upload = self.upload.lock().await;
            upload.replace(LocalUpload::Direct {
                key: target.key(),
                data: None,
            })
        };
        self.discard(previous).await;
        self.total_size.store(0, Ordering::SeqCst);

        info!("Direct upload opened for {}", target.key());

        Ok(())
    }

    async fn upload_part(&self, part: &UploadPart) -> Result<()> {
        let mut upload = self.upload.lock().await;

        let Some(LocalUpload::Multipart {
            staging_dir, parts, ..
        }) = upload.as_mut()
        else {
            bail!("No multipart upload in progress");
        };

        ensure!(part.number >= 1, "Part numbers start at 1");

        fs::write(part_path(staging_dir, part.number), &part.data)
            .await
            .with_context(|| format!("Failed to stage part {}", part.number))?;
        parts.insert(part.number, part.len() as u64);

        debug!("Staged part {} ({} bytes)", part.number, part.len());

        Ok(())
    }

    async fn upload_direct(&self, data: Bytes) -> Result<()> {
        let mut upload = self.upload.lock().await;

        let Some(LocalUpload::Direct { data: slot, .. }) = upload.as_mut() else {
            bail!("No direct upload in progress");
        };

        debug!("Received direct upload payload ({} bytes)", data.len());
        *slot = Some(data);

        Ok(())
    }

    fn set_total_size(&self, bytes: u64) {
        self.total_size.store(bytes, Ordering::SeqCst);
    }

    async fn complete(&self) -> Result<Option<String>> {
        let Some(upload) = self.upload.lock().await.take() else {
            bail!("No upload in progress");
        };

        match upload {
            LocalUpload::Multipart {
                key,
                staging_dir,
                parts,
            } => {
                let result = self.complete_multipart(&key, &staging_dir, &parts).await;
                if parts.is_empty() || result.is_err() {
                    self.discard(Some(LocalUpload::Multipart {
                        key,
                        staging_dir,
                        parts,
                    }))
                    .await;
                }
                result
            }
            LocalUpload::Direct { key, data } => {
                let Some(data) = data else {
                    return Ok(None);
                };

                let (path, mut object) = self.write_object(&key).await?;
                object
                    .write_all(&data)
                    .await
                    .with_context(|| format!("Failed to write object: {}", path.display()))?;
                object.flush().await.context("Failed to flush object")?;

                info!("Direct upload complete: {} ({} bytes)", path.display(), data.len());

                Ok(Some(self.object_url(&key)))
            }
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}
