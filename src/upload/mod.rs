pub mod http;
pub mod local;
pub mod transport;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};

pub use http::HttpTransport;
pub use local::LocalTransport;
pub use transport::{
    BytesSentCallback, UploadPart, UploadProgress, UploadTarget, UploadTransport,
};

/// Upload transport factory
pub struct TransportFactory;

impl TransportFactory {
    /// Create a fresh transport for one recorder
    pub fn create(storage: &StorageConfig, part_size: usize) -> Result<Arc<dyn UploadTransport>> {
        match storage.backend {
            StorageBackend::Local => Ok(Arc::new(LocalTransport::new(
                storage.root_path(),
                storage.public_base_url.clone(),
                part_size,
            ))),
            StorageBackend::Http => {
                let base_url = storage
                    .api_base_url
                    .clone()
                    .context("storage.api_base_url is required for the http backend")?;
                Ok(Arc::new(HttpTransport::new(base_url)))
            }
        }
    }
}
