use anyhow::{ensure, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::RecordingKind;
use crate::recorder::{RecorderConfig, DEFAULT_DIRECT_UPLOAD_THRESHOLD, DEFAULT_PART_SIZE};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub recorder: RecorderSettings,
    pub storage: StorageConfig,
    #[serde(default)]
    pub nats: Option<NatsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    pub kind: RecordingKind,
    pub timeslice_ms: u64,
    pub part_size: usize,
    pub direct_upload_threshold: u64,
    pub flush_timeout_ms: u64,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            kind: RecordingKind::default(),
            timeslice_ms: 5000,
            part_size: DEFAULT_PART_SIZE,
            direct_upload_threshold: DEFAULT_DIRECT_UPLOAD_THRESHOLD,
            flush_timeout_ms: 10_000,
        }
    }
}

impl RecorderSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.part_size > 0, "recorder.part_size must be greater than zero");
        ensure!(
            self.timeslice_ms > 0,
            "recorder.timeslice_ms must be greater than zero"
        );
        Ok(())
    }
}

impl From<&RecorderSettings> for RecorderConfig {
    fn from(settings: &RecorderSettings) -> Self {
        Self {
            kind: settings.kind,
            timeslice: Duration::from_millis(settings.timeslice_ms),
            part_size: settings.part_size,
            direct_upload_threshold: settings.direct_upload_threshold,
            flush_timeout: Duration::from_millis(settings.flush_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Object store directory (local backend)
    pub root: String,
    /// Base URL objects are served from (local backend)
    pub public_base_url: String,
    /// Remote upload API (http backend)
    pub api_base_url: Option<String>,
}

impl StorageConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.root).as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

impl Config {
    /// Load from `path` (any format the `config` crate knows), overridden by
    /// `RECORDER__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("RECORDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.recorder.validate()?;

        Ok(config)
    }
}
