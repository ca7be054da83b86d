use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub compression: CompressionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding managed asset files, backups and swap markers
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// SQLite catalog file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("./cdn/assets")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/assets.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Largest accepted upload in bytes (default: 100 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// What a worker does when a catalog write fails mid-job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistencePolicy {
    /// Log the failure and carry on with the remaining steps.
    #[default]
    Continue,
    /// Stop the job, undoing any file swap already made.
    Abort,
}

impl std::str::FromStr for PersistencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            _ => Err(format!("Invalid persistence policy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompressionConfig {
    /// Run the background compression pipeline (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of concurrent workers (default: 2)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Capacity of the in-memory job queue (default: 100)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Encoder quality for images, 1-100 (default: 85)
    #[serde(default = "default_image_quality")]
    pub image_quality: u32,

    /// Declared for deployments that set it. Not applied to the video
    /// encoder arguments.
    #[serde(default = "default_video_max_height")]
    pub video_max_height: u32,

    /// Declared for deployments that set it. Backups are kept indefinitely.
    #[serde(default = "default_retain_original_days")]
    pub retain_original_days: u32,

    /// Encoder executable (default: "ffmpeg" resolved on PATH)
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Kill the encoder after this many seconds (default: no limit)
    #[serde(default)]
    pub encoder_timeout_secs: Option<u64>,

    /// Handling of catalog write failures inside a running job
    #[serde(default)]
    pub persistence_failure: PersistencePolicy,

    /// Pending jobs younger than this are left alone by the reconcile
    /// sweep (default: 0)
    #[serde(default)]
    pub reconcile_grace_secs: u64,

    /// Seconds between reconcile sweeps while `start` runs; 0 sweeps only at
    /// startup (default: 30)
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_worker_count() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    100
}

fn default_image_quality() -> u32 {
    85
}

fn default_video_max_height() -> u32 {
    1080
}

fn default_retain_original_days() -> u32 {
    7
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            image_quality: default_image_quality(),
            video_max_height: default_video_max_height(),
            retain_original_days: default_retain_original_days(),
            ffmpeg_path: default_ffmpeg_path(),
            encoder_timeout_secs: None,
            persistence_failure: PersistencePolicy::default(),
            reconcile_grace_secs: 0,
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

impl CompressionConfig {
    pub fn encoder_timeout(&self) -> Option<Duration> {
        self.encoder_timeout_secs.map(Duration::from_secs)
    }

    pub fn reconcile_grace(&self) -> Duration {
        Duration::from_secs(self.reconcile_grace_secs)
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0)
            .then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}
