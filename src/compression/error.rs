//! Error taxonomy for the compression pipeline.

use std::io;
use std::path::PathBuf;

use assetforge_common::{AssetId, FileKind};
use thiserror::Error;

use super::swap::SwapError;

/// Errors raised by the enqueuer, the job processor and its collaborators.
///
/// Enqueue-time errors are returned to the caller. Errors raised inside a
/// worker are recorded on the job and logged, never propagated out of the
/// worker loop.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The worker queue is at capacity. The pending job row is kept.
    #[error("compression queue is full")]
    QueueFull,

    /// Compression is switched off in the configuration.
    #[error("compression is disabled")]
    Disabled,

    /// No worker pool is running to accept the item.
    #[error("compression queue is closed")]
    QueueClosed,

    /// The asset already has a pending or processing job.
    #[error("asset {0} already has an active compression job")]
    AlreadyActive(AssetId),

    /// A catalog read or write failed.
    #[error("catalog error: {0}")]
    Persistence(#[source] assetforge_common::Error),

    #[error("asset {0} not found")]
    AssetNotFound(AssetId),

    /// Compressing again would overwrite the retained original.
    #[error("asset {0} is already compressed")]
    AlreadyCompressed(AssetId),

    #[error("unsupported media type for compression: {0}")]
    UnsupportedMediaType(FileKind),

    /// The encoder could not be spawned, timed out, or exited non-zero.
    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("file swap failed: {0}")]
    Swap(#[from] SwapError),

    /// Another process is running recovery or workers on the same store.
    #[error("store is in use by another process (lock held on {0})")]
    StoreLocked(PathBuf),

    #[error("failed to lock store at {path}: {source}")]
    Lock { path: PathBuf, source: io::Error },
}

impl From<assetforge_common::Error> for CompressionError {
    fn from(e: assetforge_common::Error) -> Self {
        Self::Persistence(e)
    }
}

pub type Result<T> = std::result::Result<T, CompressionError>;
