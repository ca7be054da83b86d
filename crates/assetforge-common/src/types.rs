//! Core type definitions for assets and compression jobs.
//!
//! All enums are serialized in lowercase, which is also how they are stored
//! in the catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad category of an uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Still image (png, jpeg, webp, ...).
    Image,
    /// Office document, PDF or plain text.
    Document,
    /// Audio recording.
    Audio,
    /// Video file.
    Video,
    /// Source code or structured text.
    Code,
    /// Anything we could not classify.
    Other,
}

impl FileKind {
    /// Whether the background compression pipeline handles this kind.
    #[must_use]
    pub fn is_compressible(self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Document => write!(f, "document"),
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Code => write!(f, "code"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            "code" => Ok(Self::Code),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid file kind: {}", s)),
        }
    }
}

/// Persisted status of a compression job.
///
/// Only the forward transitions `pending -> processing -> completed|failed`
/// exist. The typestate wrappers in the compression module are the only
/// way to produce a status change; this enum is the stored representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created at enqueue time, waiting for a worker.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Compressed output committed.
    Completed,
    /// Attempt ended without touching the asset.
    Failed,
}

impl JobStatus {
    /// Whether no further transition is possible from this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}
