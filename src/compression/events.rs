//! Job lifecycle events broadcast by the job processor.

use assetforge_common::{AssetId, CompressionJobId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the event channel. Slow subscribers miss older events.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: CompressionJobId,
        asset_id: AssetId,
    },
    Completed {
        job_id: CompressionJobId,
        asset_id: AssetId,
        compression_ratio: f64,
    },
    Failed {
        job_id: CompressionJobId,
        asset_id: AssetId,
        error: String,
    },
    /// A queued asset was not processed and no job was recorded for it.
    Skipped {
        asset_id: AssetId,
        reason: String,
    },
}

impl JobEvent {
    pub fn asset_id(&self) -> AssetId {
        match self {
            Self::Started { asset_id, .. }
            | Self::Completed { asset_id, .. }
            | Self::Failed { asset_id, .. }
            | Self::Skipped { asset_id, .. } => *asset_id,
        }
    }

    /// Whether this event ends processing of one queue item.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. })
    }
}

/// Create a sender for [`JobEvent`]s.
pub fn channel() -> broadcast::Sender<JobEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}
