//! Startup recovery: interrupted swaps, orphaned jobs and lost queue items.
//!
//! Runs in this order:
//!
//! 1. [`recover_swaps`] resolves every swap marker under the assets
//!    directory, either finishing the swap or restoring the original.
//! 2. [`fail_orphaned_jobs`] fails jobs still `processing` from the previous
//!    run.
//! 3. [`reconcile_pending`] re-queues assets whose pending job predates the
//!    grace period, once workers are running.

use std::path::{Path, PathBuf};
use std::time::Duration;

use assetforge_common::JobStatus;
use assetforge_db::models::CompressionJob;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use super::catalog::{fail_interrupted, Catalog, CompressionUpdate};
use super::error::CompressionError;
use super::job::{PendingJob, ProcessingJob};
use super::swap::{FileSwapper, SwapMarker, SwapPaths, MARKER_EXTENSION};
use super::worker::QueueHandle;

/// Error recorded on jobs that were running when the process stopped.
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";
/// Error recorded on jobs whose swap was rolled back at startup.
pub const INTERRUPTED_DURING_SWAP: &str = "interrupted during file swap";

/// Counts of what startup recovery did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Swaps already recorded in the catalog; only the marker was left.
    pub swaps_committed: usize,
    /// Swaps whose job completed but whose asset row was never updated.
    pub swaps_rolled_forward: usize,
    /// Swaps undone, original restored at the active path.
    pub swaps_rolled_back: usize,
    /// Markers left on disk because they could not be resolved.
    pub swaps_unresolved: usize,
    pub orphaned_jobs_failed: usize,
    pub pending_requeued: usize,
}

impl RecoveryReport {
    /// Whether recovery found nothing to do.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Committed,
    RolledForward,
    RolledBack,
    Unresolved,
}

/// Swap markers under `assets_dir`, sorted by path.
pub fn find_swap_markers(assets_dir: &Path) -> Vec<PathBuf> {
    let mut markers: Vec<PathBuf> = WalkDir::new(assets_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == MARKER_EXTENSION))
        .collect();
    markers.sort();
    markers
}

/// Resolve every swap marker left under `assets_dir`.
pub fn recover_swaps(
    catalog: &dyn Catalog,
    swapper: &FileSwapper,
    assets_dir: &Path,
    report: &mut RecoveryReport,
) {
    for marker_path in find_swap_markers(assets_dir) {
        let resolution = recover_swap(catalog, swapper, &marker_path);
        info!(marker = %marker_path.display(), resolution = ?resolution, "Resolved swap marker");
        match resolution {
            Resolution::Committed => report.swaps_committed += 1,
            Resolution::RolledForward => report.swaps_rolled_forward += 1,
            Resolution::RolledBack => report.swaps_rolled_back += 1,
            Resolution::Unresolved => report.swaps_unresolved += 1,
        }
    }
}

fn recover_swap(catalog: &dyn Catalog, swapper: &FileSwapper, marker_path: &Path) -> Resolution {
    let marker = match swapper.read_marker(marker_path) {
        Ok(marker) => marker,
        Err(e) => {
            error!(marker = %marker_path.display(), error = %e, "Unreadable swap marker");
            return Resolution::Unresolved;
        }
    };
    let paths = &marker.paths;
    let inspection = swapper.inspect(&paths.active);

    if !inspection.active_exists && !inspection.backup_exists {
        error!(
            asset_id = %marker.asset_id,
            active = %paths.active.display(),
            "Neither active file nor backup exists; leaving swap marker"
        );
        return Resolution::Unresolved;
    }

    let asset = match catalog.get_asset(marker.asset_id) {
        Ok(asset) => asset,
        Err(e) => {
            error!(asset_id = %marker.asset_id, error = %e, "Catalog unavailable during swap recovery");
            return Resolution::Unresolved;
        }
    };
    let job = catalog.get_job(marker.job_id).unwrap_or_else(|e| {
        warn!(job_id = %marker.job_id, error = %e, "Failed to load job for swap marker");
        None
    });

    let backup = paths.backup.to_string_lossy();
    let recorded = asset.as_ref().is_some_and(|a| {
        a.is_compressed && a.backup_path.as_deref() == Some(&*backup)
    });

    if recorded && inspection.active_exists {
        if let Err(e) = swapper.finish(paths) {
            error!(marker = %marker_path.display(), error = %e, "Failed to clear swap marker");
            return Resolution::Unresolved;
        }
        complete_recorded_job(catalog, job.as_ref());
        return Resolution::Committed;
    }

    let job_completed = job.as_ref().is_some_and(|j| j.status == JobStatus::Completed);
    let uncompressed = asset.as_ref().is_some_and(|a| !a.is_compressed);
    if job_completed && uncompressed && inspection.active_exists && inspection.backup_exists {
        return roll_forward(catalog, swapper, &marker);
    }

    match swapper.restore_original(paths) {
        Ok(()) => {
            if let Some(job) = &job {
                if let Err(e) = fail_interrupted(catalog, job, INTERRUPTED_DURING_SWAP) {
                    warn!(job_id = %job.id, error = %e, "Failed to record interrupted job");
                }
            }
            Resolution::RolledBack
        }
        Err(e) => {
            error!(marker = %marker_path.display(), error = %e, "Failed to roll back swap");
            Resolution::Unresolved
        }
    }
}

/// Record a swap whose files and job finished but whose asset row did not.
fn roll_forward(catalog: &dyn Catalog, swapper: &FileSwapper, marker: &SwapMarker) -> Resolution {
    let paths = &marker.paths;
    let sizes = swapper
        .size(&paths.backup)
        .and_then(|original| swapper.size(&paths.active).map(|compressed| (original, compressed)));
    let (original, compressed) = match sizes {
        Ok((original, compressed)) if original > 0 => (original, compressed),
        Ok(_) => return Resolution::Unresolved,
        Err(e) => {
            error!(asset_id = %marker.asset_id, error = %e, "Failed to measure swapped files");
            return Resolution::Unresolved;
        }
    };

    let update = CompressionUpdate {
        backup_path: paths.backup.to_string_lossy().to_string(),
        compression_ratio: compressed as f64 / original as f64,
        size_bytes: compressed as i64,
    };

    match catalog.update_asset_after_compression(marker.asset_id, &update) {
        Ok(true) => match swapper.finish(paths) {
            Ok(()) => Resolution::RolledForward,
            Err(e) => {
                error!(asset_id = %marker.asset_id, error = %e, "Failed to clear swap marker");
                Resolution::Unresolved
            }
        },
        Ok(false) => Resolution::Unresolved,
        Err(e) => {
            error!(asset_id = %marker.asset_id, error = %e, "Failed to record rolled-forward swap");
            Resolution::Unresolved
        }
    }
}

/// Complete the marker's job when the swap itself was recorded.
///
/// A job left `pending` had its start lost to a catalog failure; it is
/// started first so the transition stays forward-only.
fn complete_recorded_job(catalog: &dyn Catalog, job: Option<&CompressionJob>) {
    let Some(record) = job else {
        return;
    };
    let job = match record.status {
        JobStatus::Processing => ProcessingJob::from_record(record),
        JobStatus::Pending => PendingJob::from_record(record).and_then(|pending| {
            let job = pending.start();
            match catalog.start_job(job.id()) {
                Ok(true) => Some(job),
                Ok(false) => None,
                Err(e) => {
                    warn!(job_id = %job.id(), error = %e, "Failed to start recovered job");
                    None
                }
            }
        }),
        JobStatus::Completed | JobStatus::Failed => None,
    };
    let Some(job) = job else {
        return;
    };
    let id = job.id();
    if let Err(e) = catalog.finish_job(&job.complete()) {
        warn!(job_id = %id, error = %e, "Failed to complete recovered job");
    }
}

/// Fail every job still `processing` and discard its temp output.
///
/// Temp files next to an unresolved swap marker are kept.
pub fn fail_orphaned_jobs(
    catalog: &dyn Catalog,
    swapper: &FileSwapper,
    report: &mut RecoveryReport,
) -> Result<(), CompressionError> {
    for record in catalog.processing_jobs()? {
        match fail_interrupted(catalog, &record, INTERRUPTED_BY_RESTART) {
            Ok(true) => report.orphaned_jobs_failed += 1,
            Ok(false) => continue,
            Err(e) => {
                warn!(job_id = %record.id, error = %e, "Failed to fail orphaned job");
                continue;
            }
        }

        if let Ok(Some(asset)) = catalog.get_asset(record.asset_id) {
            let paths = SwapPaths::for_active(&asset.storage_path);
            if !swapper.inspect(&paths.active).marker_exists {
                if let Err(e) = swapper.discard_temp(&paths) {
                    warn!(asset_id = %asset.id, error = %e, "Failed to discard temp output");
                }
            }
        }
    }

    if report.orphaned_jobs_failed > 0 {
        info!(count = report.orphaned_jobs_failed, "Failed orphaned compression jobs");
    }
    Ok(())
}

/// Re-queue assets whose pending job is older than `grace`.
///
/// No new job rows are created and assets already waiting in the queue are
/// not pushed twice. Stops at the first full-queue error.
pub fn reconcile_pending(
    catalog: &dyn Catalog,
    queue: &QueueHandle,
    grace: Duration,
    report: &mut RecoveryReport,
) -> Result<(), CompressionError> {
    let grace = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
    let cutoff = Utc::now() - grace;

    for record in catalog.stale_pending_jobs(cutoff)? {
        match queue.try_push(record.asset_id) {
            Ok(true) => report.pending_requeued += 1,
            Ok(false) => continue,
            Err(e) => {
                warn!(
                    asset_id = %record.asset_id,
                    requeued = report.pending_requeued,
                    error = %e,
                    "Stopping reconcile; remaining pending jobs wait for the next sweep"
                );
                break;
            }
        }
    }

    if report.pending_requeued > 0 {
        info!(count = report.pending_requeued, "Re-queued pending compression jobs");
    }
    Ok(())
}
