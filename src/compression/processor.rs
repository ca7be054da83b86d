//! Job processor: drives one queued asset through the job state machine.
//!
//! For each asset id taken off the queue the processor claims a job
//! (`pending -> processing`, or a fresh `processing` row when no pending job
//! exists), runs the encoder into a temp file, commits the file swap, records
//! the compressed asset and finishes the job. Any failure before the swap
//! leaves the asset untouched and fails the job.

use std::sync::Arc;

use assetforge_common::{AssetId, Error};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::catalog::{Catalog, CompressionUpdate};
use super::error::{CompressionError, Result};
use super::events::JobEvent;
use super::job::{FinishedJob, PendingJob, ProcessingJob};
use super::swap::{FileSwapper, SwapError, SwapPaths};
use super::transcoder::{ensure_supported, Transcoder};
use crate::config::PersistencePolicy;

/// A swap that has been committed on disk.
struct Committed {
    paths: SwapPaths,
    compression_ratio: f64,
    /// The asset row reflects the swap.
    catalog_updated: bool,
}

enum Claim {
    Job(ProcessingJob),
    /// Nothing was processed and no job row changed.
    Skipped(String),
}

pub struct JobProcessor {
    catalog: Arc<dyn Catalog>,
    transcoder: Arc<dyn Transcoder>,
    swapper: FileSwapper,
    policy: PersistencePolicy,
    events: Option<broadcast::Sender<JobEvent>>,
}

impl JobProcessor {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        transcoder: Arc<dyn Transcoder>,
        swapper: FileSwapper,
        policy: PersistencePolicy,
    ) -> Self {
        Self {
            catalog,
            transcoder,
            swapper,
            policy,
            events: None,
        }
    }

    /// Broadcast [`JobEvent`]s on `events`.
    pub fn with_events(mut self, events: broadcast::Sender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Process one queue item to completion.
    ///
    /// Never returns an error: failures are recorded on the job and logged.
    /// Returns `None` when no job could be claimed for the asset.
    pub async fn process(&self, asset_id: AssetId) -> Option<FinishedJob> {
        let job = match self.claim(asset_id) {
            Claim::Job(job) => job,
            Claim::Skipped(reason) => {
                warn!(asset_id = %asset_id, reason = %reason, "Skipping queued asset");
                self.emit(JobEvent::Skipped { asset_id, reason });
                return None;
            }
        };

        info!(
            job_id = %job.id(),
            asset_id = %asset_id,
            recovered = job.is_recovered(),
            "Processing compression job"
        );
        self.emit(JobEvent::Started {
            job_id: job.id(),
            asset_id,
        });

        let finished = match self.compress(&job).await {
            Ok(committed) => self.complete(job, committed),
            Err(e) => {
                error!(job_id = %job.id(), asset_id = %asset_id, error = %e, "Compression failed");
                let finished = job.fail(e.to_string());
                if self.record_finished(&finished) {
                    self.emit_finished(&finished, None);
                }
                finished
            }
        };

        Some(finished)
    }

    fn claim(&self, asset_id: AssetId) -> Claim {
        let record = match self.catalog.find_most_recent_pending_job(asset_id) {
            Ok(record) => record,
            Err(e) => return Claim::Skipped(format!("failed to look up pending job: {e}")),
        };

        let Some(record) = record else {
            // A compressed asset with no pending job was queued twice
            match self.catalog.get_asset(asset_id) {
                Ok(Some(asset)) if asset.is_compressed => {
                    return Claim::Skipped("asset already compressed".to_string());
                }
                Ok(_) => {}
                Err(e) => return Claim::Skipped(format!("failed to load asset: {e}")),
            }
            return match self.catalog.insert_recovered_job(asset_id) {
                Ok(record) => match ProcessingJob::from_record(&record) {
                    Some(job) => {
                        warn!(
                            job_id = %job.id(),
                            asset_id = %asset_id,
                            "No pending job found, created one in processing state"
                        );
                        Claim::Job(job)
                    }
                    None => Claim::Skipped(format!("job {} is not processing", record.id)),
                },
                Err(e) if e.is_not_found() => Claim::Skipped("asset not found".to_string()),
                Err(Error::Conflict(_)) => {
                    Claim::Skipped("another job is active for this asset".to_string())
                }
                Err(e) => Claim::Skipped(format!("failed to record job: {e}")),
            };
        };

        let Some(pending) = PendingJob::from_record(&record) else {
            return Claim::Skipped(format!("job {} is not pending", record.id));
        };
        let job = pending.start();

        match self.catalog.start_job(job.id()) {
            Ok(true) => Claim::Job(job),
            Ok(false) => Claim::Skipped(format!("job {} was claimed elsewhere", job.id())),
            Err(e) => {
                error!(job_id = %job.id(), error = %e, "Failed to record processing state");
                match self.policy {
                    PersistencePolicy::Continue => Claim::Job(job),
                    // The row is still pending, so the next reconcile sweep retries it
                    PersistencePolicy::Abort => {
                        Claim::Skipped(format!("failed to record processing state: {e}"))
                    }
                }
            }
        }
    }

    async fn compress(&self, job: &ProcessingJob) -> Result<Committed> {
        let asset_id = job.asset_id();
        let asset = self
            .catalog
            .get_asset(asset_id)?
            .ok_or(CompressionError::AssetNotFound(asset_id))?;

        if asset.is_compressed {
            return Err(CompressionError::AlreadyCompressed(asset_id));
        }
        ensure_supported(asset.file_kind)?;

        let paths = SwapPaths::for_active(&asset.storage_path);
        // Output left over from an earlier attempt
        self.swapper.discard_temp(&paths)?;

        if let Err(e) = self
            .transcoder
            .transcode(&paths.active, &paths.temp, asset.file_kind)
            .await
        {
            self.discard_temp_quietly(&paths);
            return Err(e);
        }

        let outcome = match self.swapper.commit(asset_id, job.id(), &paths) {
            Ok(outcome) => outcome,
            Err(e) => {
                if !matches!(e, SwapError::RestoreFailed { .. }) {
                    self.discard_temp_quietly(&paths);
                }
                return Err(e.into());
            }
        };

        let update = CompressionUpdate {
            backup_path: paths.backup.to_string_lossy().to_string(),
            compression_ratio: outcome.compression_ratio(),
            size_bytes: outcome.compressed_size as i64,
        };

        match self.catalog.update_asset_after_compression(asset_id, &update) {
            Ok(true) => Ok(Committed {
                paths,
                compression_ratio: update.compression_ratio,
                catalog_updated: true,
            }),
            Ok(false) => {
                self.undo_swap(&paths);
                match self.catalog.get_asset(asset_id) {
                    Ok(None) => Err(CompressionError::AssetNotFound(asset_id)),
                    _ => Err(CompressionError::AlreadyCompressed(asset_id)),
                }
            }
            Err(e) => match self.policy {
                PersistencePolicy::Continue => {
                    error!(
                        job_id = %job.id(),
                        asset_id = %asset_id,
                        error = %e,
                        "Failed to record compressed asset; swap marker kept for recovery"
                    );
                    Ok(Committed {
                        paths,
                        compression_ratio: update.compression_ratio,
                        catalog_updated: false,
                    })
                }
                PersistencePolicy::Abort => {
                    self.undo_swap(&paths);
                    Err(CompressionError::Persistence(e))
                }
            },
        }
    }

    fn complete(&self, job: ProcessingJob, committed: Committed) -> FinishedJob {
        let finished = job.complete();
        let recorded = self.record_finished(&finished);

        if committed.catalog_updated && recorded {
            if let Err(e) = self.swapper.finish(&committed.paths) {
                warn!(
                    job_id = %finished.id(),
                    error = %e,
                    "Failed to clear swap marker"
                );
            }
        }

        if recorded {
            info!(
                job_id = %finished.id(),
                asset_id = %finished.asset_id(),
                compression_ratio = committed.compression_ratio,
                "Compression completed"
            );
            self.emit_finished(&finished, Some(committed.compression_ratio));
        } else {
            warn!(
                job_id = %finished.id(),
                asset_id = %finished.asset_id(),
                "Compressed file is in place but the job was not completed; swap marker kept for recovery"
            );
        }
        finished
    }

    /// Persist a terminal state. Returns whether the catalog accepted it.
    fn record_finished(&self, finished: &FinishedJob) -> bool {
        match self.catalog.finish_job(finished) {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    job_id = %finished.id(),
                    status = %finished.status(),
                    "Job was not in a state that accepts this transition"
                );
                false
            }
            Err(e) => {
                error!(
                    job_id = %finished.id(),
                    status = %finished.status(),
                    error = %e,
                    "Failed to record job result"
                );
                false
            }
        }
    }

    fn undo_swap(&self, paths: &SwapPaths) {
        if let Err(e) = self.swapper.restore_original(paths) {
            error!(
                active = %paths.active.display(),
                error = %e,
                "Failed to restore original after swap"
            );
        }
    }

    fn discard_temp_quietly(&self, paths: &SwapPaths) {
        if let Err(e) = self.swapper.discard_temp(paths) {
            warn!(temp = %paths.temp.display(), error = %e, "Failed to remove compressed output");
        }
    }

    fn emit_finished(&self, finished: &FinishedJob, compression_ratio: Option<f64>) {
        let event = match finished.error() {
            None => JobEvent::Completed {
                job_id: finished.id(),
                asset_id: finished.asset_id(),
                compression_ratio: compression_ratio.unwrap_or(1.0),
            },
            Some(error) => JobEvent::Failed {
                job_id: finished.id(),
                asset_id: finished.asset_id(),
                error: error.to_string(),
            },
        };
        self.emit(event);
    }

    fn emit(&self, event: JobEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is fine
            let _ = tx.send(event);
        }
    }
}
