//! Entry point of the compression pipeline: enqueue, workers, recovery.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use assetforge_common::{AssetId, CompressionJobId, Error};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::catalog::Catalog;
use super::error::{CompressionError, Result};
use super::events::JobEvent;
use super::lock::StoreLock;
use super::processor::JobProcessor;
use super::recovery::{self, RecoveryReport};
use super::swap::{FileSwapper, Filesystem};
use super::transcoder::Transcoder;
use super::worker::{QueueHandle, WorkerPool};
use crate::config::CompressionConfig;

struct Running {
    pool: WorkerPool,
    queue: QueueHandle,
}

/// Owns the worker pool and exposes the enqueue operation.
///
/// All collaborators are passed in; nothing is read from global state.
/// [`recover`](Self::recover) and [`start`](Self::start) take the store's
/// [`StoreLock`] and keep it until the workers stop, so only one process at a
/// time recovers or processes a given assets directory.
pub struct CompressionService {
    config: CompressionConfig,
    assets_dir: PathBuf,
    catalog: Arc<dyn Catalog>,
    swapper: FileSwapper,
    processor: Arc<JobProcessor>,
    events: Option<broadcast::Sender<JobEvent>>,
    running: Mutex<Option<Running>>,
    lock: Mutex<Option<StoreLock>>,
}

impl CompressionService {
    pub fn new(
        config: CompressionConfig,
        assets_dir: PathBuf,
        catalog: Arc<dyn Catalog>,
        transcoder: Arc<dyn Transcoder>,
        fs: Arc<dyn Filesystem>,
    ) -> Self {
        Self::build(config, assets_dir, catalog, transcoder, fs, None)
    }

    /// Like [`new`](Self::new), broadcasting job events on `events`.
    pub fn with_events(
        config: CompressionConfig,
        assets_dir: PathBuf,
        catalog: Arc<dyn Catalog>,
        transcoder: Arc<dyn Transcoder>,
        fs: Arc<dyn Filesystem>,
        events: broadcast::Sender<JobEvent>,
    ) -> Self {
        Self::build(config, assets_dir, catalog, transcoder, fs, Some(events))
    }

    fn build(
        config: CompressionConfig,
        assets_dir: PathBuf,
        catalog: Arc<dyn Catalog>,
        transcoder: Arc<dyn Transcoder>,
        fs: Arc<dyn Filesystem>,
        events: Option<broadcast::Sender<JobEvent>>,
    ) -> Self {
        let swapper = FileSwapper::new(fs);
        let mut processor = JobProcessor::new(
            Arc::clone(&catalog),
            transcoder,
            swapper.clone(),
            config.persistence_failure,
        );
        if let Some(tx) = &events {
            processor = processor.with_events(tx.clone());
        }

        Self {
            config,
            assets_dir,
            catalog,
            swapper,
            processor: Arc::new(processor),
            events,
            running: Mutex::new(None),
            lock: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Whether this service currently holds the store lock.
    pub fn holds_store_lock(&self) -> bool {
        self.lock.lock().is_some()
    }

    /// Take the store lock unless this service already holds it.
    ///
    /// Fails with [`CompressionError::StoreLocked`] when another process
    /// holds it.
    pub fn lock_store(&self) -> Result<()> {
        let mut held = self.lock.lock();
        if held.is_some() {
            return Ok(());
        }
        let acquired = std::fs::create_dir_all(&self.assets_dir)
            .and_then(|()| StoreLock::try_acquire(&self.assets_dir));
        match acquired {
            Ok(Some(lock)) => {
                info!(lock = %lock.path().display(), "Acquired store lock");
                *held = Some(lock);
                Ok(())
            }
            Ok(None) => Err(CompressionError::StoreLocked(
                self.assets_dir.join(super::lock::LOCK_FILE_NAME),
            )),
            Err(source) => Err(CompressionError::Lock {
                path: self.assets_dir.clone(),
                source,
            }),
        }
    }

    fn release_store(&self) {
        if self.lock.lock().take().is_some() {
            info!("Released store lock");
        }
    }

    pub fn swapper(&self) -> &FileSwapper {
        &self.swapper
    }

    /// Subscribe to job events, if the service was built with a channel.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<JobEvent>> {
        self.events.as_ref().map(|tx| tx.subscribe())
    }

    /// Start the worker pool. Does nothing when disabled or already running.
    ///
    /// Must be called from within a tokio runtime. Returns whether workers
    /// are running afterwards; `false` as well when another process holds
    /// the store lock.
    pub fn start(&self) -> bool {
        if !self.config.enabled {
            info!("Compression disabled; workers not started");
            return false;
        }
        if let Err(e) = self.lock_store() {
            warn!(error = %e, "Workers not started");
            return false;
        }

        let mut running = self.running.lock();
        if running.is_none() {
            let (pool, queue) = WorkerPool::start(
                Arc::clone(&self.processor),
                self.config.worker_count,
                self.config.queue_capacity,
            );
            *running = Some(Running { pool, queue });
        }
        true
    }

    /// Create a pending job for the asset and queue it for a worker.
    ///
    /// Returns `Ok(None)` without touching the catalog when compression is
    /// disabled. A full queue leaves the pending job in place.
    pub fn enqueue(&self, asset_id: AssetId) -> Result<Option<CompressionJobId>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let job = self.catalog.create_job(asset_id).map_err(|e| match e {
            Error::Conflict(_) => CompressionError::AlreadyActive(asset_id),
            other => CompressionError::Persistence(other),
        })?;

        let queue = self.queue()?;
        queue.try_push(asset_id).inspect_err(|e| {
            warn!(asset_id = %asset_id, job_id = %job.id, error = %e, "Job left pending");
        })?;

        info!(asset_id = %asset_id, job_id = %job.id, "Compression job queued");
        Ok(Some(job.id))
    }

    fn queue(&self) -> Result<QueueHandle> {
        self.running
            .lock()
            .as_ref()
            .map(|r| r.queue.clone())
            .ok_or(CompressionError::QueueClosed)
    }

    /// Resolve interrupted swaps and fail jobs orphaned by a restart.
    ///
    /// Call before [`start`](Self::start). Takes the store lock first and
    /// refuses with [`CompressionError::StoreLocked`] while another process
    /// holds it, since that process's jobs are not orphaned.
    pub fn recover(&self) -> Result<RecoveryReport> {
        self.lock_store()?;
        let mut report = RecoveryReport::default();
        recovery::recover_swaps(
            self.catalog.as_ref(),
            &self.swapper,
            &self.assets_dir,
            &mut report,
        );
        recovery::fail_orphaned_jobs(self.catalog.as_ref(), &self.swapper, &mut report)?;
        Ok(report)
    }

    /// Re-queue pending jobs older than the configured grace period.
    ///
    /// Returns the number of assets queued. Requires running workers.
    pub fn reconcile(&self) -> Result<usize> {
        if !self.config.enabled {
            return Ok(0);
        }
        let queue = self.queue()?;
        let mut report = RecoveryReport::default();
        recovery::reconcile_pending(
            self.catalog.as_ref(),
            &queue,
            self.config.reconcile_grace(),
            &mut report,
        )?;
        Ok(report.pending_requeued)
    }

    /// Run [`reconcile`](Self::reconcile) every `period` until the task is
    /// aborted.
    ///
    /// Picks up pending jobs created by processes that could not start
    /// workers because this one holds the store lock.
    pub fn spawn_reconcile_sweep(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick is immediate; startup already reconciled
            interval.tick().await;

            loop {
                interval.tick().await;
                match service.reconcile() {
                    Ok(0) => {}
                    Ok(requeued) => info!(requeued, "Reconcile sweep queued pending jobs"),
                    Err(e) => debug!(error = %e, "Reconcile sweep skipped"),
                }
            }
        })
    }

    /// Stop accepting work and wait until everything queued is processed.
    pub async fn drain(&self) {
        let running = self.running.lock().take();
        if let Some(Running { pool, queue }) = running {
            drop(queue);
            pool.drain().await;
        }
        self.release_store();
    }

    /// Stop immediately, abandoning queued and in-flight items.
    pub async fn shutdown(&self) {
        let running = self.running.lock().take();
        if let Some(Running { pool, .. }) = running {
            pool.abandon().await;
        }
        self.release_store();
    }
}
