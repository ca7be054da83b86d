//! Fixed-size worker pool fed by one bounded queue.
//!
//! The queue carries asset ids only. Producers push through a cloneable
//! [`QueueHandle`] and never wait. Workers share the receiving end and run
//! each item to completion before taking the next one. An asset id sits in
//! the queue at most once; it may be pushed again once a worker has taken it.

use std::collections::HashSet;
use std::sync::Arc;

use assetforge_common::AssetId;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{CompressionError, Result};
use super::processor::JobProcessor;

type Queued = Arc<parking_lot::Mutex<HashSet<AssetId>>>;

/// Producer side of the worker queue.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    sender: mpsc::Sender<AssetId>,
    queued: Queued,
}

impl QueueHandle {
    /// Push an asset id without waiting.
    ///
    /// Returns `Ok(false)` when the id is already waiting in the queue.
    pub fn try_push(&self, asset_id: AssetId) -> Result<bool> {
        let mut queued = self.queued.lock();
        if queued.contains(&asset_id) {
            return Ok(false);
        }
        self.sender.try_send(asset_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CompressionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => CompressionError::QueueClosed,
        })?;
        queued.insert(asset_id);
        Ok(true)
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn `worker_count` workers on the current runtime.
    ///
    /// Returns the pool and the handle used to feed it. Counts below one are
    /// raised to one.
    pub fn start(
        processor: Arc<JobProcessor>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> (Self, QueueHandle) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let queued = Queued::default();
        let cancel = CancellationToken::new();

        let handles = (0..worker_count.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&queued),
                    Arc::clone(&processor),
                    cancel.clone(),
                ))
            })
            .collect();

        info!(worker_count, queue_capacity, "Compression workers started");

        (Self { handles, cancel }, QueueHandle { sender, queued })
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Process everything still queued, then stop.
    ///
    /// Waits until every [`QueueHandle`] has been dropped and the queue is
    /// empty.
    pub async fn drain(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Compression workers drained");
    }

    /// Stop immediately, abandoning queued items and in-flight jobs.
    ///
    /// Abandoned jobs stay in `processing` until startup recovery fails
    /// them. Encoder processes are killed with their tasks.
    pub async fn abandon(self) {
        self.cancel.cancel();
        for handle in &self.handles {
            handle.abort();
        }
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Compression workers stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<AssetId>>>,
    queued: Queued,
    processor: Arc<JobProcessor>,
    cancel: CancellationToken,
) {
    debug!(worker_id, "Compression worker started");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            item = async { receiver.lock().await.recv().await } => item,
        };

        // Channel closed and empty
        let Some(asset_id) = next else { break };
        queued.lock().remove(&asset_id);

        processor.process(asset_id).await;
    }

    debug!(worker_id, "Compression worker stopped");
}
