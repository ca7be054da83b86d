//! Catalog operations consumed by the compression pipeline.
//!
//! [`Catalog`] is the seam between the pipeline and the record store.
//! [`SqliteCatalog`] implements it over the r2d2 pool; tests wrap it to
//! inject write failures.

use assetforge_common::{AssetId, CompressionJobId, JobStatus, Result};
use assetforge_db::models::{Asset, CompressionJob};
use assetforge_db::pool::{get_conn, DbPool};
use assetforge_db::queries::{assets, compression_jobs, format_timestamp};
use chrono::{DateTime, Utc};

use super::job::{FinishedJob, JobResult, ProcessingJob};

/// Asset fields written once a swap has been committed on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionUpdate {
    pub backup_path: String,
    pub compression_ratio: f64,
    pub size_bytes: i64,
}

/// Record store used by the enqueuer, the job processor and recovery.
///
/// Transition methods return `false` when the stored job was not in a
/// state that accepts the transition.
pub trait Catalog: Send + Sync {
    /// Create a pending job. `Error::Conflict` if the asset already has an
    /// active job.
    fn create_job(&self, asset_id: AssetId) -> Result<CompressionJob>;

    fn find_most_recent_pending_job(&self, asset_id: AssetId) -> Result<Option<CompressionJob>>;

    /// Record `pending -> processing` with a start time.
    fn start_job(&self, job_id: CompressionJobId) -> Result<bool>;

    /// Create a job directly in the processing state.
    fn insert_recovered_job(&self, asset_id: AssetId) -> Result<CompressionJob>;

    /// Record a terminal state.
    fn finish_job(&self, job: &FinishedJob) -> Result<bool>;

    fn get_job(&self, job_id: CompressionJobId) -> Result<Option<CompressionJob>>;

    fn get_asset(&self, asset_id: AssetId) -> Result<Option<Asset>>;

    /// Mark the asset compressed. `false` if it was missing or already
    /// compressed.
    fn update_asset_after_compression(
        &self,
        asset_id: AssetId,
        update: &CompressionUpdate,
    ) -> Result<bool>;

    /// Jobs left in `processing`, oldest first.
    fn processing_jobs(&self) -> Result<Vec<CompressionJob>>;

    /// Pending jobs created before `cutoff`, oldest first.
    fn stale_pending_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<CompressionJob>>;
}

/// [`Catalog`] backed by the SQLite pool.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: DbPool,
}

impl SqliteCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl Catalog for SqliteCatalog {
    fn create_job(&self, asset_id: AssetId) -> Result<CompressionJob> {
        let conn = get_conn(&self.pool)?;
        compression_jobs::create_job(&conn, asset_id)
    }

    fn find_most_recent_pending_job(&self, asset_id: AssetId) -> Result<Option<CompressionJob>> {
        let conn = get_conn(&self.pool)?;
        compression_jobs::find_most_recent_pending_job(&conn, asset_id)
    }

    fn start_job(&self, job_id: CompressionJobId) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        Ok(compression_jobs::start_job(&conn, job_id)?.is_some())
    }

    fn insert_recovered_job(&self, asset_id: AssetId) -> Result<CompressionJob> {
        let conn = get_conn(&self.pool)?;
        compression_jobs::insert_processing_job(&conn, asset_id)
    }

    fn finish_job(&self, job: &FinishedJob) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        let updated = match job.result() {
            JobResult::Completed => compression_jobs::complete_job(&conn, job.id())?,
            JobResult::Failed(error) => compression_jobs::fail_job(&conn, job.id(), error)?,
        };
        Ok(updated.is_some())
    }

    fn get_job(&self, job_id: CompressionJobId) -> Result<Option<CompressionJob>> {
        let conn = get_conn(&self.pool)?;
        compression_jobs::get_job(&conn, job_id)
    }

    fn get_asset(&self, asset_id: AssetId) -> Result<Option<Asset>> {
        let conn = get_conn(&self.pool)?;
        assets::get_asset(&conn, asset_id)
    }

    fn update_asset_after_compression(
        &self,
        asset_id: AssetId,
        update: &CompressionUpdate,
    ) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        assets::mark_compressed(
            &conn,
            asset_id,
            &update.backup_path,
            update.compression_ratio,
            update.size_bytes,
        )
    }

    fn processing_jobs(&self) -> Result<Vec<CompressionJob>> {
        let conn = get_conn(&self.pool)?;
        compression_jobs::list_jobs_with_status(&conn, JobStatus::Processing)
    }

    fn stale_pending_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<CompressionJob>> {
        let conn = get_conn(&self.pool)?;
        compression_jobs::list_pending_jobs_created_before(&conn, &format_timestamp(cutoff))
    }
}

/// Fail a job that a restart or an interrupted swap left in `processing`.
pub(crate) fn fail_interrupted(
    catalog: &dyn Catalog,
    record: &CompressionJob,
    reason: &str,
) -> Result<bool> {
    match ProcessingJob::from_record(record) {
        Some(job) => catalog.finish_job(&job.fail(reason)),
        None => Ok(false),
    }
}
