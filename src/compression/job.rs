//! Typed job lifecycle.
//!
//! A job moves `PendingJob -> ProcessingJob -> FinishedJob`, each step
//! consuming the previous value. A finished job has no transition methods,
//! so a terminal job can never be started or finished again. The catalog
//! persists each state; see [`super::catalog::Catalog`].

use assetforge_common::{AssetId, CompressionJobId, JobStatus};
use assetforge_db::models::CompressionJob;

/// A job waiting for a worker.
#[derive(Debug)]
pub struct PendingJob {
    id: CompressionJobId,
    asset_id: AssetId,
}

impl PendingJob {
    /// Wrap a stored job, which must be `pending`.
    pub fn from_record(record: &CompressionJob) -> Option<Self> {
        (record.status == JobStatus::Pending).then(|| Self {
            id: record.id,
            asset_id: record.asset_id,
        })
    }

    pub fn id(&self) -> CompressionJobId {
        self.id
    }

    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    /// Claim the job for a worker.
    pub fn start(self) -> ProcessingJob {
        ProcessingJob {
            id: self.id,
            asset_id: self.asset_id,
            recovered: false,
        }
    }
}

/// A job claimed by a worker.
#[derive(Debug)]
pub struct ProcessingJob {
    id: CompressionJobId,
    asset_id: AssetId,
    recovered: bool,
}

impl ProcessingJob {
    /// Wrap a stored job, which must be `processing`.
    ///
    /// Used for jobs created directly in the processing state when no
    /// pending record could be found, and for jobs left behind by a restart.
    pub fn from_record(record: &CompressionJob) -> Option<Self> {
        (record.status == JobStatus::Processing).then(|| Self {
            id: record.id,
            asset_id: record.asset_id,
            recovered: true,
        })
    }

    pub fn id(&self) -> CompressionJobId {
        self.id
    }

    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    /// Whether this job skipped the pending state.
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    pub fn complete(self) -> FinishedJob {
        FinishedJob {
            id: self.id,
            asset_id: self.asset_id,
            result: JobResult::Completed,
        }
    }

    pub fn fail(self, error: impl Into<String>) -> FinishedJob {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "compression failed".to_string();
        }
        FinishedJob {
            id: self.id,
            asset_id: self.asset_id,
            result: JobResult::Failed(error),
        }
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Completed,
    /// Carries a non-empty error message.
    Failed(String),
}

/// A job in a terminal state.
#[derive(Debug)]
pub struct FinishedJob {
    id: CompressionJobId,
    asset_id: AssetId,
    result: JobResult,
}

impl FinishedJob {
    pub fn id(&self) -> CompressionJobId {
        self.id
    }

    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    pub fn result(&self) -> &JobResult {
        &self.result
    }

    pub fn status(&self) -> JobStatus {
        match self.result {
            JobResult::Completed => JobStatus::Completed,
            JobResult::Failed(_) => JobStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.result {
            JobResult::Completed => None,
            JobResult::Failed(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: JobStatus) -> CompressionJob {
        CompressionJob {
            id: CompressionJobId::new(),
            asset_id: AssetId::new(),
            status,
            progress: 0,
            error: None,
            created_at: "2024-01-01T00:00:00.000000Z".to_string(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn pending_requires_pending_record() {
        assert!(PendingJob::from_record(&record(JobStatus::Pending)).is_some());
        assert!(PendingJob::from_record(&record(JobStatus::Processing)).is_none());
        assert!(PendingJob::from_record(&record(JobStatus::Completed)).is_none());
        assert!(PendingJob::from_record(&record(JobStatus::Failed)).is_none());
    }

    #[test]
    fn processing_requires_processing_record() {
        assert!(ProcessingJob::from_record(&record(JobStatus::Processing)).is_some());
        assert!(ProcessingJob::from_record(&record(JobStatus::Pending)).is_none());
        assert!(ProcessingJob::from_record(&record(JobStatus::Failed)).is_none());
    }

    #[test]
    fn start_then_complete() {
        let rec = record(JobStatus::Pending);
        let job = PendingJob::from_record(&rec).unwrap().start();
        assert!(!job.is_recovered());
        assert_eq!(job.id(), rec.id);

        let done = job.complete();
        assert_eq!(done.status(), JobStatus::Completed);
        assert_eq!(done.result(), &JobResult::Completed);
        assert!(done.error().is_none());
        assert_eq!(done.asset_id(), rec.asset_id);
    }

    #[test]
    fn recovered_job_can_fail() {
        let rec = record(JobStatus::Processing);
        let job = ProcessingJob::from_record(&rec).unwrap();
        assert!(job.is_recovered());

        let failed = job.fail("unsupported media type");
        assert_eq!(failed.status(), JobStatus::Failed);
        assert_eq!(failed.error(), Some("unsupported media type"));
    }

    #[test]
    fn failure_message_is_never_empty() {
        let job = PendingJob::from_record(&record(JobStatus::Pending)).unwrap().start();
        let failed = job.fail("  ");
        assert_eq!(failed.error(), Some("compression failed"));
    }
}
