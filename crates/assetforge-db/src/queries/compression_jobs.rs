//! Compression job operations.
//!
//! Status updates are guarded in SQL so that only the forward transitions
//! `pending -> processing -> completed|failed` can ever be written. Each transition returns the updated row, or `None` when
//! the job was not in a state the transition accepts.

use assetforge_common::{AssetId, CompressionJobId, Error, JobStatus, Result};
use rusqlite::Connection;

use super::{db_err, now, violated_constraint, Constraint};
use crate::models::CompressionJob;

const COLS: &str = "id, asset_id, status, progress, error, created_at, started_at, completed_at";

fn insert_job(
    conn: &Connection,
    asset_id: AssetId,
    status: JobStatus,
) -> Result<CompressionJob> {
    let id = CompressionJobId::new();
    let now = now();
    let started_at = (status == JobStatus::Processing).then(|| now.clone());

    conn.execute(
        "INSERT INTO compression_jobs (id, asset_id, status, progress, created_at, started_at)
         VALUES (?1, ?2, ?3, 0, ?4, ?5)",
        rusqlite::params![id.to_string(), asset_id.to_string(), status.to_string(), &now, started_at],
    )
    .map_err(|e| match violated_constraint(&e) {
        Some(Constraint::Unique) => Error::conflict(format!(
            "asset {asset_id} already has an active compression job"
        )),
        Some(Constraint::ForeignKey) => Error::not_found("asset", asset_id),
        None => db_err(e),
    })?;

    Ok(CompressionJob {
        id,
        asset_id,
        status,
        progress: 0,
        error: None,
        created_at: now,
        started_at,
        completed_at: None,
    })
}

/// Create a pending job for an asset.
///
/// Fails with [`Error::Conflict`] when the asset already has a pending or
/// processing job, and with [`Error::NotFound`] when the asset does not exist.
pub fn create_job(conn: &Connection, asset_id: AssetId) -> Result<CompressionJob> {
    insert_job(conn, asset_id, JobStatus::Pending)
}

/// Create a job directly in the processing state.
///
/// Used when a worker receives an asset whose pending job cannot be found.
pub fn insert_processing_job(conn: &Connection, asset_id: AssetId) -> Result<CompressionJob> {
    insert_job(conn, asset_id, JobStatus::Processing)
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: CompressionJobId) -> Result<Option<CompressionJob>> {
    let q = format!("SELECT {COLS} FROM compression_jobs WHERE id = ?1");
    optional_row(conn.query_row(&q, [id.to_string()], CompressionJob::from_row))
}

/// Find the pending job a worker should claim for an asset.
///
/// Orders by start time with unset treated as earliest, then by creation.
pub fn find_most_recent_pending_job(
    conn: &Connection,
    asset_id: AssetId,
) -> Result<Option<CompressionJob>> {
    let q = format!(
        "SELECT {COLS} FROM compression_jobs
         WHERE asset_id = ?1 AND status = 'pending'
         ORDER BY COALESCE(started_at, '') DESC, created_at DESC, rowid DESC
         LIMIT 1"
    );
    optional_row(conn.query_row(&q, [asset_id.to_string()], CompressionJob::from_row))
}

/// Move a pending job to processing and stamp its start time.
pub fn start_job(conn: &Connection, id: CompressionJobId) -> Result<Option<CompressionJob>> {
    let q = format!(
        "UPDATE compression_jobs SET status = 'processing', started_at = ?1
         WHERE id = ?2 AND status = 'pending'
         RETURNING {COLS}"
    );
    optional_row(conn.query_row(&q, rusqlite::params![now(), id.to_string()], CompressionJob::from_row))
}

/// Mark a processing job completed with progress 100.
pub fn complete_job(conn: &Connection, id: CompressionJobId) -> Result<Option<CompressionJob>> {
    let q = format!(
        "UPDATE compression_jobs SET status = 'completed', progress = 100, error = NULL,
            completed_at = ?1
         WHERE id = ?2 AND status = 'processing'
         RETURNING {COLS}"
    );
    optional_row(conn.query_row(&q, rusqlite::params![now(), id.to_string()], CompressionJob::from_row))
}

/// Mark a processing job failed with an error message.
pub fn fail_job(
    conn: &Connection,
    id: CompressionJobId,
    error: &str,
) -> Result<Option<CompressionJob>> {
    let q = format!(
        "UPDATE compression_jobs SET status = 'failed', error = ?1, completed_at = ?2
         WHERE id = ?3 AND status = 'processing'
         RETURNING {COLS}"
    );
    optional_row(conn.query_row(
        &q,
        rusqlite::params![error, now(), id.to_string()],
        CompressionJob::from_row,
    ))
}

/// Job history for an asset, newest first.
pub fn list_jobs_for_asset(conn: &Connection, asset_id: AssetId) -> Result<Vec<CompressionJob>> {
    let q = format!(
        "SELECT {COLS} FROM compression_jobs WHERE asset_id = ?1
         ORDER BY created_at DESC, rowid DESC"
    );
    collect_rows(conn, &q, rusqlite::params![asset_id.to_string()])
}

/// All jobs currently in `status`, oldest first.
pub fn list_jobs_with_status(conn: &Connection, status: JobStatus) -> Result<Vec<CompressionJob>> {
    let q = format!(
        "SELECT {COLS} FROM compression_jobs WHERE status = ?1
         ORDER BY created_at ASC, rowid ASC"
    );
    collect_rows(conn, &q, rusqlite::params![status.to_string()])
}

/// Pending jobs created at or before `cutoff` (a stored-format
/// timestamp), oldest first.
pub fn list_pending_jobs_created_before(
    conn: &Connection,
    cutoff: &str,
) -> Result<Vec<CompressionJob>> {
    let q = format!(
        "SELECT {COLS} FROM compression_jobs
         WHERE status = 'pending' AND created_at <= ?1
         ORDER BY created_at ASC, rowid ASC"
    );
    collect_rows(conn, &q, rusqlite::params![cutoff])
}

fn optional_row(result: rusqlite::Result<CompressionJob>) -> Result<Option<CompressionJob>> {
    match result {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

fn collect_rows(
    conn: &Connection,
    q: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<CompressionJob>> {
    let mut stmt = conn.prepare(q).map_err(db_err)?;
    let rows = stmt
        .query_map(params, CompressionJob::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::{format_timestamp, test_support::insert_asset};

    #[test]
    fn create_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = insert_asset(&conn);

        let job = create_job(&conn, asset.id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.started_at.is_none());

        let fetched = get_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(fetched, job);
    }

    #[test]
    fn second_active_job_conflicts() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = insert_asset(&conn);

        create_job(&conn, asset.id).unwrap();
        let err = create_job(&conn, asset.id).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = insert_processing_job(&conn, asset.id).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn new_job_allowed_after_terminal() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = insert_asset(&conn);

        let first = create_job(&conn, asset.id).unwrap();
        start_job(&conn, first.id).unwrap().unwrap();
        fail_job(&conn, first.id, "encoder exploded").unwrap().unwrap();

        let second = create_job(&conn, asset.id).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(list_jobs_for_asset(&conn, asset.id).unwrap().len(), 2);
    }

    #[test]
    fn job_for_missing_asset_is_not_found() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let err = create_job(&conn, AssetId::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn forward_transitions() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = insert_asset(&conn);
        let job = create_job(&conn, asset.id).unwrap();

        // A pending job can only be started
        assert!(complete_job(&conn, job.id).unwrap().is_none());
        assert!(fail_job(&conn, job.id, "too early").unwrap().is_none());
        assert_eq!(get_job(&conn, job.id).unwrap().unwrap().status, JobStatus::Pending);

        let started = start_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(started.status, JobStatus::Processing);
        assert!(started.started_at.is_some());

        // Already started
        assert!(start_job(&conn, job.id).unwrap().is_none());

        let done = complete_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.completed_at.is_some());

        // Terminal jobs never move again
        assert!(start_job(&conn, job.id).unwrap().is_none());
        assert!(fail_job(&conn, job.id, "late").unwrap().is_none());
        assert!(complete_job(&conn, job.id).unwrap().is_none());
        assert_eq!(get_job(&conn, job.id).unwrap().unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn fail_records_error() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = insert_asset(&conn);
        let job = create_job(&conn, asset.id).unwrap();
        start_job(&conn, job.id).unwrap().unwrap();

        let failed = fail_job(&conn, job.id, "unsupported media type").unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("unsupported media type"));
        assert_eq!(failed.progress, 0);
    }

    #[test]
    fn processing_job_fabricated_with_start_time() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = insert_asset(&conn);

        let job = insert_processing_job(&conn, asset.id).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());
        assert_eq!(get_job(&conn, job.id).unwrap().unwrap(), job);
    }

    #[test]
    fn find_pending_ignores_other_states() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = insert_asset(&conn);

        assert!(find_most_recent_pending_job(&conn, asset.id).unwrap().is_none());

        let old = create_job(&conn, asset.id).unwrap();
        start_job(&conn, old.id).unwrap().unwrap();
        fail_job(&conn, old.id, "boom").unwrap().unwrap();
        assert!(find_most_recent_pending_job(&conn, asset.id).unwrap().is_none());

        let pending = create_job(&conn, asset.id).unwrap();
        let found = find_most_recent_pending_job(&conn, asset.id).unwrap().unwrap();
        assert_eq!(found.id, pending.id);
    }

    #[test]
    fn status_and_cutoff_listing() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let a = insert_asset(&conn);
        let b = insert_asset(&conn);

        let ja = create_job(&conn, a.id).unwrap();
        let jb = create_job(&conn, b.id).unwrap();
        start_job(&conn, jb.id).unwrap().unwrap();

        let pending = list_jobs_with_status(&conn, JobStatus::Pending).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, ja.id);

        let processing = list_jobs_with_status(&conn, JobStatus::Processing).unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, jb.id);

        let future = format_timestamp(chrono::Utc::now() + chrono::Duration::seconds(60));
        let stale = list_pending_jobs_created_before(&conn, &future).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, ja.id);

        let past = format_timestamp(chrono::Utc::now() - chrono::Duration::seconds(60));
        assert!(list_pending_jobs_created_before(&conn, &past).unwrap().is_empty());
    }

    #[test]
    fn jobs_cascade_with_asset() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = insert_asset(&conn);
        let job = create_job(&conn, asset.id).unwrap();

        crate::queries::assets::delete_asset(&conn, asset.id).unwrap();
        assert!(get_job(&conn, job.id).unwrap().is_none());
    }
}
