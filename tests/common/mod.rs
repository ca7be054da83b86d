//! Shared test harness for integration tests.
//!
//! Provides [`TestEnv`], a temp directory with a file-backed catalog, plus
//! scripted collaborators for the compression pipeline: [`MockTranscoder`],
//! [`FaultyFilesystem`] and [`FaultyCatalog`].

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use assetforge::compression::{
    Catalog, CompressionError, CompressionUpdate, FinishedJob, Filesystem, LocalFilesystem,
    SqliteCatalog, Transcoder,
};
use assetforge::config::CompressionConfig;
use assetforge_common::{AssetId, CompressionJobId, Error, FileKind};
use assetforge_db::models::{Asset, CompressionJob, NewAsset};
use assetforge_db::pool::{get_conn, init_pool, DbPool};
use assetforge_db::queries::assets;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Temp directory holding an assets dir and a file-backed SQLite catalog.
///
/// A file database is used rather than the shared-cache memory database so
/// concurrent workers see ordinary WAL locking.
pub struct TestEnv {
    pub dir: TempDir,
    pub pool: DbPool,
    pub assets_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let assets_dir = dir.path().join("assets");
        std::fs::create_dir_all(&assets_dir).expect("failed to create assets dir");
        let db_path = dir.path().join("assets.db");
        let pool = init_pool(&db_path.to_string_lossy()).expect("failed to open database");
        Self {
            dir,
            pool,
            assets_dir,
        }
    }

    pub fn catalog(&self) -> Arc<SqliteCatalog> {
        Arc::new(SqliteCatalog::new(self.pool.clone()))
    }

    /// Write `len` bytes at the managed path and record the asset.
    pub fn insert_asset(&self, name: &str, len: usize) -> Asset {
        let path = Path::new(name);
        let extension = assetforge_common::paths::dotted_extension(path);
        let id = AssetId::new();
        let storage_path = self.assets_dir.join(format!("{id}{extension}"));
        std::fs::write(&storage_path, original_bytes(len)).expect("failed to write asset");

        let conn = get_conn(&self.pool).expect("failed to get connection");
        assets::create_asset(
            &conn,
            &NewAsset {
                id,
                original_name: name.to_string(),
                file_kind: assetforge_common::paths::file_kind_for(path),
                extension,
                size_bytes: len as i64,
                storage_path: storage_path.to_string_lossy().into_owned(),
            },
        )
        .expect("failed to insert asset")
    }

    pub fn asset(&self, id: AssetId) -> Asset {
        let conn = get_conn(&self.pool).expect("failed to get connection");
        assets::get_asset(&conn, id)
            .expect("failed to load asset")
            .expect("asset missing")
    }

    pub fn jobs(&self, id: AssetId) -> Vec<CompressionJob> {
        let conn = get_conn(&self.pool).expect("failed to get connection");
        assetforge_db::queries::compression_jobs::list_jobs_for_asset(&conn, id)
            .expect("failed to list jobs")
    }
}

/// Recognisable content for original files.
pub fn original_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn enabled_config(worker_count: usize, queue_capacity: usize) -> CompressionConfig {
    CompressionConfig {
        enabled: true,
        worker_count,
        queue_capacity,
        ..CompressionConfig::default()
    }
}

// ---------------------------------------------------------------------------
// MockTranscoder
// ---------------------------------------------------------------------------

/// Writes a fixed number of bytes as the "compressed" output.
pub struct MockTranscoder {
    output_len: usize,
    failure: Option<String>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<PathBuf>>,
}

impl MockTranscoder {
    pub fn producing(output_len: usize) -> Self {
        Self {
            output_len,
            failure: None,
            gate: None,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::producing(0)
        }
    }

    /// Block every call until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Input paths in the order the transcoder was called.
    pub fn inputs(&self) -> Vec<PathBuf> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _kind: FileKind,
    ) -> Result<(), CompressionError> {
        self.inputs.lock().push(input.to_path_buf());
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(message) = &self.failure {
            return Err(CompressionError::Transcode(message.clone()));
        }
        std::fs::write(output, vec![0u8; self.output_len])
            .map_err(|e| CompressionError::Transcode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// FaultyFilesystem
// ---------------------------------------------------------------------------

/// [`LocalFilesystem`] that refuses chosen renames.
#[derive(Default)]
pub struct FaultyFilesystem {
    inner: LocalFilesystem,
    refuse_rename_to: Mutex<Vec<PathBuf>>,
    refuse_rename_from: Mutex<Vec<PathBuf>>,
}

impl FaultyFilesystem {
    pub fn refuse_rename_to(&self, path: impl Into<PathBuf>) {
        self.refuse_rename_to.lock().push(path.into());
    }

    pub fn refuse_rename_from(&self, path: impl Into<PathBuf>) {
        self.refuse_rename_from.lock().push(path.into());
    }
}

impl Filesystem for FaultyFilesystem {
    fn size(&self, path: &Path) -> io::Result<u64> {
        self.inner.size(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let refused = self.refuse_rename_to.lock().iter().any(|p| p == to)
            || self.refuse_rename_from.lock().iter().any(|p| p == from);
        if refused {
            return Err(io::Error::new(io::ErrorKind::Other, "injected rename failure"));
        }
        self.inner.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_file(path)
    }

    fn sync_file(&self, path: &Path) -> io::Result<()> {
        self.inner.sync_file(path)
    }

    fn write_durable(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.inner.write_durable(path, contents)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read(path)
    }
}

// ---------------------------------------------------------------------------
// FaultyCatalog
// ---------------------------------------------------------------------------

/// [`SqliteCatalog`] with switchable write failures.
pub struct FaultyCatalog {
    inner: SqliteCatalog,
    pub fail_start: AtomicBool,
    pub fail_update: AtomicBool,
    /// Let another worker win the `pending -> processing` race.
    pub claimed_elsewhere: AtomicBool,
}

impl FaultyCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self {
            inner: SqliteCatalog::new(pool),
            fail_start: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            claimed_elsewhere: AtomicBool::new(false),
        }
    }

    fn injected() -> Error {
        Error::database("injected write failure")
    }
}

impl Catalog for FaultyCatalog {
    fn create_job(&self, asset_id: AssetId) -> assetforge_common::Result<CompressionJob> {
        self.inner.create_job(asset_id)
    }

    fn find_most_recent_pending_job(
        &self,
        asset_id: AssetId,
    ) -> assetforge_common::Result<Option<CompressionJob>> {
        self.inner.find_most_recent_pending_job(asset_id)
    }

    fn start_job(&self, job_id: CompressionJobId) -> assetforge_common::Result<bool> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        if self.claimed_elsewhere.load(Ordering::SeqCst) {
            self.inner.start_job(job_id)?;
        }
        self.inner.start_job(job_id)
    }

    fn insert_recovered_job(&self, asset_id: AssetId) -> assetforge_common::Result<CompressionJob> {
        self.inner.insert_recovered_job(asset_id)
    }

    fn finish_job(&self, job: &FinishedJob) -> assetforge_common::Result<bool> {
        self.inner.finish_job(job)
    }

    fn get_job(&self, job_id: CompressionJobId) -> assetforge_common::Result<Option<CompressionJob>> {
        self.inner.get_job(job_id)
    }

    fn get_asset(&self, asset_id: AssetId) -> assetforge_common::Result<Option<Asset>> {
        self.inner.get_asset(asset_id)
    }

    fn update_asset_after_compression(
        &self,
        asset_id: AssetId,
        update: &CompressionUpdate,
    ) -> assetforge_common::Result<bool> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.update_asset_after_compression(asset_id, update)
    }

    fn processing_jobs(&self) -> assetforge_common::Result<Vec<CompressionJob>> {
        self.inner.processing_jobs()
    }

    fn stale_pending_jobs(
        &self,
        cutoff: DateTime<Utc>,
    ) -> assetforge_common::Result<Vec<CompressionJob>> {
        self.inner.stale_pending_jobs(cutoff)
    }
}

/// Poll `condition` until it holds, failing the test after about two seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
