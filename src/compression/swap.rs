//! On-disk replacement of an asset's active file with its compressed output.
//!
//! The commit sequence is:
//!
//! 1. measure the original and compressed sizes
//! 2. fsync the compressed temp file
//! 3. write a swap marker next to the active file (fsynced)
//! 4. rename original -> backup
//! 5. rename temp -> active
//!
//! If step 5 fails the original is moved back immediately. The marker stays
//! on disk until the caller has recorded the swap in the catalog and calls
//! [`FileSwapper::finish`]. A marker found at startup means the process died
//! somewhere inside that window; [`FileSwapper::restore_original`] and
//! [`FileSwapper::finish`] resolve it in either direction.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assetforge_common::{AssetId, CompressionJobId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix added to the file stem of the compressed temp output.
pub const TEMP_SUFFIX: &str = "_compressed";
/// Suffix added to the file stem of the retained original.
pub const BACKUP_SUFFIX: &str = "_original";
/// Extension appended to the active file name for the swap marker.
pub const MARKER_EXTENSION: &str = "swap";

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("failed to measure {path}: {source}")]
    Measure { path: PathBuf, source: io::Error },

    #[error("original file {0} is empty")]
    EmptyOriginal(PathBuf),

    #[error("backup {0} already exists")]
    BackupExists(PathBuf),

    #[error("failed to write swap marker {path}: {source}")]
    Marker { path: PathBuf, source: io::Error },

    #[error("failed to move original to backup: {0}")]
    Backup(#[source] io::Error),

    #[error("failed to activate compressed file, original restored: {0}")]
    Activate(#[source] io::Error),

    #[error("failed to activate compressed file ({activate}) and to restore original ({restore})")]
    RestoreFailed { activate: io::Error, restore: io::Error },

    #[error("neither active file nor backup exists for {0}")]
    Unrecoverable(PathBuf),

    #[error("filesystem error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Filesystem operations the swapper needs. Every failure is observable.
pub trait Filesystem: Send + Sync {
    fn size(&self, path: &Path) -> io::Result<u64>;
    fn exists(&self, path: &Path) -> bool;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    /// Flush file contents to stable storage.
    fn sync_file(&self, path: &Path) -> io::Result<()>;
    /// Write a small file and flush it to stable storage.
    fn write_durable(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// [`Filesystem`] over `std::fs`. Renames and marker writes also flush the
/// parent directory on unix so the new directory entry survives a crash.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    #[cfg(unix)]
    fn sync_parent(path: &Path) -> io::Result<()> {
        match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => std::fs::File::open(parent)?.sync_all(),
            None => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn sync_parent(_path: &Path) -> io::Result<()> {
        Ok(())
    }
}

impl Filesystem for LocalFilesystem {
    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)?;
        Self::sync_parent(to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn sync_file(&self, path: &Path) -> io::Result<()> {
        std::fs::OpenOptions::new().write(true).open(path)?.sync_all()
    }

    fn write_durable(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        Self::sync_parent(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// The on-disk names involved in swapping one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPaths {
    pub active: PathBuf,
    pub temp: PathBuf,
    pub backup: PathBuf,
    pub marker: PathBuf,
}

impl SwapPaths {
    /// Derive temp, backup and marker names from the active path:
    /// `<stem>_compressed<ext>`, `<stem>_original<ext>` and `<name>.swap`.
    pub fn for_active(active: impl Into<PathBuf>) -> Self {
        let active = active.into();
        let stem = active
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = active
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let name = active
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            temp: active.with_file_name(format!("{stem}{TEMP_SUFFIX}{ext}")),
            backup: active.with_file_name(format!("{stem}{BACKUP_SUFFIX}{ext}")),
            marker: active.with_file_name(format!("{name}.{MARKER_EXTENSION}")),
            active,
        }
    }
}

/// Durable record of a swap in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapMarker {
    pub asset_id: AssetId,
    pub job_id: CompressionJobId,
    pub paths: SwapPaths,
    pub created_at: String,
}

/// Sizes measured just before a committed swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    pub original_size: u64,
    pub compressed_size: u64,
}

impl SwapOutcome {
    /// Compressed size divided by original size.
    pub fn compression_ratio(&self) -> f64 {
        self.compressed_size as f64 / self.original_size as f64
    }
}

/// What is on disk around an asset's active path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapInspection {
    pub active_exists: bool,
    pub backup_exists: bool,
    pub temp_exists: bool,
    pub marker_exists: bool,
}

impl SwapInspection {
    /// The original was moved to the backup but nothing took its place.
    pub fn is_interrupted(&self) -> bool {
        !self.active_exists && self.backup_exists
    }
}

/// Performs and undoes swaps through a [`Filesystem`].
#[derive(Clone)]
pub struct FileSwapper {
    fs: Arc<dyn Filesystem>,
}

impl FileSwapper {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self { fs }
    }

    /// Sizes of the active (original) file and the compressed temp file.
    pub fn measure(&self, paths: &SwapPaths) -> Result<SwapOutcome, SwapError> {
        let measure = |path: &Path| {
            self.fs.size(path).map_err(|source| SwapError::Measure {
                path: path.to_path_buf(),
                source,
            })
        };
        Ok(SwapOutcome {
            original_size: measure(&paths.active)?,
            compressed_size: measure(&paths.temp)?,
        })
    }

    /// Replace the active file with the compressed temp file, keeping the
    /// original as the backup. Leaves the swap marker in place on success.
    pub fn commit(
        &self,
        asset_id: AssetId,
        job_id: CompressionJobId,
        paths: &SwapPaths,
    ) -> Result<SwapOutcome, SwapError> {
        let outcome = self.measure(paths)?;
        if outcome.original_size == 0 {
            return Err(SwapError::EmptyOriginal(paths.active.clone()));
        }

        self.fs.sync_file(&paths.temp).map_err(|source| SwapError::Io {
            path: paths.temp.clone(),
            source,
        })?;

        if self.fs.exists(&paths.backup) {
            return Err(SwapError::BackupExists(paths.backup.clone()));
        }

        let marker = SwapMarker {
            asset_id,
            job_id,
            paths: paths.clone(),
            created_at: Utc::now().to_rfc3339(),
        };
        self.write_marker(&marker)?;

        if let Err(e) = self.fs.rename(&paths.active, &paths.backup) {
            self.clear_marker_quietly(paths);
            return Err(SwapError::Backup(e));
        }

        if let Err(activate) = self.fs.rename(&paths.temp, &paths.active) {
            return match self.fs.rename(&paths.backup, &paths.active) {
                Ok(()) => {
                    self.clear_marker_quietly(paths);
                    Err(SwapError::Activate(activate))
                }
                Err(restore) => {
                    tracing::error!(
                        active = %paths.active.display(),
                        backup = %paths.backup.display(),
                        "Swap interrupted, active file missing; marker kept for recovery"
                    );
                    Err(SwapError::RestoreFailed { activate, restore })
                }
            };
        }

        Ok(outcome)
    }

    /// Close out a committed swap: drop the marker and any stray temp file.
    pub fn finish(&self, paths: &SwapPaths) -> Result<(), SwapError> {
        self.discard_temp(paths)?;
        self.remove_if_exists(&paths.marker)
    }

    /// Put the original back at the active path and discard compressed
    /// output, whichever step of a swap was reached. Removes the marker.
    pub fn restore_original(&self, paths: &SwapPaths) -> Result<(), SwapError> {
        let active_exists = self.fs.exists(&paths.active);

        if self.fs.exists(&paths.backup) {
            // A backup only exists once the original has been moved, so
            // whatever sits at the active path is compressed output.
            if active_exists {
                self.remove_if_exists(&paths.active)?;
            }
            self.fs
                .rename(&paths.backup, &paths.active)
                .map_err(|source| SwapError::Io {
                    path: paths.backup.clone(),
                    source,
                })?;
        } else if !active_exists {
            return Err(SwapError::Unrecoverable(paths.active.clone()));
        }

        self.discard_temp(paths)?;
        self.remove_if_exists(&paths.marker)
    }

    /// Remove the compressed temp output if present.
    pub fn discard_temp(&self, paths: &SwapPaths) -> Result<(), SwapError> {
        self.remove_if_exists(&paths.temp)
    }

    pub fn inspect(&self, active: &Path) -> SwapInspection {
        let paths = SwapPaths::for_active(active);
        SwapInspection {
            active_exists: self.fs.exists(&paths.active),
            backup_exists: self.fs.exists(&paths.backup),
            temp_exists: self.fs.exists(&paths.temp),
            marker_exists: self.fs.exists(&paths.marker),
        }
    }

    pub fn read_marker(&self, marker_path: &Path) -> Result<SwapMarker, SwapError> {
        let bytes = self.fs.read(marker_path).map_err(|source| SwapError::Io {
            path: marker_path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| SwapError::Marker {
            path: marker_path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })
    }

    /// Current size of a file, used when completing a swap from its marker.
    pub fn size(&self, path: &Path) -> Result<u64, SwapError> {
        self.fs.size(path).map_err(|source| SwapError::Measure {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_marker(&self, marker: &SwapMarker) -> Result<(), SwapError> {
        let path = &marker.paths.marker;
        let json = serde_json::to_vec_pretty(marker).map_err(|e| SwapError::Marker {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        self.fs
            .write_durable(path, &json)
            .map_err(|source| SwapError::Marker {
                path: path.clone(),
                source,
            })
    }

    fn clear_marker_quietly(&self, paths: &SwapPaths) {
        if let Err(e) = self.remove_if_exists(&paths.marker) {
            tracing::warn!(marker = %paths.marker.display(), error = %e, "Failed to remove swap marker");
        }
    }

    fn remove_if_exists(&self, path: &Path) -> Result<(), SwapError> {
        match self.fs.remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SwapError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
