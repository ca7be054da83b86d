//! Exclusive ownership of an assets directory.
//!
//! Startup recovery fails every `processing` job and resolves every swap
//! marker it finds, which is only correct when no other process is running
//! workers on the same store. The process that runs recovery or workers holds
//! an advisory lock on `<assets_dir>/.lock` until it stops.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// Name of the lock file inside the assets directory.
pub const LOCK_FILE_NAME: &str = ".lock";

/// An exclusive lock on one assets directory, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Take the lock without waiting.
    ///
    /// Returns `Ok(None)` when another process (or another open handle in
    /// this one) already holds it.
    pub fn try_acquire(assets_dir: &Path) -> io::Result<Option<Self>> {
        let path = assets_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    e.raw_os_error()
        .is_some_and(|code| Some(code) == fs2::lock_contended_error().raw_os_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_handle_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let first = StoreLock::try_acquire(dir.path()).unwrap().unwrap();
        assert_eq!(first.path(), dir.path().join(LOCK_FILE_NAME));

        assert!(StoreLock::try_acquire(dir.path()).unwrap().is_none());
    }

    #[test]
    fn released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        drop(StoreLock::try_acquire(dir.path()).unwrap().unwrap());
        assert!(StoreLock::try_acquire(dir.path()).unwrap().is_some());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StoreLock::try_acquire(&dir.path().join("missing")).is_err());
    }
}
