//! Managed on-disk store for uploaded files.
//!
//! Every asset lives at `{root}/{asset_id}{ext}`. Files are written to a temp
//! file in the same directory first and renamed into place, so a reader
//! never sees a partial copy.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use assetforge_common::{AssetId, Result};
use tempfile::NamedTempFile;

/// A file copied into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

pub struct AssetStorage {
    root: PathBuf,
}

impl AssetStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the managed file for an asset. `extension` includes the dot.
    pub fn path_for(&self, id: AssetId, extension: &str) -> PathBuf {
        self.root.join(format!("{id}{extension}"))
    }

    /// Copy `source` into the store under the asset's managed name.
    pub fn store(&self, id: AssetId, extension: &str, source: &Path) -> Result<StoredFile> {
        std::fs::create_dir_all(&self.root)?;

        let path = self.path_for(id, extension);
        let mut input = File::open(source)?;
        let mut temp = NamedTempFile::new_in(&self.root)?;
        let size_bytes = io::copy(&mut input, &mut temp)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;

        Ok(StoredFile { path, size_bytes })
    }

    /// Remove a file from the store. Returns whether it existed.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
