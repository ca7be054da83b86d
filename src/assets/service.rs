//! Asset service coordinating the managed store, the catalog and compression.

use std::path::Path;
use std::sync::Arc;

use assetforge_common::paths::{dotted_extension, file_kind_for};
use assetforge_common::{AssetId, CompressionJobId, Error, Result};
use assetforge_db::models::{Asset, CompressionJob, NewAsset, Tag};
use assetforge_db::pool::{get_conn, DbPool, PooledConnection};
use assetforge_db::queries::{assets, compression_jobs, tags};
use serde::Serialize;
use tracing::{info, warn};

use super::storage::AssetStorage;
use super::validator::{validate_tag_color, validate_tag_names, validate_upload};
use crate::compression::{CompressionError, CompressionService};

type CompressionResult<T> = std::result::Result<T, CompressionError>;

/// An asset together with its tags.
#[derive(Debug, Clone, Serialize)]
pub struct AssetDetails {
    #[serde(flatten)]
    pub asset: Asset,
    pub tags: Vec<Tag>,
}

pub struct AssetService {
    pool: DbPool,
    storage: AssetStorage,
    compression: Option<Arc<CompressionService>>,
    max_upload_bytes: u64,
}

impl AssetService {
    pub fn new(pool: DbPool, storage: AssetStorage, max_upload_bytes: u64) -> Self {
        Self {
            pool,
            storage,
            compression: None,
            max_upload_bytes,
        }
    }

    /// Queue compression for image and video uploads.
    pub fn with_compression(mut self, compression: Arc<CompressionService>) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Copy a file into the managed store and record it.
    ///
    /// Unknown tag names are created. Images and videos are queued for
    /// compression; a failure to queue is logged and does not fail the
    /// upload.
    pub fn upload(&self, source: &Path, tag_names: &[String]) -> Result<AssetDetails> {
        let tag_names = validate_tag_names(tag_names)?;
        let size_bytes = std::fs::metadata(source)?.len();
        validate_upload(source, size_bytes, self.max_upload_bytes)?;

        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::validation("filename required"))?;
        let extension = dotted_extension(source);
        let file_kind = file_kind_for(source);
        let id = AssetId::new();

        let stored = self.storage.store(id, &extension, source)?;
        let new = NewAsset {
            id,
            original_name,
            file_kind,
            extension,
            size_bytes: stored.size_bytes as i64,
            storage_path: stored.path.to_string_lossy().into_owned(),
        };

        let details = match self.record(&new, &tag_names) {
            Ok(details) => details,
            Err(e) => {
                if let Err(rm) = self.storage.delete(&stored.path) {
                    warn!(path = %stored.path.display(), error = %rm, "Failed to remove copied upload");
                }
                return Err(e);
            }
        };

        info!(
            asset_id = %details.asset.id,
            file_kind = %details.asset.file_kind,
            size_bytes = details.asset.size_bytes,
            "Asset uploaded"
        );

        if details.asset.file_kind.is_compressible() {
            self.queue_compression(details.asset.id);
        }

        Ok(details)
    }

    fn record(&self, new: &NewAsset, tag_names: &[String]) -> Result<AssetDetails> {
        let conn = get_conn(&self.pool)?;
        let tx = conn.unchecked_transaction().map_err(Error::database)?;
        let asset = assets::create_asset(&tx, new)?;
        for name in tag_names {
            let tag = tags::get_or_create_tag(&tx, name)?;
            tags::attach_tag(&tx, asset.id, tag.id)?;
        }
        let tags = tags::list_tags_for_asset(&tx, asset.id)?;
        tx.commit().map_err(Error::database)?;
        Ok(AssetDetails { asset, tags })
    }

    fn queue_compression(&self, asset_id: AssetId) {
        let Some(compression) = &self.compression else {
            return;
        };
        match compression.enqueue(asset_id) {
            Ok(Some(job_id)) => {
                info!(asset_id = %asset_id, job_id = %job_id, "Compression queued for upload");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(asset_id = %asset_id, error = %e, "Failed to queue compression");
            }
        }
    }

    /// Fetch an asset with its tags.
    pub fn get(&self, id: AssetId) -> Result<AssetDetails> {
        let conn = get_conn(&self.pool)?;
        let asset = assets::get_asset(&conn, id)?.ok_or_else(|| Error::not_found("asset", id))?;
        let tags = tags::list_tags_for_asset(&conn, id)?;
        Ok(AssetDetails { asset, tags })
    }

    /// Assets newest first, optionally only those with any of `tag_names`.
    pub fn list(&self, offset: i64, limit: i64, tag_names: &[String]) -> Result<Vec<Asset>> {
        let tag_names = validate_tag_names(tag_names)?;
        let conn = get_conn(&self.pool)?;
        assets::list_assets(&conn, offset, limit, &tag_names)
    }

    /// Queue compression for an existing asset.
    ///
    /// Refuses documents and assets that are already compressed before any
    /// job is created.
    pub fn compress(&self, id: AssetId) -> CompressionResult<CompressionJobId> {
        let compression = self.compression.as_ref().ok_or(CompressionError::Disabled)?;

        let conn = get_conn(&self.pool)?;
        let asset = assets::get_asset(&conn, id)?.ok_or(CompressionError::AssetNotFound(id))?;
        drop(conn);

        if !asset.file_kind.is_compressible() {
            return Err(CompressionError::UnsupportedMediaType(asset.file_kind));
        }
        if asset.is_compressed {
            return Err(CompressionError::AlreadyCompressed(id));
        }

        compression.enqueue(id)?.ok_or(CompressionError::Disabled)
    }

    /// Compression history for an asset, newest first.
    pub fn jobs(&self, id: AssetId) -> Result<Vec<CompressionJob>> {
        let conn = get_conn(&self.pool)?;
        compression_jobs::list_jobs_for_asset(&conn, id)
    }

    pub fn tags(&self) -> Result<Vec<Tag>> {
        let conn = get_conn(&self.pool)?;
        tags::list_tags(&conn)
    }

    /// Remove the active file, the backup if any, and the row.
    ///
    /// Jobs for the asset are removed with it. Returns `false` if the asset
    /// did not exist.
    pub fn delete(&self, id: AssetId) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        let Some(asset) = assets::get_asset(&conn, id)? else {
            return Ok(false);
        };

        self.storage.delete(Path::new(&asset.storage_path))?;
        if let Some(backup) = &asset.backup_path {
            self.storage.delete(Path::new(backup))?;
        }

        let deleted = assets::delete_asset(&conn, id)?;
        if deleted {
            info!(asset_id = %id, "Asset deleted");
        }
        Ok(deleted)
    }

    /// Delete several assets, skipping ids that do not exist.
    ///
    /// Returns the ids that were deleted.
    pub fn delete_many(&self, ids: &[AssetId]) -> Result<Vec<AssetId>> {
        let mut deleted = Vec::with_capacity(ids.len());
        for &id in ids {
            if self.delete(id)? {
                deleted.push(id);
            }
        }
        Ok(deleted)
    }

    pub fn create_tag(&self, name: &str, color: &str) -> Result<Tag> {
        let color = validate_tag_color(color)?;
        let conn = get_conn(&self.pool)?;
        let tag = tags::create_tag(&conn, name, &color)?;
        info!(tag = %tag.name, "Tag created");
        Ok(tag)
    }

    /// Attach an existing tag to each asset. All or nothing.
    ///
    /// Returns how many links were new.
    pub fn tag_assets(&self, tag_name: &str, ids: &[AssetId]) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let tag = find_tag(&conn, tag_name)?;

        let tx = conn.unchecked_transaction().map_err(Error::database)?;
        let mut attached = 0;
        for &id in ids {
            if tags::attach_tag(&tx, id, tag.id)? {
                attached += 1;
            }
        }
        tx.commit().map_err(Error::database)?;
        Ok(attached)
    }

    /// Remove a tag from an asset. Returns `false` if it was not attached.
    pub fn untag(&self, id: AssetId, tag_name: &str) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        if assets::get_asset(&conn, id)?.is_none() {
            return Err(Error::not_found("asset", id));
        }
        let tag = find_tag(&conn, tag_name)?;
        tags::detach_tag(&conn, id, tag.id)
    }

    /// Delete a tag together with every asset carrying it.
    ///
    /// Returns the ids of the deleted assets.
    pub fn delete_tag(&self, tag_name: &str) -> Result<Vec<AssetId>> {
        let conn = get_conn(&self.pool)?;
        let tag = find_tag(&conn, tag_name)?;
        let tagged = tags::list_asset_ids_for_tag(&conn, tag.id)?;
        drop(conn);

        let deleted = self.delete_many(&tagged)?;

        let conn = get_conn(&self.pool)?;
        tags::delete_tag(&conn, tag.id)?;
        info!(tag = %tag.name, assets = deleted.len(), "Tag deleted");
        Ok(deleted)
    }
}

fn find_tag(conn: &PooledConnection, name: &str) -> Result<Tag> {
    tags::get_tag_by_name(conn, name)?.ok_or_else(|| Error::not_found("tag", name.trim()))
}
