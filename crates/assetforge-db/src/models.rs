//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row` whose columns follow the module's `COLS` list.

use std::str::FromStr;

use assetforge_common::{AssetId, CompressionJobId, FileKind, JobStatus, TagId};
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_failure(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_failure(idx, e))?;
    Ok(T::from(uuid))
}

/// Parse a lowercase enum stored as text.
fn parse_enum<T: FromStr<Err = String>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: String| conversion_failure(idx, e))
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A catalogued asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub id: AssetId,
    pub original_name: String,
    pub file_kind: FileKind,
    /// Lowercase, with the leading dot.
    pub extension: String,
    pub size_bytes: i64,
    /// Currently served file: the compressed output once compression
    /// succeeded, the upload otherwise.
    pub storage_path: String,
    pub is_compressed: bool,
    pub backup_path: Option<String>,
    /// Compressed size divided by original size.
    pub compression_ratio: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Asset {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            original_name: row.get(1)?,
            file_kind: parse_enum(row, 2)?,
            extension: row.get(3)?,
            size_bytes: row.get(4)?,
            storage_path: row.get(5)?,
            is_compressed: row.get(6)?,
            backup_path: row.get(7)?,
            compression_ratio: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

/// Fields supplied when inserting an asset.
///
/// The id is chosen by the caller because the managed file name is derived
/// from it before the row exists.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub id: AssetId,
    pub original_name: String,
    pub file_kind: FileKind,
    pub extension: String,
    pub size_bytes: i64,
    pub storage_path: String,
}

// ---------------------------------------------------------------------------
// CompressionJob
// ---------------------------------------------------------------------------

/// Stored form of one compression attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionJob {
    pub id: CompressionJobId,
    pub asset_id: AssetId,
    pub status: JobStatus,
    pub progress: i64,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl CompressionJob {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            asset_id: parse_id(row, 1)?,
            status: parse_enum(row, 2)?,
            progress: row.get(3)?,
            error: row.get(4)?,
            created_at: row.get(5)?,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub created_at: String,
}

impl Tag {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
