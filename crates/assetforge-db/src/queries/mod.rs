//! Database query modules.
//!
//! - assets: Asset CRUD and the post-compression update
//! - compression_jobs: Job creation, guarded status transitions, history
//! - tags: Tag CRUD and asset association

pub mod assets;
pub mod compression_jobs;
pub mod tags;

use assetforge_common::Error;
use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp the way every table stores it.
///
/// Fixed microsecond precision keeps stored values lexicographically
/// ordered, which the `ORDER BY` and cutoff queries rely on.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now() -> String {
    format_timestamp(Utc::now())
}

/// Which kind of constraint rejected a write.
pub(crate) enum Constraint {
    Unique,
    ForeignKey,
}

pub(crate) fn violated_constraint(e: &rusqlite::Error) -> Option<Constraint> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => match err.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Some(Constraint::Unique),
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Constraint::ForeignKey),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use assetforge_common::{AssetId, FileKind};
    use rusqlite::Connection;

    use crate::models::{Asset, NewAsset};

    pub(crate) fn new_asset(name: &str) -> NewAsset {
        let id = AssetId::new();
        NewAsset {
            id,
            original_name: name.to_string(),
            file_kind: FileKind::Image,
            extension: ".png".to_string(),
            size_bytes: 500_000,
            storage_path: format!("/cdn/assets/{id}.png"),
        }
    }

    pub(crate) fn insert_asset(conn: &Connection) -> Asset {
        super::assets::create_asset(conn, &new_asset("photo.png")).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp_fixed_precision() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(ts), "2024-03-01T12:00:00.000000Z");
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let a = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert!(format_timestamp(a) < format_timestamp(b));
    }
}
