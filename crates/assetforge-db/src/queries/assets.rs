//! Asset CRUD operations.

use assetforge_common::{AssetId, Error, Result};
use rusqlite::types::Value;
use rusqlite::Connection;

use super::{db_err, now, violated_constraint, Constraint};
use crate::models::{Asset, NewAsset};

const COLS: &str = "id, original_name, file_kind, extension, size_bytes, storage_path,
    is_compressed, backup_path, compression_ratio, created_at, updated_at";

/// Insert a new, uncompressed asset.
pub fn create_asset(conn: &Connection, new: &NewAsset) -> Result<Asset> {
    let now = now();

    conn.execute(
        "INSERT INTO assets (id, original_name, file_kind, extension, size_bytes,
            storage_path, is_compressed, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
        rusqlite::params![
            new.id.to_string(),
            new.original_name,
            new.file_kind.to_string(),
            new.extension,
            new.size_bytes,
            new.storage_path,
            now,
        ],
    )
    .map_err(|e| match violated_constraint(&e) {
        Some(Constraint::Unique) => {
            Error::conflict(format!("asset {} or its storage path already exists", new.id))
        }
        _ => db_err(e),
    })?;

    Ok(Asset {
        id: new.id,
        original_name: new.original_name.clone(),
        file_kind: new.file_kind,
        extension: new.extension.clone(),
        size_bytes: new.size_bytes,
        storage_path: new.storage_path.clone(),
        is_compressed: false,
        backup_path: None,
        compression_ratio: None,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Get an asset by ID.
pub fn get_asset(conn: &Connection, id: AssetId) -> Result<Option<Asset>> {
    let q = format!("SELECT {COLS} FROM assets WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Asset::from_row) {
        Ok(a) => Ok(Some(a)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// List assets newest first.
///
/// With `tag_names`, only assets carrying at least one of those tags are
/// returned.
pub fn list_assets(
    conn: &Connection,
    offset: i64,
    limit: i64,
    tag_names: &[String],
) -> Result<Vec<Asset>> {
    let mut params: Vec<Value> = vec![Value::Integer(limit), Value::Integer(offset)];
    let filter = if tag_names.is_empty() {
        String::new()
    } else {
        let placeholders = (3..3 + tag_names.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        params.extend(tag_names.iter().map(|n| Value::Text(n.trim().to_string())));
        format!(
            "WHERE EXISTS (SELECT 1 FROM asset_tags j JOIN tags t ON t.id = j.tag_id
                WHERE j.asset_id = assets.id AND t.name IN ({placeholders}))"
        )
    };

    // ?1 and ?2 are LIMIT and OFFSET; tag names start at ?3
    let q = format!(
        "SELECT {COLS} FROM assets {filter}
         ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), Asset::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Count all assets.
pub fn count_assets(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))
        .map_err(db_err)
}

/// Record a committed compression swap.
///
/// Only applies to an asset that is not already compressed, so the backup
/// path of an earlier swap is never replaced. Returns `false` when no row
/// matched.
pub fn mark_compressed(
    conn: &Connection,
    id: AssetId,
    backup_path: &str,
    compression_ratio: f64,
    size_bytes: i64,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE assets SET is_compressed = 1, backup_path = ?1, compression_ratio = ?2,
                size_bytes = ?3, updated_at = ?4
             WHERE id = ?5 AND is_compressed = 0",
            rusqlite::params![backup_path, compression_ratio, size_bytes, now(), id.to_string()],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Delete an asset. Its jobs and tag links cascade.
pub fn delete_asset(conn: &Connection, id: AssetId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM assets WHERE id = ?1", [id.to_string()])
        .map_err(db_err)?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::tags;
    use crate::queries::test_support::new_asset;

    #[test]
    fn create_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let created = create_asset(&conn, &new_asset("photo.png")).unwrap();
        let fetched = get_asset(&conn, created.id).unwrap().unwrap();

        assert_eq!(fetched, created);
        assert!(!fetched.is_compressed);
        assert!(fetched.backup_path.is_none());
        assert!(fetched.compression_ratio.is_none());
    }

    #[test]
    fn get_missing_returns_none() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(get_asset(&conn, AssetId::new()).unwrap().is_none());
    }

    #[test]
    fn duplicate_storage_path_conflicts() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let first = new_asset("a.png");
        create_asset(&conn, &first).unwrap();

        let mut second = new_asset("b.png");
        second.storage_path = first.storage_path.clone();
        let err = create_asset(&conn, &second).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn mark_compressed_applies_once() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = create_asset(&conn, &new_asset("photo.png")).unwrap();

        assert!(mark_compressed(&conn, asset.id, "/cdn/assets/x_original.png", 0.5, 250_000).unwrap());
        let updated = get_asset(&conn, asset.id).unwrap().unwrap();
        assert!(updated.is_compressed);
        assert_eq!(updated.backup_path.as_deref(), Some("/cdn/assets/x_original.png"));
        assert_eq!(updated.compression_ratio, Some(0.5));
        assert_eq!(updated.size_bytes, 250_000);
        assert_eq!(updated.storage_path, asset.storage_path);

        assert!(!mark_compressed(&conn, asset.id, "/elsewhere.png", 0.1, 1).unwrap());
        let again = get_asset(&conn, asset.id).unwrap().unwrap();
        assert_eq!(again.backup_path.as_deref(), Some("/cdn/assets/x_original.png"));
    }

    #[test]
    fn list_newest_first_with_pagination() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let a = create_asset(&conn, &new_asset("a.png")).unwrap();
        let b = create_asset(&conn, &new_asset("b.png")).unwrap();
        let c = create_asset(&conn, &new_asset("c.png")).unwrap();

        let all = list_assets(&conn, 0, 10, &[]).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, c.id);
        assert_eq!(all[2].id, a.id);

        let page = list_assets(&conn, 1, 1, &[]).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, b.id);
        assert_eq!(count_assets(&conn).unwrap(), 3);
    }

    #[test]
    fn delete_removes_row() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset = create_asset(&conn, &new_asset("a.png")).unwrap();

        assert!(delete_asset(&conn, asset.id).unwrap());
        assert!(!delete_asset(&conn, asset.id).unwrap());
        assert!(get_asset(&conn, asset.id).unwrap().is_none());
    }

    #[test]
    fn list_filters_by_any_tag_name() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let a = create_asset(&conn, &new_asset("a.png")).unwrap();
        let b = create_asset(&conn, &new_asset("b.png")).unwrap();
        create_asset(&conn, &new_asset("c.png")).unwrap();

        let launch = tags::create_tag(&conn, "launch", tags::DEFAULT_TAG_COLOR).unwrap();
        let brand = tags::create_tag(&conn, "brand", tags::DEFAULT_TAG_COLOR).unwrap();
        tags::attach_tag(&conn, a.id, launch.id).unwrap();
        tags::attach_tag(&conn, a.id, brand.id).unwrap();
        tags::attach_tag(&conn, b.id, brand.id).unwrap();

        let ids = |names: &[&str]| -> Vec<AssetId> {
            let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
            list_assets(&conn, 0, 10, &names)
                .unwrap()
                .into_iter()
                .map(|a| a.id)
                .collect()
        };

        assert_eq!(ids(&["launch"]), vec![a.id]);
        // An asset matching both names appears once
        assert_eq!(ids(&["brand", "launch"]), vec![b.id, a.id]);
        assert!(ids(&["unknown"]).is_empty());
        assert_eq!(ids(&[]).len(), 3);

        let names = vec!["brand".to_string()];
        let page = list_assets(&conn, 1, 1, &names).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, a.id);
    }
}
