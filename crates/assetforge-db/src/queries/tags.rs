//! Tag CRUD and asset association.

use assetforge_common::{AssetId, Error, Result, TagId};
use rusqlite::Connection;

use super::{db_err, now, violated_constraint, Constraint};
use crate::models::Tag;

/// Colour given to tags created implicitly at upload time.
pub const DEFAULT_TAG_COLOR: &str = "#3B82F6";

const COLS: &str = "id, name, color, created_at";

/// Create a tag. Names are unique and must not be blank.
pub fn create_tag(conn: &Connection, name: &str, color: &str) -> Result<Tag> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("tag name required"));
    }

    let id = TagId::new();
    let now = now();
    conn.execute(
        "INSERT INTO tags (id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), name, color, &now],
    )
    .map_err(|e| match violated_constraint(&e) {
        Some(Constraint::Unique) => Error::conflict(format!("tag '{name}' already exists")),
        _ => db_err(e),
    })?;

    Ok(Tag {
        id,
        name: name.to_string(),
        color: color.to_string(),
        created_at: now,
    })
}

/// Look up a tag by exact name.
pub fn get_tag_by_name(conn: &Connection, name: &str) -> Result<Option<Tag>> {
    let q = format!("SELECT {COLS} FROM tags WHERE name = ?1");
    match conn.query_row(&q, [name.trim()], Tag::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

/// Return the tag with this name, creating it with the default colour.
pub fn get_or_create_tag(conn: &Connection, name: &str) -> Result<Tag> {
    match get_tag_by_name(conn, name)? {
        Some(tag) => Ok(tag),
        None => create_tag(conn, name, DEFAULT_TAG_COLOR),
    }
}

/// All tags ordered by name.
pub fn list_tags(conn: &Connection) -> Result<Vec<Tag>> {
    let q = format!("SELECT {COLS} FROM tags ORDER BY name");
    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map([], Tag::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Link a tag to an asset. Returns `false` if the link already existed.
pub fn attach_tag(conn: &Connection, asset_id: AssetId, tag_id: TagId) -> Result<bool> {
    let n = conn
        .execute(
            "INSERT OR IGNORE INTO asset_tags (asset_id, tag_id) VALUES (?1, ?2)",
            rusqlite::params![asset_id.to_string(), tag_id.to_string()],
        )
        .map_err(|e| match violated_constraint(&e) {
            Some(Constraint::ForeignKey) => Error::not_found("asset or tag", asset_id),
            _ => db_err(e),
        })?;
    Ok(n > 0)
}

/// Remove a tag from an asset. Returns `false` if it was not attached.
pub fn detach_tag(conn: &Connection, asset_id: AssetId, tag_id: TagId) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM asset_tags WHERE asset_id = ?1 AND tag_id = ?2",
            rusqlite::params![asset_id.to_string(), tag_id.to_string()],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Ids of the assets carrying a tag, oldest first.
pub fn list_asset_ids_for_tag(conn: &Connection, tag_id: TagId) -> Result<Vec<AssetId>> {
    let mut stmt = conn
        .prepare(
            "SELECT a.id FROM assets a
             JOIN asset_tags j ON j.asset_id = a.id
             WHERE j.tag_id = ?1
             ORDER BY a.created_at, a.rowid",
        )
        .map_err(db_err)?;
    let ids = stmt
        .query_map([tag_id.to_string()], |row| row.get::<_, String>(0))
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    ids.iter()
        .map(|raw| {
            raw.parse()
                .map_err(|_| Error::database(format!("invalid asset id in asset_tags: {raw}")))
        })
        .collect()
}

/// Delete a tag row. Links to assets cascade; the assets themselves stay.
pub fn delete_tag(conn: &Connection, tag_id: TagId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM tags WHERE id = ?1", [tag_id.to_string()])
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Tags attached to an asset, ordered by name.
pub fn list_tags_for_asset(conn: &Connection, asset_id: AssetId) -> Result<Vec<Tag>> {
    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.name, t.color, t.created_at FROM tags t
             JOIN asset_tags j ON j.tag_id = t.id
             WHERE j.asset_id = ?1
             ORDER BY t.name",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([asset_id.to_string()], Tag::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}
