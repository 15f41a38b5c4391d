//! Collection query operations.
//!
//! Collections are the top-level containers that imported series are filed
//! under. Their `series_count` and `total_files` columns are denormalized
//! and maintained by the ingest path, with a full recount available in the
//! maintenance module.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use seriesdock_common::{CollectionId, Error, Result};
use uuid::Uuid;

use crate::models::Collection;

/// Derive a URL-safe slug from a collection name.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Create a new collection.
///
/// Names and their derived slugs are unique. Creating a collection whose
/// name or slug already exists returns `Error::Conflict`.
pub fn create_collection(
    conn: &Connection,
    name: &str,
    owner_actor_id: Option<i64>,
) -> Result<Collection> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("collection name must not be empty"));
    }

    let id = CollectionId::new();
    let slug = slugify(name);
    let now = Utc::now();

    conn.execute(
        "INSERT INTO collections (id, name, slug, owner_actor_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            id.to_string(),
            name,
            slug,
            owner_actor_id,
            now.to_rfc3339(),
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            Error::conflict(format!("Collection '{}' already exists", name))
        } else {
            Error::database(e.to_string())
        }
    })?;

    Ok(Collection {
        id,
        name: name.to_string(),
        slug,
        owner_actor_id,
        series_count: 0,
        total_files: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Get a collection by ID.
pub fn get_collection(conn: &Connection, id: CollectionId) -> Result<Collection> {
    conn.query_row(
        "SELECT id, name, slug, owner_actor_id, series_count, total_files, created_at, updated_at
         FROM collections WHERE id = ?",
        [id.to_string()],
        |row| {
            Ok(Collection {
                id: CollectionId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
                name: row.get(1)?,
                slug: row.get(2)?,
                owner_actor_id: row.get(3)?,
                series_count: row.get(4)?,
                total_files: row.get(5)?,
                created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(6)?)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                updated_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found("collection", id),
        _ => Error::database(e.to_string()),
    })
}

/// Get a collection by slug.
pub fn get_collection_by_slug(conn: &Connection, slug: &str) -> Result<Option<Collection>> {
    match conn.query_row(
        "SELECT id, name, slug, owner_actor_id, series_count, total_files, created_at, updated_at
         FROM collections WHERE slug = ?",
        [slug],
        |row| {
            Ok(Collection {
                id: CollectionId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
                name: row.get(1)?,
                slug: row.get(2)?,
                owner_actor_id: row.get(3)?,
                series_count: row.get(4)?,
                total_files: row.get(5)?,
                created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(6)?)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                updated_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        },
    ) {
        Ok(collection) => Ok(Some(collection)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all collections ordered by name.
pub fn list_collections(conn: &Connection) -> Result<Vec<Collection>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, slug, owner_actor_id, series_count, total_files,
                    created_at, updated_at
             FROM collections ORDER BY name",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let collections = stmt
        .query_map([], |row| {
            Ok(Collection {
                id: CollectionId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
                name: row.get(1)?,
                slug: row.get(2)?,
                owner_actor_id: row.get(3)?,
                series_count: row.get(4)?,
                total_files: row.get(5)?,
                created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(6)?)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                updated_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(collections)
}

/// Increment the denormalized series count after a series row is created.
pub fn increment_series_count(conn: &Connection, id: CollectionId) -> Result<()> {
    let affected = conn
        .execute(
            "UPDATE collections SET series_count = series_count + 1, updated_at = ?
             WHERE id = ?",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Err(Error::not_found("collection", id));
    }

    Ok(())
}

/// Increment the denormalized file count after an episode row is created.
pub fn increment_total_files(conn: &Connection, id: CollectionId) -> Result<()> {
    let affected = conn
        .execute(
            "UPDATE collections SET total_files = total_files + 1, updated_at = ?
             WHERE id = ?",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Err(Error::not_found("collection", id));
    }

    Ok(())
}
