//! Inbox query operations.
//!
//! Inboxes are the registered entry points files arrive through. Each inbox
//! maps to one collection. Registration is an upsert keyed on the external
//! inbox ID so re-registering an inbox re-points and re-activates it.

use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection};
use seriesdock_common::{CollectionId, Error, InboxId, Result};
use uuid::Uuid;

use crate::models::Inbox;

/// Register an inbox, or re-point an existing registration.
///
/// Keyed on `external_id`. A repeated registration updates the name and
/// target collection and re-activates the inbox.
pub fn register_inbox(
    conn: &Connection,
    external_id: i64,
    name: &str,
    collection_id: CollectionId,
) -> Result<Inbox> {
    let id = InboxId::new();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO inboxes (id, external_id, name, collection_id, is_active, created_at)
         VALUES (:id, :external_id, :name, :collection_id, 1, :created_at)
         ON CONFLICT (external_id) DO UPDATE SET
             name = :name,
             collection_id = :collection_id,
             is_active = 1",
        named_params! {
            ":id": id.to_string(),
            ":external_id": external_id,
            ":name": name,
            ":collection_id": collection_id.to_string(),
            ":created_at": now.to_rfc3339(),
        },
    )
    .map_err(|e| {
        if e.to_string().contains("FOREIGN KEY constraint failed") {
            Error::not_found("collection", collection_id)
        } else {
            Error::database(e.to_string())
        }
    })?;

    get_inbox_by_external_id(conn, external_id)?
        .ok_or_else(|| Error::internal("inbox vanished after upsert"))
}

/// Get an inbox by its external ID.
pub fn get_inbox_by_external_id(conn: &Connection, external_id: i64) -> Result<Option<Inbox>> {
    match conn.query_row(
        "SELECT id, external_id, name, collection_id, is_active, total_files, created_at
         FROM inboxes WHERE external_id = ?",
        [external_id],
        |row| {
            Ok(Inbox {
                id: InboxId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
                external_id: row.get(1)?,
                name: row.get(2)?,
                collection_id: CollectionId::from(
                    Uuid::parse_str(&row.get::<_, String>(3)?).unwrap(),
                ),
                is_active: row.get::<_, i32>(4)? != 0,
                total_files: row.get(5)?,
                created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(6)?)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        },
    ) {
        Ok(inbox) => Ok(Some(inbox)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all inboxes ordered by registration time.
pub fn list_inboxes(conn: &Connection) -> Result<Vec<Inbox>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, external_id, name, collection_id, is_active, total_files, created_at
             FROM inboxes ORDER BY created_at",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let inboxes = stmt
        .query_map([], |row| {
            Ok(Inbox {
                id: InboxId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
                external_id: row.get(1)?,
                name: row.get(2)?,
                collection_id: CollectionId::from(
                    Uuid::parse_str(&row.get::<_, String>(3)?).unwrap(),
                ),
                is_active: row.get::<_, i32>(4)? != 0,
                total_files: row.get(5)?,
                created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(6)?)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(inboxes)
}

/// Deactivate an inbox so the entry gate starts ignoring its files.
///
/// Returns `true` if the inbox existed.
pub fn deactivate_inbox(conn: &Connection, external_id: i64) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE inboxes SET is_active = 0 WHERE external_id = ?",
            [external_id],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected > 0)
}

/// Increment the denormalized file count after an import through this inbox.
pub fn increment_inbox_files(conn: &Connection, external_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE inboxes SET total_files = total_files + 1 WHERE external_id = ?",
        [external_id],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}
