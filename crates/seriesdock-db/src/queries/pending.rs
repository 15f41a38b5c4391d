//! Pending upload query operations.
//!
//! Pending uploads are files held for operator confirmation. A row moves
//! from `pending` to exactly one terminal state (`confirmed`, `rejected`,
//! `expired`) and never transitions again. The transition is guarded in
//! SQL with `WHERE state = 'pending'`, so concurrent deciders cannot both
//! win. Terminal rows are retained for audit until purged.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use seriesdock_common::{CollectionId, Error, PendingUploadId, Result};
use uuid::Uuid;

use crate::models::{NewPendingUpload, PendingState, PendingUpload};

/// Outcome of an insert attempt against the `file_unique_id` gate.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingInsert {
    /// This call created the row.
    Created(PendingUpload),
    /// A confirmation request for this file already exists.
    AlreadyExists(PendingUpload),
}

fn parse_pending_row(row: &Row<'_>) -> rusqlite::Result<PendingUpload> {
    Ok(PendingUpload {
        id: PendingUploadId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
        collection_id: CollectionId::from(Uuid::parse_str(&row.get::<_, String>(1)?).unwrap()),
        file_unique_id: row.get(2)?,
        file_id: row.get(3)?,
        original_filename: row.get(4)?,
        file_size: row.get(5)?,
        mime_type: row.get(6)?,
        inbox_external_id: row.get(7)?,
        message_id: row.get(8)?,
        origin_actor_id: row.get(9)?,
        suggested_tmdb_id: row.get(10)?,
        suggested_title: row.get(11)?,
        suggested_season: row.get(12)?,
        suggested_episode: row.get(13)?,
        state: row
            .get::<_, String>(14)?
            .parse()
            .unwrap_or(PendingState::Pending),
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(15)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        decided_at: row
            .get::<_, Option<String>>(16)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

const PENDING_COLUMNS: &str = "id, collection_id, file_unique_id, file_id, original_filename,
    file_size, mime_type, inbox_external_id, message_id, origin_actor_id, suggested_tmdb_id,
    suggested_title, suggested_season, suggested_episode, state, created_at, decided_at";

/// Attempt to record a confirmation request, deferring to an existing one.
///
/// Keyed on `file_unique_id` so redelivery of an unconfirmed file does not
/// pile up duplicate requests. The existing row is returned whatever state
/// it is in.
pub fn create_pending(conn: &Connection, new: &NewPendingUpload) -> Result<PendingInsert> {
    if new.file_unique_id.is_empty() {
        return Err(Error::validation("file_unique_id must not be empty"));
    }

    let id = PendingUploadId::new();
    let now = Utc::now();

    let inserted = conn.execute(
        "INSERT INTO pending_uploads (id, collection_id, file_unique_id, file_id,
             original_filename, file_size, mime_type, inbox_external_id, message_id,
             origin_actor_id, suggested_tmdb_id, suggested_title, suggested_season,
             suggested_episode, state, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
        params![
            id.to_string(),
            new.collection_id.to_string(),
            new.file_unique_id,
            new.file_id,
            new.original_filename,
            new.file_size,
            new.mime_type,
            new.inbox_external_id,
            new.message_id,
            new.origin_actor_id,
            new.suggested_tmdb_id,
            new.suggested_title,
            new.suggested_season,
            new.suggested_episode,
            now.to_rfc3339(),
        ],
    );

    match inserted {
        Ok(_) => Ok(PendingInsert::Created(PendingUpload {
            id,
            collection_id: new.collection_id,
            file_unique_id: new.file_unique_id.clone(),
            file_id: new.file_id.clone(),
            original_filename: new.original_filename.clone(),
            file_size: new.file_size,
            mime_type: new.mime_type.clone(),
            inbox_external_id: new.inbox_external_id,
            message_id: new.message_id,
            origin_actor_id: new.origin_actor_id,
            suggested_tmdb_id: new.suggested_tmdb_id,
            suggested_title: new.suggested_title.clone(),
            suggested_season: new.suggested_season,
            suggested_episode: new.suggested_episode,
            state: PendingState::Pending,
            created_at: now,
            decided_at: None,
        })),
        Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
            match get_pending_by_file_unique_id(conn, &new.file_unique_id)? {
                Some(existing) => Ok(PendingInsert::AlreadyExists(existing)),
                None => Err(Error::internal(format!(
                    "pending insert conflicted but file_unique_id {} is absent",
                    new.file_unique_id
                ))),
            }
        }
        Err(e) if e.to_string().contains("FOREIGN KEY constraint failed") => {
            Err(Error::not_found("collection", new.collection_id))
        }
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a pending upload by ID.
pub fn get_pending(conn: &Connection, id: PendingUploadId) -> Result<PendingUpload> {
    conn.query_row(
        &format!("SELECT {} FROM pending_uploads WHERE id = ?", PENDING_COLUMNS),
        [id.to_string()],
        parse_pending_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found("pending_upload", id),
        _ => Error::database(e.to_string()),
    })
}

/// Get a pending upload by the unique ID of its file.
pub fn get_pending_by_file_unique_id(
    conn: &Connection,
    file_unique_id: &str,
) -> Result<Option<PendingUpload>> {
    match conn.query_row(
        &format!(
            "SELECT {} FROM pending_uploads WHERE file_unique_id = ?",
            PENDING_COLUMNS
        ),
        [file_unique_id],
        parse_pending_row,
    ) {
        Ok(pending) => Ok(Some(pending)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List pending uploads in a given state, oldest first.
pub fn list_pending_by_state(
    conn: &Connection,
    state: PendingState,
) -> Result<Vec<PendingUpload>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM pending_uploads WHERE state = ? ORDER BY created_at",
            PENDING_COLUMNS
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let uploads = stmt
        .query_map([state.to_string()], parse_pending_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(uploads)
}

/// Transition a pending upload into a terminal state.
///
/// Returns `true` if this call performed the transition and `false` if the
/// row was already decided. The `WHERE state = 'pending'` clause makes the
/// transition atomic; two concurrent deciders cannot both see `true`.
pub fn mark_decided(conn: &Connection, id: PendingUploadId, state: PendingState) -> Result<bool> {
    if !state.is_terminal() {
        return Err(Error::validation(format!(
            "'{}' is not a terminal pending state",
            state
        )));
    }

    let affected = conn
        .execute(
            "UPDATE pending_uploads SET state = ?, decided_at = ?
             WHERE id = ? AND state = 'pending'",
            params![state.to_string(), Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected > 0)
}

/// Expire all pending uploads created before the cutoff.
///
/// Returns the number of rows expired.
pub fn expire_pending_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let affected = conn
        .execute(
            "UPDATE pending_uploads SET state = 'expired', decided_at = ?
             WHERE state = 'pending' AND created_at < ?",
            params![Utc::now().to_rfc3339(), cutoff.to_rfc3339()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected)
}

/// Delete terminal rows decided before the cutoff.
///
/// Returns the number of rows purged. Purging also releases the
/// `file_unique_id` so a future delivery of the file starts fresh.
pub fn purge_terminal_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let affected = conn
        .execute(
            "DELETE FROM pending_uploads
             WHERE state != 'pending' AND decided_at < ?",
            [cutoff.to_rfc3339()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected)
}
