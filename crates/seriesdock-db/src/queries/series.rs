//! Series query operations.
//!
//! Series are unique per (collection, tmdb_id). Concurrent importers racing
//! to create the same series are resolved by the UNIQUE constraint: the
//! loser re-reads the winner's row and carries on. Callers must not
//! check-then-insert.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use seriesdock_common::{CollectionId, Error, Result, SeriesId};
use uuid::Uuid;

use crate::models::{NewSeries, Series};

/// Outcome of an insert attempt against the (collection_id, tmdb_id) key.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesInsert {
    /// This call created the row.
    Created(Series),
    /// Another writer got there first; this is their row.
    AlreadyExists(Series),
}

impl SeriesInsert {
    /// The series row regardless of which writer created it.
    pub fn into_series(self) -> Series {
        match self {
            Self::Created(series) | Self::AlreadyExists(series) => series,
        }
    }
}

fn parse_series_row(row: &Row<'_>) -> rusqlite::Result<Series> {
    Ok(Series {
        id: SeriesId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
        collection_id: CollectionId::from(Uuid::parse_str(&row.get::<_, String>(1)?).unwrap()),
        tmdb_id: row.get(2)?,
        name: row.get(3)?,
        overview: row.get(4)?,
        poster_path: row.get(5)?,
        backdrop_path: row.get(6)?,
        first_air_date: row.get(7)?,
        rating: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(9)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(10)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

const SERIES_COLUMNS: &str = "id, collection_id, tmdb_id, name, overview, poster_path,
    backdrop_path, first_air_date, rating, created_at, updated_at";

/// Attempt to create a series, deferring to a concurrent winner.
///
/// On a UNIQUE violation the existing row is re-read and returned as
/// `AlreadyExists`. The insert and the re-read are separate statements,
/// which is safe because series rows are never deleted by the ingest path.
pub fn try_create_series(
    conn: &Connection,
    collection_id: CollectionId,
    new: &NewSeries,
) -> Result<SeriesInsert> {
    let id = SeriesId::new();
    let now = Utc::now();

    let inserted = conn.execute(
        "INSERT INTO series (id, collection_id, tmdb_id, name, overview, poster_path,
                             backdrop_path, first_air_date, rating, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id.to_string(),
            collection_id.to_string(),
            new.tmdb_id,
            new.name,
            new.overview,
            new.poster_path,
            new.backdrop_path,
            new.first_air_date,
            new.rating,
            now.to_rfc3339(),
            now.to_rfc3339(),
        ],
    );

    match inserted {
        Ok(_) => Ok(SeriesInsert::Created(Series {
            id,
            collection_id,
            tmdb_id: new.tmdb_id,
            name: new.name.clone(),
            overview: new.overview.clone(),
            poster_path: new.poster_path.clone(),
            backdrop_path: new.backdrop_path.clone(),
            first_air_date: new.first_air_date.clone(),
            rating: new.rating,
            created_at: now,
            updated_at: now,
        })),
        Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
            match get_series_by_tmdb_id(conn, collection_id, new.tmdb_id)? {
                Some(existing) => Ok(SeriesInsert::AlreadyExists(existing)),
                None => Err(Error::internal(format!(
                    "series insert conflicted but tmdb_id {} is absent",
                    new.tmdb_id
                ))),
            }
        }
        Err(e) if e.to_string().contains("FOREIGN KEY constraint failed") => {
            Err(Error::not_found("collection", collection_id))
        }
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a series by ID.
pub fn get_series(conn: &Connection, id: SeriesId) -> Result<Series> {
    conn.query_row(
        &format!("SELECT {} FROM series WHERE id = ?", SERIES_COLUMNS),
        [id.to_string()],
        parse_series_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found("series", id),
        _ => Error::database(e.to_string()),
    })
}

/// Get a series by its catalog ID within a collection.
pub fn get_series_by_tmdb_id(
    conn: &Connection,
    collection_id: CollectionId,
    tmdb_id: i64,
) -> Result<Option<Series>> {
    match conn.query_row(
        &format!(
            "SELECT {} FROM series WHERE collection_id = ? AND tmdb_id = ?",
            SERIES_COLUMNS
        ),
        params![collection_id.to_string(), tmdb_id],
        parse_series_row,
    ) {
        Ok(series) => Ok(Some(series)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all series in a collection ordered by name.
pub fn list_series_for_collection(
    conn: &Connection,
    collection_id: CollectionId,
) -> Result<Vec<Series>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM series WHERE collection_id = ? ORDER BY name",
            SERIES_COLUMNS
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let series = stmt
        .query_map([collection_id.to_string()], parse_series_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(series)
}
