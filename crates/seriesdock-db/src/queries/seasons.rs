//! Season query operations.
//!
//! Seasons are unique per (series, season_number) and follow the same
//! insert-then-re-read pattern as series. The denormalized `episode_count`
//! is recomputed from the episodes table, never incremented blindly.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use seriesdock_common::{Error, Result, SeasonId, SeriesId};
use uuid::Uuid;

use crate::models::{NewSeason, Season};

/// Outcome of an insert attempt against the (series_id, season_number) key.
#[derive(Debug, Clone, PartialEq)]
pub enum SeasonInsert {
    /// This call created the row.
    Created(Season),
    /// Another writer got there first; this is their row.
    AlreadyExists(Season),
}

impl SeasonInsert {
    /// The season row regardless of which writer created it.
    pub fn into_season(self) -> Season {
        match self {
            Self::Created(season) | Self::AlreadyExists(season) => season,
        }
    }
}

fn parse_season_row(row: &Row<'_>) -> rusqlite::Result<Season> {
    Ok(Season {
        id: SeasonId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
        series_id: SeriesId::from(Uuid::parse_str(&row.get::<_, String>(1)?).unwrap()),
        season_number: row.get(2)?,
        name: row.get(3)?,
        overview: row.get(4)?,
        poster_path: row.get(5)?,
        air_date: row.get(6)?,
        episode_count: row.get(7)?,
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(8)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

const SEASON_COLUMNS: &str = "id, series_id, season_number, name, overview, poster_path,
    air_date, episode_count, created_at";

/// Attempt to create a season, deferring to a concurrent winner.
pub fn try_create_season(
    conn: &Connection,
    series_id: SeriesId,
    new: &NewSeason,
) -> Result<SeasonInsert> {
    let id = SeasonId::new();
    let now = Utc::now();

    let inserted = conn.execute(
        "INSERT INTO seasons (id, series_id, season_number, name, overview, poster_path,
                              air_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id.to_string(),
            series_id.to_string(),
            new.season_number,
            new.name,
            new.overview,
            new.poster_path,
            new.air_date,
            now.to_rfc3339(),
        ],
    );

    match inserted {
        Ok(_) => Ok(SeasonInsert::Created(Season {
            id,
            series_id,
            season_number: new.season_number,
            name: new.name.clone(),
            overview: new.overview.clone(),
            poster_path: new.poster_path.clone(),
            air_date: new.air_date.clone(),
            episode_count: 0,
            created_at: now,
        })),
        Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
            match get_season_by_number(conn, series_id, new.season_number)? {
                Some(existing) => Ok(SeasonInsert::AlreadyExists(existing)),
                None => Err(Error::internal(format!(
                    "season insert conflicted but season {} is absent",
                    new.season_number
                ))),
            }
        }
        Err(e) if e.to_string().contains("FOREIGN KEY constraint failed") => {
            Err(Error::not_found("series", series_id))
        }
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a season by ID.
pub fn get_season(conn: &Connection, id: SeasonId) -> Result<Season> {
    conn.query_row(
        &format!("SELECT {} FROM seasons WHERE id = ?", SEASON_COLUMNS),
        [id.to_string()],
        parse_season_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found("season", id),
        _ => Error::database(e.to_string()),
    })
}

/// Get a season by its number within a series.
pub fn get_season_by_number(
    conn: &Connection,
    series_id: SeriesId,
    season_number: i64,
) -> Result<Option<Season>> {
    match conn.query_row(
        &format!(
            "SELECT {} FROM seasons WHERE series_id = ? AND season_number = ?",
            SEASON_COLUMNS
        ),
        params![series_id.to_string(), season_number],
        parse_season_row,
    ) {
        Ok(season) => Ok(Some(season)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all seasons of a series ordered by season number.
pub fn list_seasons_for_series(conn: &Connection, series_id: SeriesId) -> Result<Vec<Season>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM seasons WHERE series_id = ? ORDER BY season_number",
            SEASON_COLUMNS
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let seasons = stmt
        .query_map([series_id.to_string()], parse_season_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(seasons)
}

/// Recompute `episode_count` for one season from the episodes table.
///
/// Runs after every episode insert. Deriving the count from a COUNT(*)
/// rather than incrementing keeps it correct no matter how many writers
/// land episodes in the same season concurrently, and it can never go
/// negative.
pub fn recount_episodes(conn: &Connection, season_id: SeasonId) -> Result<i64> {
    let affected = conn
        .execute(
            "UPDATE seasons
             SET episode_count = (SELECT COUNT(*) FROM episodes WHERE season_id = ?1)
             WHERE id = ?1",
            [season_id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Err(Error::not_found("season", season_id));
    }

    conn.query_row(
        "SELECT episode_count FROM seasons WHERE id = ?",
        [season_id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}
