//! Episode query operations.
//!
//! The episode insert is the authoritative duplicate gate for the whole
//! ingest pipeline. `file_unique_id` carries a UNIQUE constraint, so of any
//! number of concurrent deliveries of the same file exactly one insert
//! succeeds and the rest re-read the winner's row. There is deliberately no
//! exists-check before the insert.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use seriesdock_common::{EpisodeId, Error, Result, SeasonId, SeriesId};
use uuid::Uuid;

use crate::models::{Episode, NewEpisode};

/// Outcome of an insert attempt against the `file_unique_id` gate.
#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeInsert {
    /// This call created the row.
    Created(Episode),
    /// The file was already imported; this is the existing row.
    Duplicate(Episode),
}

fn parse_episode_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: EpisodeId::from(Uuid::parse_str(&row.get::<_, String>(0)?).unwrap()),
        series_id: SeriesId::from(Uuid::parse_str(&row.get::<_, String>(1)?).unwrap()),
        season_id: SeasonId::from(Uuid::parse_str(&row.get::<_, String>(2)?).unwrap()),
        episode_number: row.get(3)?,
        name: row.get(4)?,
        overview: row.get(5)?,
        still_path: row.get(6)?,
        air_date: row.get(7)?,
        runtime: row.get(8)?,
        inbox_external_id: row.get(9)?,
        message_id: row.get(10)?,
        file_id: row.get(11)?,
        file_unique_id: row.get(12)?,
        file_size: row.get(13)?,
        mime_type: row.get(14)?,
        original_filename: row.get(15)?,
        created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(16)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

const EPISODE_COLUMNS: &str = "id, series_id, season_id, episode_number, name, overview,
    still_path, air_date, runtime, inbox_external_id, message_id, file_id, file_unique_id,
    file_size, mime_type, original_filename, created_at";

/// Attempt to create an episode, deferring to a prior import of the file.
///
/// Returns `Duplicate` with the existing row when `file_unique_id` has been
/// seen before, regardless of which series or season the earlier import
/// landed it in.
pub fn try_create_episode(
    conn: &Connection,
    series_id: SeriesId,
    season_id: SeasonId,
    new: &NewEpisode,
) -> Result<EpisodeInsert> {
    if new.file_unique_id.is_empty() {
        return Err(Error::validation("file_unique_id must not be empty"));
    }

    let id = EpisodeId::new();
    let now = Utc::now();

    let inserted = conn.execute(
        "INSERT INTO episodes (id, series_id, season_id, episode_number, name, overview,
                               still_path, air_date, runtime, inbox_external_id, message_id,
                               file_id, file_unique_id, file_size, mime_type,
                               original_filename, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            id.to_string(),
            series_id.to_string(),
            season_id.to_string(),
            new.episode_number,
            new.name,
            new.overview,
            new.still_path,
            new.air_date,
            new.runtime,
            new.inbox_external_id,
            new.message_id,
            new.file_id,
            new.file_unique_id,
            new.file_size,
            new.mime_type,
            new.original_filename,
            now.to_rfc3339(),
        ],
    );

    match inserted {
        Ok(_) => Ok(EpisodeInsert::Created(Episode {
            id,
            series_id,
            season_id,
            episode_number: new.episode_number,
            name: new.name.clone(),
            overview: new.overview.clone(),
            still_path: new.still_path.clone(),
            air_date: new.air_date.clone(),
            runtime: new.runtime,
            inbox_external_id: new.inbox_external_id,
            message_id: new.message_id,
            file_id: new.file_id.clone(),
            file_unique_id: new.file_unique_id.clone(),
            file_size: new.file_size,
            mime_type: new.mime_type.clone(),
            original_filename: new.original_filename.clone(),
            created_at: now,
        })),
        Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
            match get_episode_by_file_unique_id(conn, &new.file_unique_id)? {
                Some(existing) => Ok(EpisodeInsert::Duplicate(existing)),
                None => Err(Error::internal(format!(
                    "episode insert conflicted but file_unique_id {} is absent",
                    new.file_unique_id
                ))),
            }
        }
        Err(e) if e.to_string().contains("FOREIGN KEY constraint failed") => {
            Err(Error::not_found("season", season_id))
        }
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get an episode by ID.
pub fn get_episode(conn: &Connection, id: EpisodeId) -> Result<Episode> {
    conn.query_row(
        &format!("SELECT {} FROM episodes WHERE id = ?", EPISODE_COLUMNS),
        [id.to_string()],
        parse_episode_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found("episode", id),
        _ => Error::database(e.to_string()),
    })
}

/// Get an episode by the unique ID of the file that produced it.
pub fn get_episode_by_file_unique_id(
    conn: &Connection,
    file_unique_id: &str,
) -> Result<Option<Episode>> {
    match conn.query_row(
        &format!(
            "SELECT {} FROM episodes WHERE file_unique_id = ?",
            EPISODE_COLUMNS
        ),
        [file_unique_id],
        parse_episode_row,
    ) {
        Ok(episode) => Ok(Some(episode)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all episodes of a season ordered by episode number.
pub fn list_episodes_for_season(conn: &Connection, season_id: SeasonId) -> Result<Vec<Episode>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM episodes WHERE season_id = ? ORDER BY episode_number",
            EPISODE_COLUMNS
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let episodes = stmt
        .query_map([season_id.to_string()], parse_episode_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(episodes)
}

/// List all episodes of a series ordered by insertion time.
pub fn list_episodes_for_series(conn: &Connection, series_id: SeriesId) -> Result<Vec<Episode>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM episodes WHERE series_id = ? ORDER BY created_at",
            EPISODE_COLUMNS
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let episodes = stmt
        .query_map([series_id.to_string()], parse_episode_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(episodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSeason, NewSeries};
    use crate::pool::{init_memory_pool, PooledConnection};
    use crate::queries::collections::create_collection;
    use crate::queries::seasons::try_create_season;
    use crate::queries::series::try_create_series;

    fn setup_season() -> (PooledConnection, SeriesId, SeasonId) {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let collection = create_collection(&conn, "Default", None).unwrap();
        let series = try_create_series(
            &conn,
            collection.id,
            &NewSeries {
                tmdb_id: 42,
                name: "Show Name".to_string(),
                ..Default::default()
            },
        )
        .unwrap()
        .into_series();
        let season = try_create_season(
            &conn,
            series.id,
            &NewSeason {
                season_number: 2,
                name: "Season 2".to_string(),
                ..Default::default()
            },
        )
        .unwrap()
        .into_season();
        (conn, series.id, season.id)
    }

    fn episode_five(file_unique_id: &str) -> NewEpisode {
        NewEpisode {
            episode_number: 5,
            name: Some("The One That Happened".to_string()),
            inbox_external_id: 1001,
            message_id: 77,
            file_id: "file-abc".to_string(),
            file_unique_id: file_unique_id.to_string(),
            original_filename: Some("Show.Name.S02E05.1080p.mkv".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_try_create_episode() {
        let (conn, series_id, season_id) = setup_season();

        let result =
            try_create_episode(&conn, series_id, season_id, &episode_five("uniq-abc")).unwrap();
        let episode = match result {
            EpisodeInsert::Created(episode) => episode,
            EpisodeInsert::Duplicate(_) => panic!("first insert must create"),
        };
        assert_eq!(episode.episode_number, 5);
        assert_eq!(episode.file_unique_id, "uniq-abc");
    }

    #[test]
    fn test_duplicate_file_unique_id() {
        let (conn, series_id, season_id) = setup_season();

        let first = try_create_episode(&conn, series_id, season_id, &episode_five("uniq-abc"));
        assert!(matches!(first, Ok(EpisodeInsert::Created(_))));

        // Redelivery of the same file, even with different metadata.
        let mut redelivered = episode_five("uniq-abc");
        redelivered.episode_number = 6;
        let second = try_create_episode(&conn, series_id, season_id, &redelivered).unwrap();
        match second {
            EpisodeInsert::Duplicate(existing) => assert_eq!(existing.episode_number, 5),
            EpisodeInsert::Created(_) => panic!("duplicate file must not create a second row"),
        }

        let episodes = list_episodes_for_season(&conn, season_id).unwrap();
        assert_eq!(episodes.len(), 1);
    }

    #[test]
    fn test_empty_file_unique_id_rejected() {
        let (conn, series_id, season_id) = setup_season();

        let err = try_create_episode(&conn, series_id, season_id, &episode_five("")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_try_create_episode_unknown_season() {
        let (conn, series_id, _) = setup_season();

        let err = try_create_episode(&conn, series_id, SeasonId::new(), &episode_five("uniq-x"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_get_episode_by_file_unique_id() {
        let (conn, series_id, season_id) = setup_season();

        try_create_episode(&conn, series_id, season_id, &episode_five("uniq-abc")).unwrap();

        let found = get_episode_by_file_unique_id(&conn, "uniq-abc").unwrap();
        assert!(found.is_some());

        assert!(get_episode_by_file_unique_id(&conn, "uniq-zzz")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_episodes_for_season_ordering() {
        let (conn, series_id, season_id) = setup_season();

        let mut later = episode_five("uniq-later");
        later.episode_number = 9;
        try_create_episode(&conn, series_id, season_id, &later).unwrap();
        try_create_episode(&conn, series_id, season_id, &episode_five("uniq-abc")).unwrap();

        let episodes = list_episodes_for_season(&conn, season_id).unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].episode_number, 5);
        assert_eq!(episodes[1].episode_number, 9);
    }

    #[test]
    fn test_get_episode() {
        let (conn, series_id, season_id) = setup_season();

        let created =
            match try_create_episode(&conn, series_id, season_id, &episode_five("uniq-abc"))
                .unwrap()
            {
                EpisodeInsert::Created(episode) => episode,
                EpisodeInsert::Duplicate(_) => unreachable!(),
            };

        let fetched = get_episode(&conn, created.id).unwrap();
        assert_eq!(fetched, created);

        let missing = get_episode(&conn, EpisodeId::new());
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }
}
