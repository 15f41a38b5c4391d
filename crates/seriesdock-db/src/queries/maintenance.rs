//! Maintenance operations.
//!
//! The denormalized counters (`seasons.episode_count`,
//! `collections.series_count`, `collections.total_files`,
//! `inboxes.total_files`) are kept current by the ingest path, but drift is
//! always recoverable: a full recount rederives every counter from the
//! base tables. Safe to run at any time, any number of times.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use seriesdock_common::{Error, Result};

/// Row counts touched by a full recount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecountSummary {
    pub seasons: usize,
    pub collections: usize,
    pub inboxes: usize,
}

/// Recompute every denormalized counter from the base tables.
///
/// Runs in one transaction so readers never observe a half-recounted
/// catalog.
pub fn recount_all(conn: &Connection) -> Result<RecountSummary> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let seasons = tx
        .execute(
            "UPDATE seasons SET episode_count =
                 (SELECT COUNT(*) FROM episodes WHERE episodes.season_id = seasons.id)",
            [],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let collections = tx
        .execute(
            "UPDATE collections SET
                 series_count =
                     (SELECT COUNT(*) FROM series
                      WHERE series.collection_id = collections.id),
                 total_files =
                     (SELECT COUNT(*) FROM episodes
                      JOIN series ON episodes.series_id = series.id
                      WHERE series.collection_id = collections.id),
                 updated_at = ?",
            [Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let inboxes = tx
        .execute(
            "UPDATE inboxes SET total_files =
                 (SELECT COUNT(*) FROM episodes
                  WHERE episodes.inbox_external_id = inboxes.external_id)",
            [],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(RecountSummary {
        seasons,
        collections,
        inboxes,
    })
}
