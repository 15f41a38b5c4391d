//! Idempotent catalog upsert operations.
//!
//! [`CatalogStore`] sits between the ingest pipeline and the database crate.
//! Every operation here is safe under concurrent redelivery: find-or-create
//! calls lean on the storage-level uniqueness constraints and re-read on
//! conflict, and episode creation is gated solely by the `file_unique_id`
//! constraint.
//!
//! Metadata fetches are passed in as closures and invoked only on the
//! creating path, so a file landing in an existing series or season costs no
//! external calls. No database connection is held across those fetches.

use std::future::Future;

use seriesdock_common::{CollectionId, SeasonId, SeriesId};
use seriesdock_db::models::{NewEpisode, NewSeason, NewSeries, Season, Series};
use seriesdock_db::pool::{get_conn, DbPool};
use seriesdock_db::queries::{collections, episodes, inboxes, seasons, series};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metadata::resolver::{ResolverError, SeasonDetails, SeriesDetails};

pub use seriesdock_db::queries::episodes::EpisodeInsert;

/// Failure modes of a catalog upsert.
///
/// Resolver and storage failures propagate separately because the pipeline
/// treats them differently: resolver errors decide the file's outcome, while
/// storage errors are unexpected and fail the run.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Storage(#[from] seriesdock_common::Error),
}

/// Result of a season find-or-create.
///
/// `details` is populated only when this call fetched season metadata (the
/// creating path), so the caller can enrich the episode it is about to
/// create without a second external call.
#[derive(Debug)]
pub struct SeasonLookup {
    pub season: Season,
    pub details: Option<SeasonDetails>,
}

/// Catalog upsert service shared by the ingest pipeline and the
/// confirmation workflow.
#[derive(Clone)]
pub struct CatalogStore {
    pool: DbPool,
}

impl CatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find the series for `(collection_id, tmdb_id)` or create it from
    /// freshly fetched details.
    ///
    /// `details` runs only when no series exists yet. Two concurrent
    /// first-sight imports may both fetch, but the uniqueness constraint on
    /// `(collection_id, tmdb_id)` guarantees a single row; the loser of the
    /// race gets the winner's row back.
    pub async fn find_or_create_series<F, Fut>(
        &self,
        collection_id: CollectionId,
        tmdb_id: i64,
        details: F,
    ) -> Result<Series, CatalogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SeriesDetails, ResolverError>>,
    {
        {
            let conn = get_conn(&self.pool)?;
            if let Some(existing) = series::get_series_by_tmdb_id(&conn, collection_id, tmdb_id)? {
                return Ok(existing);
            }
        }

        let fetched = details().await?;
        let new = NewSeries {
            tmdb_id,
            name: fetched.name,
            overview: fetched.overview,
            poster_path: fetched.poster_path,
            backdrop_path: fetched.backdrop_path,
            first_air_date: fetched.first_air_date,
            rating: fetched.rating,
        };

        let conn = get_conn(&self.pool)?;
        match series::try_create_series(&conn, collection_id, &new)? {
            series::SeriesInsert::Created(created) => {
                collections::increment_series_count(&conn, collection_id)?;
                info!(
                    series = %created.id,
                    tmdb_id,
                    name = %created.name,
                    "Created series"
                );
                Ok(created)
            }
            series::SeriesInsert::AlreadyExists(existing) => Ok(existing),
        }
    }

    /// Find the season for `(series_id, season_number)` or create it.
    ///
    /// When `details` fails the season is still created as a bare
    /// `"Season {n}"` shell so the import can proceed; metadata for it can be
    /// repaired later. The fetched details ride along in the returned
    /// [`SeasonLookup`] for episode enrichment.
    pub async fn find_or_create_season<F, Fut>(
        &self,
        series_id: SeriesId,
        season_number: i64,
        details: F,
    ) -> Result<SeasonLookup, CatalogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SeasonDetails, ResolverError>>,
    {
        {
            let conn = get_conn(&self.pool)?;
            if let Some(existing) = seasons::get_season_by_number(&conn, series_id, season_number)?
            {
                return Ok(SeasonLookup {
                    season: existing,
                    details: None,
                });
            }
        }

        let fetched = match details().await {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(
                    series = %series_id,
                    season_number,
                    error = %e,
                    "Season details unavailable, creating shell season"
                );
                None
            }
        };

        let new = match &fetched {
            Some(d) => NewSeason {
                season_number,
                name: d
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Season {season_number}")),
                overview: d.overview.clone(),
                poster_path: d.poster_path.clone(),
                air_date: d.air_date.clone(),
            },
            None => NewSeason {
                season_number,
                name: format!("Season {season_number}"),
                ..NewSeason::default()
            },
        };

        let conn = get_conn(&self.pool)?;
        match seasons::try_create_season(&conn, series_id, &new)? {
            seasons::SeasonInsert::Created(created) => {
                info!(season = %created.id, season_number, "Created season");
                Ok(SeasonLookup {
                    season: created,
                    details: fetched,
                })
            }
            seasons::SeasonInsert::AlreadyExists(existing) => Ok(SeasonLookup {
                season: existing,
                details: fetched,
            }),
        }
    }

    /// Insert an episode behind the `file_unique_id` gate and maintain the
    /// denormalized counters.
    ///
    /// Counter updates commit atomically with the insert. The season's
    /// `episode_count` is recomputed from the episodes table rather than
    /// incremented, so it stays exact no matter how the insert raced.
    pub fn create_episode(
        &self,
        collection_id: CollectionId,
        series_id: SeriesId,
        season_id: SeasonId,
        new: &NewEpisode,
    ) -> Result<EpisodeInsert, CatalogError> {
        let conn = get_conn(&self.pool)?;
        let tx = conn
            .unchecked_transaction()
            .map_err(seriesdock_common::Error::database)?;

        let insert = episodes::try_create_episode(&tx, series_id, season_id, new)?;
        if let EpisodeInsert::Created(ref episode) = insert {
            let episode_count = seasons::recount_episodes(&tx, season_id)?;
            collections::increment_total_files(&tx, collection_id)?;
            inboxes::increment_inbox_files(&tx, new.inbox_external_id)?;
            debug!(
                episode = %episode.id,
                episode_count,
                "Episode created, counters updated"
            );
        }

        tx.commit().map_err(seriesdock_common::Error::database)?;
        Ok(insert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::resolver::EpisodeDetails;
    use assert_matches::assert_matches;
    use seriesdock_db::models::{Collection, Inbox};
    use seriesdock_db::pool::init_memory_pool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn series_details(tmdb_id: i64, name: &str) -> SeriesDetails {
        SeriesDetails {
            tmdb_id,
            name: name.to_string(),
            overview: Some("A show.".to_string()),
            poster_path: None,
            backdrop_path: None,
            first_air_date: Some("2022-02-18".to_string()),
            rating: Some(8.4),
        }
    }

    fn season_details(name: &str) -> SeasonDetails {
        SeasonDetails {
            name: Some(name.to_string()),
            overview: None,
            poster_path: None,
            air_date: None,
            episodes: vec![EpisodeDetails {
                episode_number: 5,
                name: Some("Fifth".to_string()),
                overview: None,
                still_path: None,
                air_date: None,
                runtime: Some(41),
            }],
        }
    }

    fn new_episode(file_unique_id: &str, episode_number: i64, inbox: &Inbox) -> NewEpisode {
        NewEpisode {
            episode_number,
            file_id: format!("file-{file_unique_id}"),
            file_unique_id: file_unique_id.to_string(),
            inbox_external_id: inbox.external_id,
            message_id: 7,
            ..NewEpisode::default()
        }
    }

    fn fixtures(pool: &DbPool) -> (Collection, Inbox) {
        let conn = pool.get().unwrap();
        let collection = collections::create_collection(&conn, "Default", None).unwrap();
        let inbox = inboxes::register_inbox(&conn, -1001, "Drops", collection.id).unwrap();
        (collection, inbox)
    }

    #[tokio::test]
    async fn test_series_details_fetched_only_on_creation() {
        let pool = init_memory_pool().unwrap();
        let (collection, _) = fixtures(&pool);
        let store = CatalogStore::new(pool);
        let calls = AtomicUsize::new(0);

        let created = store
            .find_or_create_series(collection.id, 42, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(series_details(42, "Show Name"))
            })
            .await
            .unwrap();

        let found = store
            .find_or_create_series(collection.id, 42, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(series_details(42, "Show Name"))
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(created.id, found.id);
        assert_eq!(found.name, "Show Name");
    }

    #[tokio::test]
    async fn test_series_creation_bumps_collection_count() {
        let pool = init_memory_pool().unwrap();
        let (collection, _) = fixtures(&pool);
        let store = CatalogStore::new(pool.clone());

        store
            .find_or_create_series(collection.id, 42, || async {
                Ok(series_details(42, "Show Name"))
            })
            .await
            .unwrap();
        store
            .find_or_create_series(collection.id, 42, || async {
                Ok(series_details(42, "Show Name"))
            })
            .await
            .unwrap();

        let conn = pool.get().unwrap();
        let refreshed = collections::get_collection(&conn, collection.id).unwrap();
        assert_eq!(refreshed.series_count, 1);
    }

    #[tokio::test]
    async fn test_resolver_failure_creates_no_series() {
        let pool = init_memory_pool().unwrap();
        let (collection, _) = fixtures(&pool);
        let store = CatalogStore::new(pool.clone());

        let err = store
            .find_or_create_series(collection.id, 42, || async {
                Err(ResolverError::Transient("connection reset".to_string()))
            })
            .await
            .unwrap_err();
        assert_matches!(err, CatalogError::Resolver(ResolverError::Transient(_)));

        let conn = pool.get().unwrap();
        assert!(series::get_series_by_tmdb_id(&conn, collection.id, 42)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_season_shell_created_when_details_fail() {
        let pool = init_memory_pool().unwrap();
        let (collection, _) = fixtures(&pool);
        let store = CatalogStore::new(pool);

        let show = store
            .find_or_create_series(collection.id, 42, || async {
                Ok(series_details(42, "Show Name"))
            })
            .await
            .unwrap();

        let lookup = store
            .find_or_create_season(show.id, 2, || async {
                Err(ResolverError::Transient("timeout".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(lookup.season.name, "Season 2");
        assert_eq!(lookup.season.season_number, 2);
        assert!(lookup.details.is_none());
    }

    #[tokio::test]
    async fn test_season_details_ride_along_on_creation() {
        let pool = init_memory_pool().unwrap();
        let (collection, _) = fixtures(&pool);
        let store = CatalogStore::new(pool);

        let show = store
            .find_or_create_series(collection.id, 42, || async {
                Ok(series_details(42, "Show Name"))
            })
            .await
            .unwrap();

        let created = store
            .find_or_create_season(show.id, 2, || async { Ok(season_details("Season Two")) })
            .await
            .unwrap();
        assert_eq!(created.season.name, "Season Two");
        let details = created.details.expect("creating path carries details");
        assert_eq!(details.episode(5).unwrap().runtime, Some(41));

        // Existing season: no fetch, no details
        let found = store
            .find_or_create_season(show.id, 2, || async {
                panic!("details must not be fetched for an existing season")
            })
            .await
            .unwrap();
        assert_eq!(found.season.id, created.season.id);
        assert!(found.details.is_none());
    }

    #[tokio::test]
    async fn test_episode_creation_maintains_counters() {
        let pool = init_memory_pool().unwrap();
        let (collection, inbox) = fixtures(&pool);
        let store = CatalogStore::new(pool.clone());

        let show = store
            .find_or_create_series(collection.id, 42, || async {
                Ok(series_details(42, "Show Name"))
            })
            .await
            .unwrap();
        let season = store
            .find_or_create_season(show.id, 2, || async { Ok(season_details("Season 2")) })
            .await
            .unwrap()
            .season;

        let first = store
            .create_episode(
                collection.id,
                show.id,
                season.id,
                &new_episode("uniq-1", 5, &inbox),
            )
            .unwrap();
        assert_matches!(first, EpisodeInsert::Created(_));

        let second = store
            .create_episode(
                collection.id,
                show.id,
                season.id,
                &new_episode("uniq-2", 6, &inbox),
            )
            .unwrap();
        assert_matches!(second, EpisodeInsert::Created(_));

        let conn = pool.get().unwrap();
        let season_row = seasons::get_season(&conn, season.id).unwrap();
        assert_eq!(season_row.episode_count, 2);
        let collection_row = collections::get_collection(&conn, collection.id).unwrap();
        assert_eq!(collection_row.total_files, 2);
        let inbox_row = inboxes::get_inbox_by_external_id(&conn, inbox.external_id)
            .unwrap()
            .unwrap();
        assert_eq!(inbox_row.total_files, 2);
    }

    #[tokio::test]
    async fn test_duplicate_episode_leaves_counters_alone() {
        let pool = init_memory_pool().unwrap();
        let (collection, inbox) = fixtures(&pool);
        let store = CatalogStore::new(pool.clone());

        let show = store
            .find_or_create_series(collection.id, 42, || async {
                Ok(series_details(42, "Show Name"))
            })
            .await
            .unwrap();
        let season = store
            .find_or_create_season(show.id, 2, || async { Ok(season_details("Season 2")) })
            .await
            .unwrap()
            .season;

        let first = store
            .create_episode(
                collection.id,
                show.id,
                season.id,
                &new_episode("uniq-1", 5, &inbox),
            )
            .unwrap();
        let original = match first {
            EpisodeInsert::Created(e) => e,
            other => panic!("expected Created, got {:?}", other),
        };

        let replay = store
            .create_episode(
                collection.id,
                show.id,
                season.id,
                &new_episode("uniq-1", 5, &inbox),
            )
            .unwrap();
        match replay {
            EpisodeInsert::Duplicate(existing) => assert_eq!(existing.id, original.id),
            other => panic!("expected Duplicate, got {:?}", other),
        }

        let conn = pool.get().unwrap();
        assert_eq!(
            seasons::get_season(&conn, season.id).unwrap().episode_count,
            1
        );
        assert_eq!(
            collections::get_collection(&conn, collection.id)
                .unwrap()
                .total_files,
            1
        );
    }
}
