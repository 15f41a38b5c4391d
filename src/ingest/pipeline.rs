//! The ingestion pipeline: one inbox file in, one typed outcome out.
//!
//! Processing for a file runs the stages in order: entry gate, duplicate
//! fast path, filename parse, catalog search, then either a direct import
//! (batch session active) or a confirmation request (no session). Every
//! stage failure is a per-file [`IngestOutcome`], so one bad file never
//! stops the worker draining the queue.
//!
//! The fast duplicate check is an optimization only; the uniqueness
//! constraint on `file_unique_id` at insert time is what actually
//! guarantees a single Episode per file under concurrent redelivery.

use std::future::Future;
use std::sync::Arc;

use seriesdock_common::{CollectionId, Error};
use seriesdock_db::models::{Inbox, NewEpisode, NewPendingUpload, PendingState};
use seriesdock_db::pool::{get_conn, DbPool};
use seriesdock_db::queries::{episodes, inboxes, pending};
use seriesdock_parser::{is_video_filename, parse_filename};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, CatalogStore, EpisodeInsert};
use crate::config::SelectionPolicy;
use crate::events::{CatalogEvent, EventBus};
use crate::metadata::resolver::{
    select_candidate, MetadataResolver, ResolverError, SeriesCandidate, SeriesDetails,
};
use crate::sessions::BatchSessions;

pub use seriesdock_db::models::{Episode, PendingUpload};

/// Normalized new-file event delivered by the inbox transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFileEvent {
    /// External identifier of the inbox the file arrived through.
    pub inbox_id: i64,
    /// Transport message carrying the file.
    pub message_id: i64,
    /// Platform-stable content identifier; the deduplication key.
    pub file_unique_id: String,
    /// Opaque handle for retrieving the file bytes later.
    pub file_handle: String,
    pub filename: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Actor that posted the file, when the transport knows it.
    #[serde(default)]
    pub origin_actor_id: Option<i64>,
}

/// Disposition of one processed file.
///
/// These are results, not errors: the event source decides whether an
/// outcome warrants logging, notification, or redelivery.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// A new Episode row was created.
    ImportedEpisode(Episode),
    /// The file's `file_unique_id` is already in the catalog.
    Duplicate(Episode),
    /// The file is held for an operator decision.
    PendingConfirmation(PendingUpload),
    /// The filename yielded no usable episode guess.
    Unparsed { filename: String },
    /// The external catalog has no series for the parsed title.
    NoMatch { title: String },
    /// The resolver failed transiently; nothing was written, so the event
    /// is safe to redeliver.
    ResolverFailure { reason: String },
    /// The event was dropped at the entry gate.
    Ignored { reason: String },
}

impl IngestOutcome {
    /// Stable lowercase label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ImportedEpisode(_) => "imported",
            Self::Duplicate(_) => "duplicate",
            Self::PendingConfirmation(_) => "pending_confirmation",
            Self::Unparsed { .. } => "unparsed",
            Self::NoMatch { .. } => "no_match",
            Self::ResolverFailure { .. } => "resolver_failure",
            Self::Ignored { .. } => "ignored",
        }
    }
}

/// Orchestrates the full ingestion flow for inbox files.
///
/// Shared across workers behind an `Arc`; holds no per-file state. No
/// database connection is held across a resolver call.
pub struct IngestPipeline {
    pool: DbPool,
    catalog: CatalogStore,
    resolver: Arc<dyn MetadataResolver>,
    sessions: BatchSessions,
    bus: Arc<EventBus>,
    selection_policy: SelectionPolicy,
}

impl IngestPipeline {
    pub fn new(
        pool: DbPool,
        resolver: Arc<dyn MetadataResolver>,
        sessions: BatchSessions,
        bus: Arc<EventBus>,
        selection_policy: SelectionPolicy,
    ) -> Self {
        Self {
            catalog: CatalogStore::new(pool.clone()),
            pool,
            resolver,
            sessions,
            bus,
            selection_policy,
        }
    }

    /// Run one file through the pipeline.
    ///
    /// Business conditions (duplicates, parse misses, resolver failures)
    /// come back as [`IngestOutcome`]; `Err` is reserved for storage-layer
    /// faults, which leave no partial writes and are safe to redeliver.
    pub async fn process_file(&self, event: NewFileEvent) -> Result<IngestOutcome, Error> {
        let outcome = self.run(&event).await?;

        info!(
            inbox = event.inbox_id,
            file_unique_id = %event.file_unique_id,
            filename = %event.filename,
            outcome = outcome.label(),
            "Processed inbox file"
        );

        Ok(outcome)
    }

    async fn run(&self, event: &NewFileEvent) -> Result<IngestOutcome, Error> {
        // Entry gate: only registered, active inboxes feed the catalog.
        let inbox = {
            let conn = get_conn(&self.pool)?;
            inboxes::get_inbox_by_external_id(&conn, event.inbox_id)?
        };
        let inbox = match inbox {
            Some(inbox) if inbox.is_active => inbox,
            Some(_) => {
                debug!(inbox = event.inbox_id, "Dropping file from deactivated inbox");
                return Ok(IngestOutcome::Ignored {
                    reason: "inbox is deactivated".to_string(),
                });
            }
            None => {
                debug!(inbox = event.inbox_id, "Dropping file from unregistered inbox");
                return Ok(IngestOutcome::Ignored {
                    reason: "inbox is not registered".to_string(),
                });
            }
        };

        if !looks_like_video(event) {
            debug!(
                inbox = event.inbox_id,
                filename = %event.filename,
                "Dropping non-video file"
            );
            return Ok(IngestOutcome::Ignored {
                reason: "not a video file".to_string(),
            });
        }

        self.bus.broadcast(CatalogEvent::file_received(
            event.inbox_id,
            event.message_id,
            event.filename.clone(),
        ));

        // Fast duplicate path, before any parsing or network work.
        {
            let conn = get_conn(&self.pool)?;
            if let Some(existing) =
                episodes::get_episode_by_file_unique_id(&conn, &event.file_unique_id)?
            {
                self.bus.broadcast(CatalogEvent::duplicate_skipped(
                    event.file_unique_id.clone(),
                    existing.id,
                ));
                return Ok(IngestOutcome::Duplicate(existing));
            }
        }

        let guess = parse_filename(&event.filename);
        let (title, episode_number) = match (guess.title.as_deref(), guess.episode) {
            (Some(title), Some(episode)) => (title.to_string(), i64::from(episode)),
            _ => {
                self.bus.broadcast(CatalogEvent::resolution_failed(
                    event.filename.clone(),
                    "filename has no usable episode guess",
                ));
                return Ok(IngestOutcome::Unparsed {
                    filename: event.filename.clone(),
                });
            }
        };
        let season_number = i64::from(guess.season.unwrap_or(1));
        let year = guess.year.and_then(|y| u16::try_from(y).ok());

        match self.sessions.active_collection(event.inbox_id) {
            Some(collection_id) => {
                self.import_in_batch(
                    event,
                    collection_id,
                    &title,
                    year,
                    season_number,
                    episode_number,
                )
                .await
            }
            None => {
                self.request_confirmation(
                    event,
                    &inbox,
                    &title,
                    year,
                    season_number,
                    episode_number,
                )
                .await
            }
        }
    }

    /// Batch mode: resolve and file the episode in the session's target
    /// collection without waiting for confirmation.
    async fn import_in_batch(
        &self,
        event: &NewFileEvent,
        collection_id: CollectionId,
        title: &str,
        year: Option<u16>,
        season_number: i64,
        episode_number: i64,
    ) -> Result<IngestOutcome, Error> {
        let candidate = match self.resolve_candidate(title, year, &event.filename).await {
            Ok(candidate) => candidate,
            Err(outcome) => return Ok(outcome),
        };

        let tmdb_id = candidate.tmdb_id;
        let details = SeriesDetails::from(candidate);
        let result = self
            .upsert_episode(
                collection_id,
                tmdb_id,
                || async move { Ok(details) },
                season_number,
                episode_number,
                self.episode_payload(event),
            )
            .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(CatalogError::Resolver(e)) => Ok(self.resolution_outcome(title, &event.filename, e)),
            Err(CatalogError::Storage(e)) => Err(e),
        }
    }

    /// Single-file mode: hold the file as a PendingUpload and ask the
    /// collection owner to confirm. Never writes Series/Season/Episode.
    async fn request_confirmation(
        &self,
        event: &NewFileEvent,
        inbox: &Inbox,
        title: &str,
        year: Option<u16>,
        season_number: i64,
        episode_number: i64,
    ) -> Result<IngestOutcome, Error> {
        let candidate = match self.resolve_candidate(title, year, &event.filename).await {
            Ok(candidate) => candidate,
            Err(outcome) => return Ok(outcome),
        };

        let new = NewPendingUpload {
            collection_id: inbox.collection_id,
            file_unique_id: event.file_unique_id.clone(),
            file_id: event.file_handle.clone(),
            original_filename: Some(event.filename.clone()),
            file_size: event.size,
            mime_type: event.mime_type.clone(),
            inbox_external_id: event.inbox_id,
            message_id: event.message_id,
            origin_actor_id: event.origin_actor_id,
            suggested_tmdb_id: Some(candidate.tmdb_id),
            suggested_title: Some(candidate.name.clone()),
            suggested_season: Some(season_number),
            suggested_episode: Some(episode_number),
        };

        let conn = get_conn(&self.pool)?;
        match pending::create_pending(&conn, &new)? {
            pending::PendingInsert::Created(row) => {
                info!(
                    pending = %row.id,
                    file_unique_id = %row.file_unique_id,
                    title = %candidate.name,
                    "Holding file for confirmation"
                );
                self.bus
                    .broadcast(CatalogEvent::confirmation_requested(row.clone()));
                Ok(IngestOutcome::PendingConfirmation(row))
            }
            // Redelivery while the request is still open; do not re-notify.
            pending::PendingInsert::AlreadyExists(row) if row.state == PendingState::Pending => {
                Ok(IngestOutcome::PendingConfirmation(row))
            }
            pending::PendingInsert::AlreadyExists(row) => Ok(IngestOutcome::Ignored {
                reason: format!("confirmation for this file was already {}", row.state),
            }),
        }
    }

    /// Search the catalog and apply the configured selection policy.
    ///
    /// A miss or failure is reported as the file's final outcome in the
    /// `Err` position so callers can return it directly.
    async fn resolve_candidate(
        &self,
        title: &str,
        year: Option<u16>,
        filename: &str,
    ) -> Result<SeriesCandidate, IngestOutcome> {
        let candidates = match self.resolver.search_series(title, year).await {
            Ok(candidates) => candidates,
            Err(e) => return Err(self.resolution_outcome(title, filename, e)),
        };

        match select_candidate(self.selection_policy, &candidates) {
            Some(candidate) => Ok(candidate.clone()),
            None => Err(self.resolution_outcome(title, filename, ResolverError::NotFound)),
        }
    }

    /// Map a resolver error to the file's outcome and publish it.
    fn resolution_outcome(
        &self,
        title: &str,
        filename: &str,
        error: ResolverError,
    ) -> IngestOutcome {
        match error {
            ResolverError::NotFound => {
                self.bus.broadcast(CatalogEvent::resolution_failed(
                    filename.to_string(),
                    format!("no catalog match for '{title}'"),
                ));
                IngestOutcome::NoMatch {
                    title: title.to_string(),
                }
            }
            ResolverError::Transient(reason) => {
                warn!(title, error = %reason, "Resolver failure, file can be redelivered");
                self.bus.broadcast(CatalogEvent::resolution_failed(
                    filename.to_string(),
                    reason.clone(),
                ));
                IngestOutcome::ResolverFailure { reason }
            }
        }
    }

    /// The find-or-create chain shared by batch imports and confirmed
    /// promotions: series, then season, then the episode insert behind the
    /// `file_unique_id` gate.
    pub(crate) async fn upsert_episode<F, Fut>(
        &self,
        collection_id: CollectionId,
        tmdb_id: i64,
        series_details: F,
        season_number: i64,
        episode_number: i64,
        mut new: NewEpisode,
    ) -> Result<IngestOutcome, CatalogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SeriesDetails, ResolverError>>,
    {
        let series = self
            .catalog
            .find_or_create_series(collection_id, tmdb_id, series_details)
            .await?;

        let lookup = self
            .catalog
            .find_or_create_season(series.id, season_number, || {
                self.resolver.season_details(tmdb_id, season_number)
            })
            .await?;

        new.episode_number = episode_number;
        if let Some(detail) = lookup
            .details
            .as_ref()
            .and_then(|d| d.episode(episode_number))
        {
            new.name = detail.name.clone();
            new.overview = detail.overview.clone();
            new.still_path = detail.still_path.clone();
            new.air_date = detail.air_date.clone();
            new.runtime = detail.runtime;
        }

        match self
            .catalog
            .create_episode(collection_id, series.id, lookup.season.id, &new)?
        {
            EpisodeInsert::Created(episode) => {
                info!(
                    episode = %episode.id,
                    series = %series.name,
                    season = season_number,
                    number = episode_number,
                    "Imported episode"
                );
                self.bus
                    .broadcast(CatalogEvent::episode_imported(episode.clone()));
                Ok(IngestOutcome::ImportedEpisode(episode))
            }
            EpisodeInsert::Duplicate(existing) => {
                self.bus.broadcast(CatalogEvent::duplicate_skipped(
                    new.file_unique_id.clone(),
                    existing.id,
                ));
                Ok(IngestOutcome::Duplicate(existing))
            }
        }
    }

    /// Storage coordinates for the episode row, taken verbatim from the
    /// inbound event.
    fn episode_payload(&self, event: &NewFileEvent) -> NewEpisode {
        NewEpisode {
            file_id: event.file_handle.clone(),
            file_unique_id: event.file_unique_id.clone(),
            inbox_external_id: event.inbox_id,
            message_id: event.message_id,
            file_size: event.size,
            mime_type: event.mime_type.clone(),
            original_filename: Some(event.filename.clone()),
            ..NewEpisode::default()
        }
    }
}

fn looks_like_video(event: &NewFileEvent) -> bool {
    is_video_filename(&event.filename)
        || event
            .mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with("video/"))
}
