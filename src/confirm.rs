//! Confirmation workflow for files held in single-file mode.
//!
//! A PendingUpload moves from `pending` to exactly one terminal state.
//! Applying a decision to an already-terminal row is a no-op that reports
//! the prior state, so duplicate button presses and replayed actions are
//! harmless. Promotion on confirm runs the same catalog upsert path as a
//! batch import, behind the same `file_unique_id` gate: confirming a file
//! that was imported in the meantime reports the duplicate and still
//! terminates the row as confirmed.
//!
//! A failed promotion (resolver outage, vanished catalog entry) leaves the
//! row pending so the operator can retry; the sweep expires it if nobody
//! does.

use std::sync::Arc;

use chrono::Utc;
use seriesdock_common::{CollectionId, Error, PendingUploadId};
use seriesdock_db::models::{NewEpisode, PendingState, PendingUpload};
use seriesdock_db::pool::{get_conn, DbPool};
use seriesdock_db::queries::{collections, pending};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::catalog::CatalogError;
use crate::config::ConfirmationConfig;
use crate::events::{CatalogEvent, EventBus};
use crate::ingest::{IngestOutcome, IngestPipeline};
use crate::metadata::resolver::MetadataResolver;

/// Result of applying a confirmation action.
#[derive(Debug, Clone)]
pub struct Decision {
    /// The pending row after the action.
    pub pending: PendingUpload,
    /// Whether this call performed the state transition.
    pub applied: bool,
    /// The catalog outcome, present when a confirm ran the import.
    pub import: Option<IngestOutcome>,
}

/// Applies operator decisions to pending uploads.
pub struct ConfirmationService {
    pool: DbPool,
    pipeline: Arc<IngestPipeline>,
    resolver: Arc<dyn MetadataResolver>,
    bus: Arc<EventBus>,
}

impl ConfirmationService {
    pub fn new(
        pool: DbPool,
        pipeline: Arc<IngestPipeline>,
        resolver: Arc<dyn MetadataResolver>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            pool,
            pipeline,
            resolver,
            bus,
        }
    }

    /// Confirm a pending upload, promoting it into the catalog.
    ///
    /// `collection_override` redirects the import away from the inbox's
    /// bound collection. The import runs before the state transition: a
    /// transient failure leaves the row pending and retryable, while a
    /// successful import (or a duplicate hit) terminates it as confirmed.
    pub async fn confirm(
        &self,
        pending_id: PendingUploadId,
        collection_override: Option<CollectionId>,
    ) -> Result<Decision, Error> {
        let row = {
            let conn = get_conn(&self.pool)?;
            pending::get_pending(&conn, pending_id)?
        };
        if row.state.is_terminal() {
            return Ok(Decision {
                pending: row,
                applied: false,
                import: None,
            });
        }

        let collection_id = match collection_override {
            Some(id) => {
                let conn = get_conn(&self.pool)?;
                collections::get_collection(&conn, id)?.id
            }
            None => row.collection_id,
        };

        let import = match self.promote(&row, collection_id).await {
            Ok(outcome) => outcome,
            Err(CatalogError::Resolver(e)) => {
                warn!(
                    pending = %row.id,
                    error = %e,
                    "Promotion failed, leaving upload pending"
                );
                let import = if e.is_transient() {
                    IngestOutcome::ResolverFailure {
                        reason: e.to_string(),
                    }
                } else {
                    IngestOutcome::NoMatch {
                        title: row.suggested_title.clone().unwrap_or_default(),
                    }
                };
                return Ok(Decision {
                    pending: row,
                    applied: false,
                    import: Some(import),
                });
            }
            Err(CatalogError::Storage(e)) => return Err(e),
        };

        let episode_id = match &import {
            IngestOutcome::ImportedEpisode(episode) | IngestOutcome::Duplicate(episode) => {
                Some(episode.id)
            }
            _ => None,
        };

        let conn = get_conn(&self.pool)?;
        let applied = pending::mark_decided(&conn, row.id, PendingState::Confirmed)?;
        let pending = pending::get_pending(&conn, row.id)?;
        if applied {
            info!(
                pending = %pending.id,
                file_unique_id = %pending.file_unique_id,
                outcome = import.label(),
                "Pending upload confirmed"
            );
            self.bus.broadcast(CatalogEvent::confirmation_decided(
                pending.id,
                PendingState::Confirmed,
                episode_id,
            ));
        }

        Ok(Decision {
            pending,
            applied,
            import: Some(import),
        })
    }

    /// Reject a pending upload, discarding the file.
    pub async fn reject(&self, pending_id: PendingUploadId) -> Result<Decision, Error> {
        let conn = get_conn(&self.pool)?;
        let row = pending::get_pending(&conn, pending_id)?;
        if row.state.is_terminal() {
            return Ok(Decision {
                pending: row,
                applied: false,
                import: None,
            });
        }

        let applied = pending::mark_decided(&conn, row.id, PendingState::Rejected)?;
        let pending = pending::get_pending(&conn, row.id)?;
        if applied {
            info!(
                pending = %pending.id,
                file_unique_id = %pending.file_unique_id,
                "Pending upload rejected"
            );
            self.bus.broadcast(CatalogEvent::confirmation_decided(
                pending.id,
                PendingState::Rejected,
                None,
            ));
        }

        Ok(Decision {
            pending,
            applied,
            import: None,
        })
    }

    /// Run the stored suggestion through the shared import path.
    async fn promote(
        &self,
        row: &PendingUpload,
        collection_id: CollectionId,
    ) -> Result<IngestOutcome, CatalogError> {
        let tmdb_id = row
            .suggested_tmdb_id
            .ok_or_else(|| Error::validation("pending upload has no series suggestion"))?;
        let episode_number = row
            .suggested_episode
            .ok_or_else(|| Error::validation("pending upload has no episode suggestion"))?;
        let season_number = row.suggested_season.unwrap_or(1);

        let resolver = self.resolver.clone();
        self.pipeline
            .upsert_episode(
                collection_id,
                tmdb_id,
                || async move { resolver.series_details(tmdb_id).await },
                season_number,
                episode_number,
                NewEpisode {
                    file_id: row.file_id.clone(),
                    file_unique_id: row.file_unique_id.clone(),
                    inbox_external_id: row.inbox_external_id,
                    message_id: row.message_id,
                    file_size: row.file_size,
                    mime_type: row.mime_type.clone(),
                    original_filename: row.original_filename.clone(),
                    ..NewEpisode::default()
                },
            )
            .await
    }
}

/// Counts from one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub expired: usize,
    pub purged: usize,
}

/// Expire overdue pending uploads and purge old terminal rows.
pub fn sweep_once(pool: &DbPool, config: &ConfirmationConfig) -> Result<SweepSummary, Error> {
    let conn = get_conn(pool)?;

    let pending_cutoff = Utc::now() - chrono::Duration::seconds(config.pending_ttl_secs as i64);
    let expired = pending::expire_pending_before(&conn, pending_cutoff)?;

    let purge_cutoff = Utc::now() - chrono::Duration::seconds(config.purge_after_secs as i64);
    let purged = pending::purge_terminal_before(&conn, purge_cutoff)?;

    Ok(SweepSummary { expired, purged })
}

/// Spawn the periodic pending-upload sweeper.
pub fn start_sweep_task(pool: DbPool, config: ConfirmationConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.sweep_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match sweep_once(&pool, &config) {
                Ok(summary) if summary.expired > 0 || summary.purged > 0 => {
                    info!(
                        expired = summary.expired,
                        purged = summary.purged,
                        "Swept pending uploads"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Pending upload sweep failed"),
            }
        }
    })
}
