use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use seriesdock_common::{CollectionId, EpisodeId, PendingUploadId};
use seriesdock_db::models::{Episode, PendingState, PendingUpload};
use std::collections::VecDeque;
use tokio::sync::broadcast;

const MAX_RECENT_EVENTS: usize = 100;

/// Catalog-wide event for SSE broadcasting.
///
/// Every mutation of the catalog publishes one of these so connected
/// clients can follow imports, confirmations, and batch state live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CatalogEvent {
    /// A new file event has been accepted and queued for processing.
    FileReceived {
        inbox_external_id: i64,
        message_id: i64,
        original_filename: String,
    },
    /// A file has been resolved and imported as a catalog episode.
    EpisodeImported {
        #[serde(flatten)]
        episode: Episode,
    },
    /// A file was already cataloged; the redelivery was skipped.
    DuplicateSkipped {
        file_unique_id: String,
        episode_id: EpisodeId,
    },
    /// A file could not be resolved into the catalog.
    ResolutionFailed {
        original_filename: String,
        reason: String,
    },
    /// A file is parked awaiting a confirmation decision.
    ConfirmationRequested {
        #[serde(flatten)]
        pending: PendingUpload,
    },
    /// A pending upload reached a terminal state.
    ConfirmationDecided {
        pending_id: PendingUploadId,
        decision: PendingState,
        episode_id: Option<EpisodeId>,
    },
    /// A batch session is now routing an inbox into a collection.
    BatchStarted {
        inbox_external_id: i64,
        collection_id: CollectionId,
    },
    /// A batch session has ended (stopped or expired).
    BatchStopped { inbox_external_id: i64 },
}

impl CatalogEvent {
    /// Create a FileReceived event.
    pub fn file_received(
        inbox_external_id: i64,
        message_id: i64,
        original_filename: String,
    ) -> Self {
        CatalogEvent::FileReceived {
            inbox_external_id,
            message_id,
            original_filename,
        }
    }

    /// Create an EpisodeImported event.
    pub fn episode_imported(episode: Episode) -> Self {
        CatalogEvent::EpisodeImported { episode }
    }

    /// Create a DuplicateSkipped event.
    pub fn duplicate_skipped(file_unique_id: String, episode_id: EpisodeId) -> Self {
        CatalogEvent::DuplicateSkipped {
            file_unique_id,
            episode_id,
        }
    }

    /// Create a ResolutionFailed event.
    pub fn resolution_failed(original_filename: String, reason: impl Into<String>) -> Self {
        CatalogEvent::ResolutionFailed {
            original_filename,
            reason: reason.into(),
        }
    }

    /// Create a ConfirmationRequested event.
    pub fn confirmation_requested(pending: PendingUpload) -> Self {
        CatalogEvent::ConfirmationRequested { pending }
    }

    /// Create a ConfirmationDecided event.
    pub fn confirmation_decided(
        pending_id: PendingUploadId,
        decision: PendingState,
        episode_id: Option<EpisodeId>,
    ) -> Self {
        CatalogEvent::ConfirmationDecided {
            pending_id,
            decision,
            episode_id,
        }
    }

    /// Create a BatchStarted event.
    pub fn batch_started(inbox_external_id: i64, collection_id: CollectionId) -> Self {
        CatalogEvent::BatchStarted {
            inbox_external_id,
            collection_id,
        }
    }

    /// Create a BatchStopped event.
    pub fn batch_stopped(inbox_external_id: i64) -> Self {
        CatalogEvent::BatchStopped { inbox_external_id }
    }
}

/// Broadcast bus with a short replay window for late subscribers.
pub struct EventBus {
    event_tx: broadcast::Sender<CatalogEvent>,
    recent: RwLock<VecDeque<CatalogEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            event_tx,
            recent: RwLock::new(VecDeque::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event to all subscribers and record it in the replay window.
    pub fn broadcast(&self, event: CatalogEvent) {
        {
            let mut recent = self.recent.write();
            recent.push_front(event.clone());
            while recent.len() > MAX_RECENT_EVENTS {
                recent.pop_back();
            }
        }

        if self.event_tx.send(event).is_err() {
            tracing::debug!("No subscribers for event");
        }
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CatalogEvent> {
        let recent = self.recent.read();
        recent.iter().take(limit).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
