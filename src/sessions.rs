//! Batch session tracking for inbox sources.
//!
//! A batch session routes every file an inbox receives straight into a target
//! collection without per-file confirmation. Sessions are advisory: they only
//! change how the next file is handled, never whether imports are safe. Each
//! session carries an inactivity deadline that every ingested file renews;
//! once the deadline passes the session is observed as absent and the inbox
//! reverts to single-file confirmation mode.
//!
//! Deadlines use `tokio::time::Instant`, so tests drive expiry with the
//! paused test clock instead of real sleeps.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use seriesdock_common::CollectionId;
use tokio::time::Instant;

use crate::events::{CatalogEvent, EventBus};

/// An active batch session for one inbox.
#[derive(Debug, Clone)]
pub struct BatchSession {
    pub collection_id: CollectionId,
    pub started_at: Instant,
    pub expires_at: Instant,
}

/// Thread-safe store of active batch sessions, keyed by inbox external ID.
///
/// At most one session exists per inbox; starting a new one replaces the
/// previous target.
#[derive(Clone)]
pub struct BatchSessions {
    sessions: Arc<DashMap<i64, BatchSession>>,
    /// Inactivity window after which a session is considered expired.
    ttl: Duration,
}

impl BatchSessions {
    /// Create a new session store.
    ///
    /// # Arguments
    /// * `ttl_secs` - Seconds of inactivity before a session expires.
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Start a batch session routing `inbox_external_id` into a collection.
    ///
    /// Replaces any existing session for the inbox.
    pub fn start(&self, inbox_external_id: i64, collection_id: CollectionId) {
        let now = Instant::now();
        let session = BatchSession {
            collection_id,
            started_at: now,
            expires_at: now + self.ttl,
        };

        self.sessions.insert(inbox_external_id, session);
        tracing::info!(
            inbox = inbox_external_id,
            collection = %collection_id,
            "Started batch session"
        );
    }

    /// Stop the batch session for an inbox.
    ///
    /// # Returns
    /// `true` if a session was active.
    pub fn stop(&self, inbox_external_id: i64) -> bool {
        if let Some((_, session)) = self.sessions.remove(&inbox_external_id) {
            tracing::info!(
                inbox = inbox_external_id,
                collection = %session.collection_id,
                active_secs = session.started_at.elapsed().as_secs(),
                "Stopped batch session"
            );
            true
        } else {
            false
        }
    }

    /// Target collection for an inbox, if a live session exists.
    ///
    /// A hit renews the inactivity deadline. An entry past its deadline is
    /// reported as absent; the cleanup task removes it.
    pub fn active_collection(&self, inbox_external_id: i64) -> Option<CollectionId> {
        let now = Instant::now();
        let mut session = self.sessions.get_mut(&inbox_external_id)?;
        if session.expires_at <= now {
            return None;
        }
        session.expires_at = now + self.ttl;
        Some(session.collection_id)
    }

    /// Remove sessions past their inactivity deadline.
    ///
    /// # Returns
    /// The inbox external IDs whose sessions were removed.
    pub fn cleanup_expired(&self) -> Vec<i64> {
        let now = Instant::now();
        let mut expired = Vec::new();

        self.sessions.retain(|inbox_external_id, session| {
            if session.expires_at <= now {
                tracing::info!(
                    inbox = inbox_external_id,
                    collection = %session.collection_id,
                    "Batch session expired"
                );
                expired.push(*inbox_external_id);
                false
            } else {
                true
            }
        });

        expired
    }

    /// Number of tracked sessions, expired entries included until swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for BatchSessions {
    fn default() -> Self {
        // Default: 15 minute inactivity TTL
        Self::new(900)
    }
}

/// Start a background task that sweeps expired sessions and announces each
/// expiry as a `batch_stopped` event.
///
/// # Returns
/// A join handle for the background task.
pub fn start_cleanup_task(
    sessions: BatchSessions,
    bus: Arc<EventBus>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            for inbox_external_id in sessions.cleanup_expired() {
                bus.broadcast(CatalogEvent::batch_stopped(inbox_external_id));
            }
        }
    })
}
