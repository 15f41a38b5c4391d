//! Outbound notification fanout.
//!
//! Operator-facing events (confirmation requests, decisions, imports) are
//! forwarded to the configured webhook targets. Delivery is fire-and-forget:
//! failures are logged, never propagated, and never affect the catalog.

pub mod webhook;

pub use webhook::WebhookClient;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::events::{CatalogEvent, EventBus};

/// Manages all configured notification targets.
pub struct NotificationManager {
    webhook_clients: Vec<WebhookClient>,
}

impl NotificationManager {
    pub fn new(config: &Config) -> Self {
        let webhook_clients = config
            .notifiers
            .iter()
            .filter(|n| n.enabled)
            .map(WebhookClient::new)
            .collect();

        Self { webhook_clients }
    }

    /// Whether an event is operator-facing and worth delivering.
    pub fn should_deliver(event: &CatalogEvent) -> bool {
        matches!(
            event,
            CatalogEvent::ConfirmationRequested { .. }
                | CatalogEvent::ConfirmationDecided { .. }
                | CatalogEvent::EpisodeImported { .. }
        )
    }

    /// Deliver one event to every target. Errors are logged, not propagated.
    pub async fn notify(&self, event: &CatalogEvent) {
        for client in &self.webhook_clients {
            match client.deliver(event).await {
                Ok(()) => {
                    debug!(target = client.name(), "Notification delivered");
                }
                Err(e) => {
                    warn!(target = client.name(), error = %e, "Notification delivery failed");
                }
            }
        }
    }

    /// Check if there are any enabled notification targets.
    pub fn has_targets(&self) -> bool {
        !self.webhook_clients.is_empty()
    }
}

/// Spawn the task that forwards bus events to the notification targets.
///
/// Exits when the bus closes. Lagging behind the bus drops events rather
/// than blocking catalog work.
pub fn start_notification_task(
    bus: Arc<EventBus>,
    manager: Arc<NotificationManager>,
) -> JoinHandle<()> {
    // Subscribe before spawning so no event published after this call is
    // missed.
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        if !manager.has_targets() {
            return;
        }
        info!("Notification forwarder started");

        loop {
            match rx.recv().await {
                Ok(event) if NotificationManager::should_deliver(&event) => {
                    manager.notify(&event).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification forwarder lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
