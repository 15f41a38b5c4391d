//! Bounded queue feeding the ingest workers.
//!
//! The [`IngestQueue`] accepts [`NewFileEvent`] submissions on a bounded
//! channel and drains them in a spawned dispatcher task. Each event runs in
//! its own task, gated by a semaphore so at most `workers` files resolve
//! against the external catalog at once. The dispatcher runs until all
//! [`IngestQueue`] handles are dropped, at which point the channel closes
//! and the task exits gracefully.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info};

use super::pipeline::{IngestPipeline, NewFileEvent};

/// Handle to the background ingest dispatcher.
pub struct IngestQueue {
    sender: mpsc::Sender<NewFileEvent>,
}

impl IngestQueue {
    /// Create the queue and spawn its dispatcher task.
    ///
    /// `workers` bounds how many files are in flight at once;
    /// `queue_capacity` bounds how many submitted events wait behind them.
    pub fn new(pipeline: Arc<IngestPipeline>, workers: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);

        tokio::spawn(dispatch(receiver, pipeline, workers));

        Self { sender }
    }

    /// Enqueue a file event for background processing.
    ///
    /// Applies backpressure when the queue is full. Returns an error only
    /// if the dispatcher has stopped (channel closed).
    pub async fn submit(&self, event: NewFileEvent) -> Result<()> {
        info!(
            inbox = event.inbox_id,
            file_unique_id = %event.file_unique_id,
            filename = %event.filename,
            "Queueing inbox file"
        );

        self.sender
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("Ingest queue is closed"))?;

        Ok(())
    }
}

/// Drain the channel, running each file's pipeline in its own task.
///
/// A failed run is logged and dropped; transports that care redeliver, and
/// the pipeline is idempotent under redelivery.
async fn dispatch(
    mut receiver: mpsc::Receiver<NewFileEvent>,
    pipeline: Arc<IngestPipeline>,
    workers: usize,
) {
    info!(workers, "Ingest dispatcher started");

    let semaphore = Arc::new(Semaphore::new(workers));

    while let Some(event) = receiver.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is never closed.
            Err(_) => break,
        };

        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let file_unique_id = event.file_unique_id.clone();
            if let Err(e) = pipeline.process_file(event).await {
                error!(
                    file_unique_id = %file_unique_id,
                    error = %e,
                    "Ingest run failed"
                );
            }
            drop(permit);
        });
    }

    info!("Ingest dispatcher stopped (channel closed)");
}
