//! File ingestion: the per-file pipeline and the queue that feeds it.

pub mod pipeline;
pub mod queue;

pub use pipeline::{IngestOutcome, IngestPipeline, NewFileEvent};
pub use queue::IngestQueue;
