//! seriesdock library crate.
//!
//! Ingests media files posted to channel-style inboxes, resolves them
//! against a metadata catalog, and maintains a hierarchical
//! series/season/episode library with duplicate suppression and a
//! confirmation workflow for files that arrive outside a batch session.

pub mod catalog;
pub mod config;
pub mod confirm;
pub mod events;
pub mod ingest;
pub mod metadata;
pub mod notifications;
pub mod server;
pub mod sessions;
