//! Database query modules.
//!
//! This module organizes all database operations into logical groups:
//! - collections: Collection CRUD and denormalized counters
//! - inboxes: Inbox registration and lookup
//! - series: Series find-or-create and listing
//! - seasons: Season find-or-create, listing, and episode recounts
//! - episodes: Episode insertion (the duplicate gate) and listing
//! - pending: Pending upload lifecycle (pending/confirmed/rejected/expired)
//! - maintenance: Full counter recomputation

pub mod collections;
pub mod episodes;
pub mod inboxes;
pub mod maintenance;
pub mod pending;
pub mod seasons;
pub mod series;
