//! Internal Rust models matching the database schema.
//!
//! This module provides strongly-typed Rust structures that map to database tables.
//! All models use types from seriesdock-common where appropriate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use seriesdock_common::{CollectionId, EpisodeId, InboxId, PendingUploadId, SeasonId, SeriesId};

/// Target collection that imported series are filed under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub slug: String,
    pub owner_actor_id: Option<i64>,
    pub series_count: i64,
    pub total_files: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registered ingestion inbox. Files arriving through an inactive inbox
/// are ignored at the entry gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Inbox {
    pub id: InboxId,
    pub external_id: i64,
    pub name: String,
    pub collection_id: CollectionId,
    pub is_active: bool,
    pub total_files: i64,
    pub created_at: DateTime<Utc>,
}

/// Series model. Unique per (collection, tmdb_id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub id: SeriesId,
    pub collection_id: CollectionId,
    pub tmdb_id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub first_air_date: Option<String>,
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Season model. `episode_count` is denormalized and recomputed from the
/// episodes table whenever an episode lands in the season.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Season {
    pub id: SeasonId,
    pub series_id: SeriesId,
    pub season_number: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub air_date: Option<String>,
    pub episode_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Episode model with the file payload that produced it.
/// `file_unique_id` carries the UNIQUE constraint that makes ingestion
/// idempotent under redelivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    pub id: EpisodeId,
    pub series_id: SeriesId,
    pub season_id: SeasonId,
    pub episode_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
    pub runtime: Option<i64>,
    pub inbox_external_id: i64,
    pub message_id: i64,
    pub file_id: String,
    pub file_unique_id: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub original_filename: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a pending upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingState {
    Pending,
    Confirmed,
    Rejected,
    Expired,
}

impl PendingState {
    /// Terminal states keep their row but accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for PendingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for PendingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid pending state: {}", s)),
        }
    }
}

/// Upload held for operator confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingUpload {
    pub id: PendingUploadId,
    pub collection_id: CollectionId,
    pub file_unique_id: String,
    pub file_id: String,
    pub original_filename: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub inbox_external_id: i64,
    pub message_id: i64,
    pub origin_actor_id: Option<i64>,
    pub suggested_tmdb_id: Option<i64>,
    pub suggested_title: Option<String>,
    pub suggested_season: Option<i64>,
    pub suggested_episode: Option<i64>,
    pub state: PendingState,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new series row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewSeries {
    pub tmdb_id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub first_air_date: Option<String>,
    pub rating: Option<f64>,
}

/// Insert payload for a new season row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewSeason {
    pub season_number: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub air_date: Option<String>,
}

/// Insert payload for a new episode row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewEpisode {
    pub episode_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
    pub runtime: Option<i64>,
    pub inbox_external_id: i64,
    pub message_id: i64,
    pub file_id: String,
    pub file_unique_id: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub original_filename: Option<String>,
}

/// Insert payload for a new pending upload row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewPendingUpload {
    pub collection_id: CollectionId,
    pub file_unique_id: String,
    pub file_id: String,
    pub original_filename: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub inbox_external_id: i64,
    pub message_id: i64,
    pub origin_actor_id: Option<i64>,
    pub suggested_tmdb_id: Option<i64>,
    pub suggested_title: Option<String>,
    pub suggested_season: Option<i64>,
    pub suggested_episode: Option<i64>,
}
