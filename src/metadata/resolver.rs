//! Trait definition and types for external catalog resolvers.
//!
//! This module defines the [`MetadataResolver`] trait implemented by catalog
//! backends (TMDB in production, stubs and mocks in tests), along with the
//! narrow data types returned by resolver queries. Raw API response shapes
//! never cross this boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SelectionPolicy;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure modes of a resolver call.
///
/// The two variants demand different handling: [`ResolverError::NotFound`] is
/// a semantic answer (the catalog has no such entry) and terminates resolution
/// for the file, while [`ResolverError::Transient`] covers network trouble,
/// rate limiting, and server-side errors, where a later redelivery of the same
/// file may well succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    /// The external catalog has no entry matching the query.
    #[error("not found in external catalog")]
    NotFound,

    /// Transport failure, rate limiting, or server-side error; retryable.
    #[error("transient resolver failure: {0}")]
    Transient(String),
}

impl ResolverError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolverError::Transient(_))
    }
}

// ---------------------------------------------------------------------------
// Resolver result types
// ---------------------------------------------------------------------------

/// A single series returned from a catalog search, in the external service's
/// ranking order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesCandidate {
    /// Numeric TMDB series identifier.
    pub tmdb_id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    /// Premiere date as an ISO-8601 string (YYYY-MM-DD).
    pub first_air_date: Option<String>,
    /// Community rating (0.0 - 10.0).
    pub rating: Option<f64>,
}

/// Full metadata for a series, fetched once on the creating path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDetails {
    pub tmdb_id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub first_air_date: Option<String>,
    pub rating: Option<f64>,
}

/// Metadata for one season, including its per-episode details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonDetails {
    pub name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub air_date: Option<String>,
    pub episodes: Vec<EpisodeDetails>,
}

/// Per-episode metadata carried inside [`SeasonDetails`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeDetails {
    pub episode_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub still_path: Option<String>,
    pub air_date: Option<String>,
    /// Runtime in minutes.
    pub runtime: Option<i64>,
}

impl SeasonDetails {
    /// Find the detail entry for a specific episode number.
    pub fn episode(&self, episode_number: i64) -> Option<&EpisodeDetails> {
        self.episodes
            .iter()
            .find(|e| e.episode_number == episode_number)
    }
}

// Search results carry the full series record, so a candidate selected from
// a search can stand in for a details fetch on the creating path.
impl From<SeriesCandidate> for SeriesDetails {
    fn from(candidate: SeriesCandidate) -> Self {
        Self {
            tmdb_id: candidate.tmdb_id,
            name: candidate.name,
            overview: candidate.overview,
            poster_path: candidate.poster_path,
            backdrop_path: candidate.backdrop_path,
            first_air_date: candidate.first_air_date,
            rating: candidate.rating,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver trait
// ---------------------------------------------------------------------------

/// Async trait for resolving parsed filenames against an external catalog.
///
/// Implementations wrap a single external API and are shared across ingest
/// workers behind an `Arc`, so they must be `Send + Sync` and hold no
/// per-request mutable state.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Short, lowercase identifier for this resolver (e.g. `"tmdb"`).
    fn name(&self) -> &'static str;

    /// Returns `true` when the resolver has credentials and can serve requests.
    fn is_available(&self) -> bool;

    /// Search for series matching `title`, optionally constrained by `year`.
    ///
    /// Candidates come back in the external service's ranking order, best
    /// match first. A search with no hits is [`ResolverError::NotFound`].
    async fn search_series(
        &self,
        title: &str,
        year: Option<u16>,
    ) -> Result<Vec<SeriesCandidate>, ResolverError>;

    /// Fetch full metadata for the series identified by `tmdb_id`.
    async fn series_details(&self, tmdb_id: i64) -> Result<SeriesDetails, ResolverError>;

    /// Fetch metadata for one season of a series, episode list included.
    async fn season_details(
        &self,
        tmdb_id: i64,
        season_number: i64,
    ) -> Result<SeasonDetails, ResolverError>;
}

/// Pick one candidate from a ranked search result according to `policy`.
///
/// Ties under [`SelectionPolicy::HighestRated`] keep the earlier candidate,
/// preserving the external ranking as the tiebreak.
pub fn select_candidate<'a>(
    policy: SelectionPolicy,
    candidates: &'a [SeriesCandidate],
) -> Option<&'a SeriesCandidate> {
    match policy {
        SelectionPolicy::First => candidates.first(),
        SelectionPolicy::HighestRated => {
            let mut best: Option<&SeriesCandidate> = None;
            for candidate in candidates {
                let rating = candidate.rating.unwrap_or(0.0);
                match best {
                    Some(b) if rating <= b.rating.unwrap_or(0.0) => {}
                    _ => best = Some(candidate),
                }
            }
            best
        }
    }
}
