//! Metadata resolution against the external series catalog.
//!
//! This module defines the [`MetadataResolver`] trait that catalog backends
//! implement, plus the production TMDB adapter.
//!
//! # Module layout
//!
//! - [`resolver`] -- Trait definition, result types, and candidate selection.
//! - [`tmdb`] -- TMDB v3 adapter with rate limiting and retry logic.

pub mod resolver;
pub mod tmdb;

pub use resolver::{
    select_candidate, EpisodeDetails, MetadataResolver, ResolverError, SeasonDetails,
    SeriesCandidate, SeriesDetails,
};
pub use tmdb::TmdbResolver;
