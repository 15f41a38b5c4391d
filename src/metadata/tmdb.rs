//! TMDB (The Movie Database) catalog resolver.
//!
//! Implements [`MetadataResolver`] by querying the TMDB v3 REST API.
//!
//! Features:
//! - Token-bucket rate limiting at 4 requests / second via [`governor`].
//! - Automatic retry on HTTP 429 with `Retry-After` header support (max 3 retries).
//! - 30-second request timeout.
//! - Configurable base URL so tests can point at a local mock server.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::metadata::resolver::{
    EpisodeDetails, MetadataResolver, ResolverError, SeasonDetails, SeriesCandidate, SeriesDetails,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// TMDB API response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvSearchResult {
    id: i64,
    name: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    vote_average: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvDetail {
    id: i64,
    name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f64>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonDetail {
    name: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    air_date: Option<String>,
    episodes: Option<Vec<TmdbEpisodeDetail>>,
}

#[derive(Debug, Deserialize)]
struct TmdbEpisodeDetail {
    episode_number: i64,
    name: Option<String>,
    overview: Option<String>,
    still_path: Option<String>,
    air_date: Option<String>,
    runtime: Option<i64>,
}

// ---------------------------------------------------------------------------
// Resolver implementation
// ---------------------------------------------------------------------------

/// TMDB catalog resolver.
///
/// Wraps the TMDB v3 REST API with built-in rate limiting and retry logic.
/// HTTP 404 and empty search results surface as [`ResolverError::NotFound`];
/// everything else that fails surfaces as [`ResolverError::Transient`].
pub struct TmdbResolver {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl TmdbResolver {
    /// Create a new TMDB resolver from configuration.
    ///
    /// Rate limiting is configured at 4 requests per second.
    pub fn new(config: &ResolverConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        let quota = Quota::per_second(NonZeroU32::new(4).unwrap());
        let rate_limiter = RateLimiter::direct(quota);

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
            rate_limiter,
        }
    }

    /// Execute a GET request with rate limiting and 429-retry logic.
    async fn get(&self, url: &str) -> Result<reqwest::Response, ResolverError> {
        let mut retries = 0u32;
        loop {
            self.rate_limiter.until_ready().await;

            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ResolverError::Transient(format!("TMDB request failed: {e}")))?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RETRIES {
                retries += 1;
                let wait = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                warn!(
                    retry = retries,
                    wait_secs = wait,
                    "TMDB returned 429, backing off"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            if resp.status() == StatusCode::NOT_FOUND {
                return Err(ResolverError::NotFound);
            }

            let resp = resp.error_for_status().map_err(|e| {
                ResolverError::Transient(format!("TMDB request returned error: {e}"))
            })?;

            return Ok(resp);
        }
    }

    /// Build a full API URL with the API key and language query parameters.
    fn url(&self, path: &str, extra_params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}{path}?api_key={}&language={}",
            self.base_url, self.api_key, self.language
        );
        for (key, value) in extra_params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoded(value));
        }
        url
    }
}

/// Minimal percent-encoding for query parameter values.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0x0f) as usize]));
            }
        }
    }
    out
}

const HEX: [u8; 16] = *b"0123456789ABCDEF";

#[async_trait]
impl MetadataResolver for TmdbResolver {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn search_series(
        &self,
        title: &str,
        year: Option<u16>,
    ) -> Result<Vec<SeriesCandidate>, ResolverError> {
        let mut params = vec![("query", title)];
        let year_str = year.map(|y| y.to_string());
        if let Some(ref y) = year_str {
            params.push(("first_air_date_year", y.as_str()));
        }

        let url = self.url("/search/tv", &params);
        debug!(url = %url, "TMDB search series");

        let body: TmdbSearchResponse<TmdbTvSearchResult> =
            self.get(&url).await?.json().await.map_err(|e| {
                ResolverError::Transient(format!("failed to parse TMDB search response: {e}"))
            })?;

        if body.results.is_empty() {
            return Err(ResolverError::NotFound);
        }

        // Preserve the service's ranking; selection policy is applied upstream.
        Ok(body
            .results
            .into_iter()
            .map(|r| SeriesCandidate {
                tmdb_id: r.id,
                name: r.name.unwrap_or_default(),
                overview: r.overview,
                poster_path: r.poster_path,
                backdrop_path: r.backdrop_path,
                first_air_date: r.first_air_date,
                rating: r.vote_average,
            })
            .collect())
    }

    async fn series_details(&self, tmdb_id: i64) -> Result<SeriesDetails, ResolverError> {
        let url = self.url(&format!("/tv/{tmdb_id}"), &[]);
        debug!(url = %url, "TMDB series details");

        let detail: TmdbTvDetail = self.get(&url).await?.json().await.map_err(|e| {
            ResolverError::Transient(format!("failed to parse TMDB series detail response: {e}"))
        })?;

        Ok(SeriesDetails {
            tmdb_id: detail.id,
            name: detail.name.unwrap_or_default(),
            overview: detail.overview,
            poster_path: detail.poster_path,
            backdrop_path: detail.backdrop_path,
            first_air_date: detail.first_air_date,
            rating: detail.vote_average,
        })
    }

    async fn season_details(
        &self,
        tmdb_id: i64,
        season_number: i64,
    ) -> Result<SeasonDetails, ResolverError> {
        let url = self.url(&format!("/tv/{tmdb_id}/season/{season_number}"), &[]);
        debug!(url = %url, "TMDB season details");

        let detail: TmdbSeasonDetail = self.get(&url).await?.json().await.map_err(|e| {
            ResolverError::Transient(format!("failed to parse TMDB season detail response: {e}"))
        })?;

        Ok(SeasonDetails {
            name: detail.name,
            overview: detail.overview,
            poster_path: detail.poster_path,
            air_date: detail.air_date,
            episodes: detail
                .episodes
                .unwrap_or_default()
                .into_iter()
                .map(|e| EpisodeDetails {
                    episode_number: e.episode_number,
                    name: e.name,
                    overview: e.overview,
                    still_path: e.still_path,
                    air_date: e.air_date,
                    runtime: e.runtime,
                })
                .collect(),
        })
    }
}
