//! Filename pattern matching.
//!
//! Parses release-style names like:
//! - "Show.Name.S02E05.1080p.mkv"
//! - "Corner Gas S06E12 Super Sensitive 1080p AMZN WEB-DL DDP2 0 H 264-QOQ"
//! - "Game.of.Thrones.2x15.720p.HDTV"
//! - "The.Hunt.for.Red.October.1990.1080p.BluRay.x265-LAMA"

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{MediaKind, ParsedFilename};

/// File extensions treated as video containers.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "ts",
];

/// Pattern for S01E01 format, tolerating a gap between the markers
/// (S01.E01) and multi-episode suffixes (S01E01-E02).
static SXXEXX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(.+?)\s*[Ss](\d{1,2})\s*[Ee](\d{1,3})(?:[-\s]?[Ee]\d{1,3})?").unwrap()
});

/// Pattern for 1x01 format (also handles 1x1, 01x01, 01x1).
static NXNN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(.+?)\s*(\d{1,2})x(\d{1,2})").unwrap());

/// Pattern for "Season X Episode Y" format.
static VERBOSE_SEASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(.+?)\s*Season\s*(\d+).*?Episode\s*(\d+)").unwrap());

/// Pattern for episode markers with no season ("Show E05", "Show Episode 5").
/// Callers default these to season 1.
static EPISODE_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(.+?)\s+E(?:p(?:isode)?)?\s*(\d{1,3})(?:\s|$)").unwrap());

/// Pattern for season-only S01 format (season packs).
static SEASON_ONLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(.+?)\s*[Ss](\d{1,2})(?:\s+\d{4}|\s+\d{3,4}p|\s+Complete|\s+Full|\s*$)")
        .unwrap()
});

/// Pattern for standalone year extraction.
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

/// Pattern for movie-style "Title Year" extraction.
static MOVIE_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.+?)[\s\(\[]+((?:19|20)\d{2})(?:[\s\)\]]|$)").unwrap());

/// Pattern for trailing year cleanup in titles.
static TRAILING_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(?(19\d{2}|20\d{2})\)?\s*$").unwrap());

/// Pattern for country suffix cleanup in titles.
static COUNTRY_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(US|UK|AU|NZ)\s*$").unwrap());

/// Pattern for multiple spaces cleanup.
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Check whether a filename carries a known video extension.
pub fn is_video_filename(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Parse a raw filename into a structured guess.
///
/// Tries episode patterns in order of specificity, then falls back to a
/// movie-style "Title Year" match. Returns a default (unknown) guess when
/// nothing matches; this is not an error.
pub fn parse_filename(name: &str) -> ParsedFilename {
    let mut guess = ParsedFilename::default();

    let stem = strip_video_extension(name);
    let cleaned = stem.replace(['.', '_', '-'], " ");

    if let Some(caps) = SXXEXX_RE.captures(&cleaned) {
        guess.title = caps.get(1).map(|m| clean_title(m.as_str()));
        guess.season = caps.get(2).and_then(|m| m.as_str().parse().ok());
        guess.episode = caps.get(3).and_then(|m| m.as_str().parse().ok());
        guess.kind = MediaKind::Episode;
    } else if let Some(caps) = NXNN_RE.captures(&cleaned) {
        guess.title = caps.get(1).map(|m| clean_title(m.as_str()));
        guess.season = caps.get(2).and_then(|m| m.as_str().parse().ok());
        guess.episode = caps.get(3).and_then(|m| m.as_str().parse().ok());
        guess.kind = MediaKind::Episode;
    } else if let Some(caps) = VERBOSE_SEASON_RE.captures(&cleaned) {
        guess.title = caps.get(1).map(|m| clean_title(m.as_str()));
        guess.season = caps.get(2).and_then(|m| m.as_str().parse().ok());
        guess.episode = caps.get(3).and_then(|m| m.as_str().parse().ok());
        guess.kind = MediaKind::Episode;
    } else if let Some(caps) = EPISODE_ONLY_RE.captures(&cleaned) {
        // Episode without a season marker; season is left unset.
        guess.title = caps.get(1).map(|m| clean_title(m.as_str()));
        guess.episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
        guess.kind = MediaKind::Episode;
    } else if let Some(caps) = SEASON_ONLY_RE.captures(&cleaned) {
        // Season pack: season without an episode number.
        guess.title = caps.get(1).map(|m| clean_title(m.as_str()));
        guess.season = caps.get(2).and_then(|m| m.as_str().parse().ok());
        guess.kind = MediaKind::Episode;
    } else if let Some(caps) = MOVIE_YEAR_RE.captures(&cleaned) {
        guess.title = caps.get(1).map(|m| clean_title(m.as_str()));
        guess.year = caps.get(2).and_then(|m| m.as_str().parse().ok());
        guess.kind = MediaKind::Movie;
    }

    // Titles with embedded years ("The Traitors 2023 S04E05") surface the
    // year even when the episode patterns consumed it.
    if guess.year.is_none() {
        if let Some(caps) = YEAR_RE.captures(&cleaned) {
            guess.year = caps.get(1).and_then(|m| m.as_str().parse().ok());
        }
    }

    if guess.title.as_deref() == Some("") {
        guess.title = None;
    }

    guess
}

fn strip_video_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => stem,
        _ => name,
    }
}

/// Clean up a captured title: drop trailing year/country markers and
/// collapse whitespace.
fn clean_title(raw: &str) -> String {
    let mut cleaned = raw.trim().to_string();
    cleaned = TRAILING_YEAR_RE.replace(&cleaned, "").to_string();
    cleaned = COUNTRY_SUFFIX_RE.replace(&cleaned, "").to_string();
    cleaned = MULTI_SPACE_RE.replace_all(&cleaned, " ").to_string();
    cleaned.trim().to_string()
}
