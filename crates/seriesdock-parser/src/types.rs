//! Output types for filename parsing.

use serde::{Deserialize, Serialize};

/// Broad classification of what a filename appears to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A series episode (season and/or episode markers found).
    Episode,
    /// A standalone film (year found, no episode markers).
    Movie,
    /// Nothing recognizable.
    #[default]
    Unknown,
}

/// Structured guess extracted from a raw filename.
///
/// All fields are optional: the parser records what it could recognize and
/// leaves the rest empty. A guess with no `title` or no `episode` is not an
/// error here; downstream code treats it as an unparsed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedFilename {
    /// Cleaned-up show or film title.
    pub title: Option<String>,
    /// Season number, if present.
    pub season: Option<u32>,
    /// Episode number, if present. Multi-episode files report the first.
    pub episode: Option<u32>,
    /// Release or first-air year found in the name.
    pub year: Option<i32>,
    /// What the filename appears to be.
    pub kind: MediaKind,
}

impl ParsedFilename {
    /// Whether the guess is usable for filing as a series episode.
    ///
    /// Requires a title and an episode number; a missing season is fine
    /// (callers default it to season 1).
    pub fn is_episode_guess(&self) -> bool {
        self.title.is_some() && self.episode.is_some()
    }
}
