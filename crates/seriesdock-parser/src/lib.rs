//! Seriesdock-Parser: filename parsing for the ingestion pipeline.
//!
//! Turns raw release-style filenames ("Show.Name.S02E05.1080p.mkv") into a
//! structured [`ParsedFilename`] guess. Parsing never fails: unmatched
//! filenames come back with empty fields and [`MediaKind::Unknown`], and the
//! caller decides what an unusable guess means.

pub mod filename;
pub mod types;

pub use filename::{is_video_filename, parse_filename};
pub use types::{MediaKind, ParsedFilename};
