//! Seriesdock-Common: shared error and identifier types.
//!
//! Every other crate in the workspace funnels failures into [`Error`] and
//! refers to catalog entities through the typed ids defined here.

pub mod error;
pub mod ids;

pub use error::{Error, Result};
pub use ids::{CollectionId, EpisodeId, InboxId, PendingUploadId, SeasonId, SeriesId};
