//! Schema projection
//!
//! Derives the five target entities from the merged record tables. Each
//! projection borrows its source table and returns fresh rows, so the
//! projections are independent of one another.

pub mod dedup;
mod fields;
pub mod projection;
pub mod time;

pub use dedup::{DedupPolicy, dedup_by_key};
pub use projection::{
    NEXT_SONG_PAGE, project_artists, project_song_plays, project_songs, project_time,
    project_users, song_play_events,
};
pub use time::{decompose, timestamp_from_millis};

use crate::models::Entity;

/// Error raised while projecting rows into an entity
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    /// A required field is absent or null
    #[error("{entity}: row {row} is missing required field '{field}'")]
    MissingField {
        entity: Entity,
        row: usize,
        field: &'static str,
    },

    /// A field holds a value of the wrong shape
    #[error("{entity}: row {row} field '{field}' is not a valid {expected}: {value}")]
    InvalidValue {
        entity: Entity,
        row: usize,
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    /// A millisecond timestamp outside the representable calendar range
    #[error("{entity}: row {row} timestamp {millis} is out of range")]
    TimestampOutOfRange {
        entity: Entity,
        row: usize,
        millis: i64,
    },
}
