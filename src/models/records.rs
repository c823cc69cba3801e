//! Projected entity rows
//!
//! Field order in each struct is the positional column order of the staged
//! CSV and must match the corresponding `StagingRecord::COLUMNS`.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::Entity;
use crate::staging::StagingRecord;

/// Timestamp layout accepted by both DuckDB and PostgreSQL `timestamp` columns
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(super::TIMESTAMP_FORMAT))
    }
}

/// A song, keyed by `song_id`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongRecord {
    pub song_id: String,
    pub title: Option<String>,
    pub artist_id: String,
    pub year: Option<i32>,
    pub duration: Option<f64>,
}

impl StagingRecord for SongRecord {
    const ENTITY: Entity = Entity::Songs;
    const COLUMNS: &'static [&'static str] = &["song_id", "title", "artist_id", "year", "duration"];
}

/// An artist, keyed by `artist_id`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistRecord {
    pub artist_id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl StagingRecord for ArtistRecord {
    const ENTITY: Entity = Entity::Artists;
    const COLUMNS: &'static [&'static str] =
        &["artist_id", "name", "location", "latitude", "longitude"];
}

/// A listener, keyed by `user_id`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub user_id: i32,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
}

impl StagingRecord for UserRecord {
    const ENTITY: Entity = Entity::Users;
    const COLUMNS: &'static [&'static str] =
        &["user_id", "first_name", "last_name", "gender", "level"];
}

/// Calendar breakdown of one event timestamp (UTC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeRecord {
    #[serde(serialize_with = "timestamp::serialize")]
    pub start_time: NaiveDateTime,
    pub hour: i32,
    pub day: i32,
    /// ISO 8601 week of the year
    pub week: i32,
    pub month: i32,
    pub year: i32,
    /// Monday = 0 through Sunday = 6
    pub weekday: i32,
}

impl StagingRecord for TimeRecord {
    const ENTITY: Entity = Entity::Time;
    const COLUMNS: &'static [&'static str] =
        &["start_time", "hour", "day", "week", "month", "year", "weekday"];
}

/// One "song played" event
///
/// `song_title` is not persisted; the loader resolves it to `song_id` and
/// `artist_id` by joining against the songs table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongPlayFact {
    #[serde(serialize_with = "timestamp::serialize")]
    pub start_time: NaiveDateTime,
    pub user_id: i32,
    pub level: Option<String>,
    pub session_id: String,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub song_title: Option<String>,
}

impl StagingRecord for SongPlayFact {
    const ENTITY: Entity = Entity::SongPlays;
    const COLUMNS: &'static [&'static str] = &[
        "start_time",
        "user_id",
        "level",
        "session_id",
        "location",
        "user_agent",
        "song_title",
    ];
}
