//! Entity projections
//!
//! Each function selects its columns from a merged table, applies the
//! entity's dedup rule and derives computed columns. Tie-breaks:
//!
//! | Entity | Key | Policy |
//! |---|---|---|
//! | songs | `song_id` | [`DedupPolicy::KeepLast`] |
//! | artists | `artist_id` | [`DedupPolicy::KeepLast`] |
//! | users | `user_id` | [`DedupPolicy::KeepFirst`] |
//! | time | `start_time` | none here, `DISTINCT` when loading |
//! | song plays | none | every event is a row |

use super::dedup::{DedupPolicy, dedup_by_key};
use super::fields::RowContext;
use super::time::{decompose, timestamp_from_millis};
use super::ProjectionError;
use crate::ingest::{Record, RecordTable};
use crate::models::{ArtistRecord, Entity, SongPlayFact, SongRecord, TimeRecord, UserRecord};

/// Log `page` value marking a song play
pub const NEXT_SONG_PAGE: &str = "NextSong";

const SONG_DEDUP: DedupPolicy = DedupPolicy::KeepLast;
const ARTIST_DEDUP: DedupPolicy = DedupPolicy::KeepLast;
const USER_DEDUP: DedupPolicy = DedupPolicy::KeepFirst;

fn project_rows<T, F>(table: &RecordTable, entity: Entity, project: F) -> Result<Vec<T>, ProjectionError>
where
    F: Fn(&RowContext, &Record) -> Result<T, ProjectionError>,
{
    table
        .rows()
        .iter()
        .enumerate()
        .map(|(row, record)| project(&RowContext::new(entity, row), record))
        .collect()
}

/// Songs from the merged song metadata, last occurrence of each `song_id` wins
pub fn project_songs(songs: &RecordTable) -> Result<Vec<SongRecord>, ProjectionError> {
    let rows = project_rows(songs, Entity::Songs, |ctx, record| {
        Ok(SongRecord {
            song_id: ctx.required_string(record, "song_id")?,
            title: ctx.optional_string(record, "title"),
            artist_id: ctx.required_string(record, "artist_id")?,
            year: ctx.optional_i32(record, "year")?,
            duration: ctx.optional_f64(record, "duration")?,
        })
    })?;

    Ok(dedup_by_key(rows, SONG_DEDUP, |song| song.song_id.clone()))
}

/// Artists from the merged song metadata, last occurrence of each `artist_id` wins
pub fn project_artists(songs: &RecordTable) -> Result<Vec<ArtistRecord>, ProjectionError> {
    let rows = project_rows(songs, Entity::Artists, |ctx, record| {
        Ok(ArtistRecord {
            artist_id: ctx.required_string(record, "artist_id")?,
            name: ctx.optional_string(record, "artist_name"),
            location: ctx.optional_string(record, "artist_location"),
            latitude: ctx.optional_f64(record, "artist_latitude")?,
            longitude: ctx.optional_f64(record, "artist_longitude")?,
        })
    })?;

    Ok(dedup_by_key(rows, ARTIST_DEDUP, |artist| {
        artist.artist_id.clone()
    }))
}

/// The song-play events of a merged log table
///
/// The time, user and song-play projections all read from this view.
pub fn song_play_events(logs: &RecordTable) -> RecordTable {
    if !logs.is_empty() && !logs.has_column("page") {
        tracing::warn!("Log records carry no 'page' field; no song plays to load");
    }
    logs.filter_eq("page", NEXT_SONG_PAGE)
}

fn start_time(ctx: &RowContext, record: &Record) -> Result<(i64, chrono::NaiveDateTime), ProjectionError> {
    let millis = ctx.required_i64(record, "ts")?;
    let start = timestamp_from_millis(millis).ok_or(ProjectionError::TimestampOutOfRange {
        entity: ctx.entity,
        row: ctx.row,
        millis,
    })?;
    Ok((millis, start))
}

/// Calendar rows, one per event
pub fn project_time(events: &RecordTable) -> Result<Vec<TimeRecord>, ProjectionError> {
    project_rows(events, Entity::Time, |ctx, record| {
        let (millis, _) = start_time(ctx, record)?;
        decompose(millis).ok_or(ProjectionError::TimestampOutOfRange {
            entity: ctx.entity,
            row: ctx.row,
            millis,
        })
    })
}

/// Users, first occurrence of each `user_id` wins
pub fn project_users(events: &RecordTable) -> Result<Vec<UserRecord>, ProjectionError> {
    let rows = project_rows(events, Entity::Users, |ctx, record| {
        Ok(UserRecord {
            user_id: ctx.required_i32(record, "userId")?,
            first_name: ctx.optional_string(record, "firstName"),
            last_name: ctx.optional_string(record, "lastName"),
            gender: ctx.optional_string(record, "gender"),
            level: ctx.optional_string(record, "level"),
        })
    })?;

    Ok(dedup_by_key(rows, USER_DEDUP, |user| user.user_id))
}

/// Song-play facts, one per event with no dedup
pub fn project_song_plays(events: &RecordTable) -> Result<Vec<SongPlayFact>, ProjectionError> {
    project_rows(events, Entity::SongPlays, |ctx, record| {
        let (_, start_time) = start_time(ctx, record)?;
        Ok(SongPlayFact {
            start_time,
            user_id: ctx.required_i32(record, "userId")?,
            level: ctx.optional_string(record, "level"),
            session_id: ctx.required_string(record, "sessionId")?,
            location: ctx.optional_string(record, "location"),
            user_agent: ctx.optional_string(record, "userAgent"),
            song_title: ctx.optional_string(record, "song"),
        })
    })
}
