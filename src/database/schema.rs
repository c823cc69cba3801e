//! Database schema definitions
//!
//! Provides SQL schema definitions that work with both DuckDB and PostgreSQL.
//! Every statement is idempotent so `initialize` can run before each load.

use crate::models::Entity;

/// Sequence backing `songplays.songplay_id`
pub const SONGPLAY_ID_SEQUENCE: &str = "songplay_id_seq";

/// Database schema helper
pub struct DatabaseSchema;

impl DatabaseSchema {
    /// Get the schema creation SQL
    ///
    /// This SQL is compatible with both DuckDB and PostgreSQL. `songplay_id`
    /// draws from an explicit sequence since DuckDB has no `SERIAL` type.
    pub fn create_tables_sql() -> &'static str {
        r#"
CREATE SEQUENCE IF NOT EXISTS songplay_id_seq;

CREATE TABLE IF NOT EXISTS songplays (
    songplay_id BIGINT PRIMARY KEY DEFAULT nextval('songplay_id_seq'),
    start_time TIMESTAMP NOT NULL,
    user_id INTEGER NOT NULL,
    level VARCHAR,
    song_id VARCHAR,
    artist_id VARCHAR,
    session_id VARCHAR NOT NULL,
    location VARCHAR,
    user_agent TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    first_name VARCHAR NOT NULL,
    last_name VARCHAR NOT NULL,
    gender VARCHAR,
    level VARCHAR
);

CREATE TABLE IF NOT EXISTS songs (
    song_id VARCHAR PRIMARY KEY,
    title VARCHAR,
    artist_id VARCHAR NOT NULL,
    year INTEGER,
    duration DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS artists (
    artist_id VARCHAR PRIMARY KEY,
    name VARCHAR NOT NULL,
    location VARCHAR,
    latitude DOUBLE PRECISION,
    longitude DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS "time" (
    start_time TIMESTAMP PRIMARY KEY,
    hour INTEGER,
    day INTEGER,
    week INTEGER,
    month INTEGER,
    year INTEGER,
    weekday INTEGER
);
"#
    }

    /// Drop all tables and the songplay sequence (for reset)
    ///
    /// `songplays` goes first because its default depends on the sequence.
    pub fn drop_all_tables_sql() -> &'static str {
        r#"
DROP TABLE IF EXISTS songplays;
DROP TABLE IF EXISTS users;
DROP TABLE IF EXISTS songs;
DROP TABLE IF EXISTS artists;
DROP TABLE IF EXISTS "time";
DROP SEQUENCE IF EXISTS songplay_id_seq;
"#
    }

    /// Row count of one entity's table
    pub fn count_rows_sql(entity: Entity) -> String {
        format!(
            "SELECT COUNT(*) AS count FROM {}",
            super::reconcile::quote_ident(entity.table_name())
        )
    }
}

/// Point lookup of a song by title, artist name and duration
pub mod song_sql {
    pub const FIND_BY_TITLE_ARTIST_DURATION: &str = r#"
SELECT songs.song_id, songs.artist_id
FROM songs
INNER JOIN artists ON songs.artist_id = artists.artist_id
WHERE songs.title = $1
  AND artists.name = $2
  AND songs.duration = $3
LIMIT 1
"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creates_every_entity() {
        let sql = DatabaseSchema::create_tables_sql();
        for entity in Entity::ALL {
            let quoted = format!("CREATE TABLE IF NOT EXISTS \"{}\"", entity.table_name());
            let bare = format!("CREATE TABLE IF NOT EXISTS {} ", entity.table_name());
            assert!(
                sql.contains(&quoted) || sql.contains(&bare),
                "missing table {}",
                entity
            );
        }
        assert!(sql.contains(SONGPLAY_ID_SEQUENCE));
    }

    #[test]
    fn test_drop_removes_songplays_before_sequence() {
        let sql = DatabaseSchema::drop_all_tables_sql();
        let table = sql.find("DROP TABLE IF EXISTS songplays").unwrap();
        let sequence = sql.find("DROP SEQUENCE IF EXISTS songplay_id_seq").unwrap();
        assert!(table < sequence);
    }

    #[test]
    fn test_count_rows_sql_quotes_time() {
        assert_eq!(
            DatabaseSchema::count_rows_sql(Entity::Time),
            "SELECT COUNT(*) AS count FROM \"time\""
        );
    }
}
