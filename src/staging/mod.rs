//! Staging
//!
//! Serializes projected rows into an in-memory CSV buffer, the input both
//! backends bulk-load into a temporary table. The header always comes from
//! [`StagingRecord::COLUMNS`], so an empty projection still stages a valid
//! (header-only) table.

use serde::Serialize;

use crate::models::Entity;

/// Row type that can be staged as CSV
///
/// Field order of the serialized struct must match `COLUMNS`.
pub trait StagingRecord: Serialize {
    const ENTITY: Entity;
    const COLUMNS: &'static [&'static str];
}

/// Error raised while staging rows
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("failed to write {entity} staging row {row}: {source}")]
    Write {
        entity: Entity,
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush {entity} staging buffer: {source}")]
    Flush {
        entity: Entity,
        #[source]
        source: std::io::Error,
    },
}

/// A serialized batch ready for bulk loading
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTable {
    entity: Entity,
    columns: Vec<&'static str>,
    row_count: usize,
    data: Vec<u8>,
}

impl StagedTable {
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Positional column names, as written in the header
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Number of data rows, excluding the header
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// CSV bytes including the header line
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Serialize `rows` into a staged CSV table
///
/// `None` fields are written as empty cells, which both backends read back
/// as NULL.
pub fn stage<R: StagingRecord>(rows: &[R]) -> Result<StagedTable, StagingError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer
        .write_record(R::COLUMNS)
        .map_err(|source| StagingError::Write {
            entity: R::ENTITY,
            row: 0,
            source,
        })?;

    for (row, record) in rows.iter().enumerate() {
        writer
            .serialize(record)
            .map_err(|source| StagingError::Write {
                entity: R::ENTITY,
                row,
                source,
            })?;
    }

    let data = writer.into_inner().map_err(|e| StagingError::Flush {
        entity: R::ENTITY,
        source: e.into_error(),
    })?;

    tracing::debug!(
        "Staged {} {} rows ({} bytes)",
        rows.len(),
        R::ENTITY,
        data.len()
    );

    Ok(StagedTable {
        entity: R::ENTITY,
        columns: R::COLUMNS.to_vec(),
        row_count: rows.len(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtistRecord, SongPlayFact, UserRecord};
    use chrono::NaiveDate;

    fn lines(staged: &StagedTable) -> Vec<String> {
        String::from_utf8(staged.data().to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_header_follows_columns() {
        let staged = stage::<UserRecord>(&[]).unwrap();
        assert!(staged.is_empty());
        assert_eq!(staged.entity(), Entity::Users);
        assert_eq!(
            lines(&staged),
            vec!["user_id,first_name,last_name,gender,level"]
        );
    }

    #[test]
    fn test_none_is_empty_cell() {
        let staged = stage(&[ArtistRecord {
            artist_id: "A1".to_string(),
            name: Some("Band".to_string()),
            location: None,
            latitude: Some(35.5),
            longitude: None,
        }])
        .unwrap();

        assert_eq!(staged.row_count(), 1);
        assert_eq!(lines(&staged)[1], "A1,Band,,35.5,");
    }

    #[test]
    fn test_awkward_text_is_quoted() {
        let start = NaiveDate::from_ymd_opt(2018, 11, 2)
            .unwrap()
            .and_hms_milli_opt(1, 25, 34, 796)
            .unwrap();
        let staged = stage(&[SongPlayFact {
            start_time: start,
            user_id: 8,
            level: Some("free".to_string()),
            session_id: "139".to_string(),
            location: Some("Phoenix-Mesa-Scottsdale, AZ".to_string()),
            user_agent: Some("Mozilla/5.0 \"quoted\"".to_string()),
            song_title: Some("Line\nBreak".to_string()),
        }])
        .unwrap();

        let text = String::from_utf8(staged.data().to_vec()).unwrap();
        assert!(text.contains("2018-11-02 01:25:34.796,8,free,139,"));
        assert!(text.contains("\"Phoenix-Mesa-Scottsdale, AZ\""));
        assert!(text.contains("\"Mozilla/5.0 \"\"quoted\"\"\""));
        assert!(text.contains("\"Line\nBreak\""));

        let mut reader = csv::Reader::from_reader(staged.data());
        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][6], "Line\nBreak");
    }
}
