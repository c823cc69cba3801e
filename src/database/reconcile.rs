//! Load reconciliation plans
//!
//! A [`LoadPlan`] describes how one entity's staged rows merge into its
//! persisted table: the transient stage layout, the insert column list and
//! the [`ConflictPolicy`]. Both backends build their statements from the
//! same plan, so the reconciliation SQL is identical across stores.

use std::fmt::Display;

use super::{DatabaseError, DatabaseResult};
use crate::models::Entity;
use crate::staging::StagedTable;

/// Column of a transient stage table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageColumn {
    pub name: &'static str,
    pub sql_type: &'static str,
}

const fn col(name: &'static str, sql_type: &'static str) -> StageColumn {
    StageColumn { name, sql_type }
}

/// Lookup join that resolves stage values to persisted keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinEnrichment {
    /// Table the resolved columns come from
    pub lookup_table: &'static str,
    /// Stage column matched against the lookup table; not persisted
    pub stage_column: &'static str,
    pub lookup_column: &'static str,
    /// Columns copied from the matching lookup row, NULL when none matches
    pub resolved: &'static [&'static str],
}

/// How staged rows merge with rows already in the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Existing rows win; conflicting staged rows are dropped
    SkipOnConflict,
    /// Existing rows keep every column except this one, which takes the staged value
    OverwriteColumn(&'static str),
    /// Plain append, enriched through a left outer join
    JoinEnrich(JoinEnrichment),
}

/// Reconciliation plan for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    pub entity: Entity,
    /// Conflict key; `None` for append-only facts
    pub key: Option<&'static str>,
    pub stage_columns: &'static [StageColumn],
    /// Collapse identical staged rows before inserting
    pub distinct: bool,
    pub policy: ConflictPolicy,
}

const SONG_COLUMNS: &[StageColumn] = &[
    col("song_id", "VARCHAR"),
    col("title", "VARCHAR"),
    col("artist_id", "VARCHAR"),
    col("year", "INTEGER"),
    col("duration", "DOUBLE PRECISION"),
];

const ARTIST_COLUMNS: &[StageColumn] = &[
    col("artist_id", "VARCHAR"),
    col("name", "VARCHAR"),
    col("location", "VARCHAR"),
    col("latitude", "DOUBLE PRECISION"),
    col("longitude", "DOUBLE PRECISION"),
];

const USER_COLUMNS: &[StageColumn] = &[
    col("user_id", "INTEGER"),
    col("first_name", "VARCHAR"),
    col("last_name", "VARCHAR"),
    col("gender", "VARCHAR"),
    col("level", "VARCHAR"),
];

const TIME_COLUMNS: &[StageColumn] = &[
    col("start_time", "TIMESTAMP"),
    col("hour", "INTEGER"),
    col("day", "INTEGER"),
    col("week", "INTEGER"),
    col("month", "INTEGER"),
    col("year", "INTEGER"),
    col("weekday", "INTEGER"),
];

const SONGPLAY_COLUMNS: &[StageColumn] = &[
    col("start_time", "TIMESTAMP"),
    col("user_id", "INTEGER"),
    col("level", "VARCHAR"),
    col("session_id", "VARCHAR"),
    col("location", "VARCHAR"),
    col("user_agent", "TEXT"),
    col("song_title", "TEXT"),
];

const SONG_TITLE_LOOKUP: JoinEnrichment = JoinEnrichment {
    lookup_table: "songs",
    stage_column: "song_title",
    lookup_column: "title",
    resolved: &["song_id", "artist_id"],
};

/// Quote an identifier for both DuckDB and PostgreSQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for both DuckDB and PostgreSQL
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl LoadPlan {
    pub fn for_entity(entity: Entity) -> Self {
        match entity {
            Entity::Songs => Self {
                entity,
                key: Some("song_id"),
                stage_columns: SONG_COLUMNS,
                distinct: false,
                policy: ConflictPolicy::SkipOnConflict,
            },
            Entity::Artists => Self {
                entity,
                key: Some("artist_id"),
                stage_columns: ARTIST_COLUMNS,
                distinct: false,
                policy: ConflictPolicy::SkipOnConflict,
            },
            Entity::Users => Self {
                entity,
                key: Some("user_id"),
                stage_columns: USER_COLUMNS,
                distinct: false,
                policy: ConflictPolicy::OverwriteColumn("level"),
            },
            Entity::Time => Self {
                entity,
                key: Some("start_time"),
                stage_columns: TIME_COLUMNS,
                distinct: true,
                policy: ConflictPolicy::SkipOnConflict,
            },
            Entity::SongPlays => Self {
                entity,
                key: None,
                stage_columns: SONGPLAY_COLUMNS,
                distinct: false,
                policy: ConflictPolicy::JoinEnrich(SONG_TITLE_LOOKUP),
            },
        }
    }

    pub fn target_table(&self) -> &'static str {
        self.entity.table_name()
    }

    /// Fresh transient table name, unique per call
    pub fn stage_table_name(&self) -> String {
        format!(
            "stage_{}_{}",
            self.target_table(),
            uuid::Uuid::new_v4().simple()
        )
    }

    /// Stage column names in positional order
    pub fn stage_column_names(&self) -> Vec<&'static str> {
        self.stage_columns.iter().map(|c| c.name).collect()
    }

    /// Verify that `staged` holds this plan's entity in this plan's column order
    pub fn check(&self, staged: &StagedTable) -> DatabaseResult<()> {
        if staged.entity() != self.entity {
            return Err(DatabaseError::InvalidInput(format!(
                "staged {} rows cannot be loaded into {}",
                staged.entity(),
                self.entity
            )));
        }
        if staged.columns() != self.stage_column_names().as_slice() {
            return Err(DatabaseError::InvalidInput(format!(
                "staged {} columns {:?} do not match stage layout {:?}",
                self.entity,
                staged.columns(),
                self.stage_column_names()
            )));
        }
        Ok(())
    }

    pub fn create_stage_sql(&self, stage: &str) -> String {
        let columns: Vec<String> = self
            .stage_columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(c.name), c.sql_type))
            .collect();
        format!(
            "CREATE TEMPORARY TABLE {} ({})",
            quote_ident(stage),
            columns.join(", ")
        )
    }

    pub fn drop_stage_sql(&self, stage: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_ident(stage))
    }

    /// Insert-select moving the stage rows into the target table
    pub fn insert_select_sql(&self, stage: &str) -> String {
        let target = quote_ident(self.target_table());
        let stage = quote_ident(stage);
        let distinct = if self.distinct { "DISTINCT " } else { "" };

        match self.policy {
            ConflictPolicy::JoinEnrich(join) => {
                let passthrough: Vec<&str> = self
                    .stage_columns
                    .iter()
                    .map(|c| c.name)
                    .filter(|name| *name != join.stage_column)
                    .collect();

                let insert_columns: Vec<String> = passthrough
                    .iter()
                    .chain(join.resolved.iter())
                    .map(|c| quote_ident(c))
                    .collect();
                let select_columns: Vec<String> = passthrough
                    .iter()
                    .map(|c| format!("s.{}", quote_ident(c)))
                    .chain(join.resolved.iter().map(|c| format!("l.{}", quote_ident(c))))
                    .collect();

                format!(
                    "INSERT INTO {target} ({}) SELECT {distinct}{} FROM {stage} AS s \
                     LEFT OUTER JOIN {} AS l ON s.{} = l.{}",
                    insert_columns.join(", "),
                    select_columns.join(", "),
                    quote_ident(join.lookup_table),
                    quote_ident(join.stage_column),
                    quote_ident(join.lookup_column),
                )
            }
            ConflictPolicy::SkipOnConflict | ConflictPolicy::OverwriteColumn(_) => {
                let columns: Vec<String> = self
                    .stage_columns
                    .iter()
                    .map(|c| quote_ident(c.name))
                    .collect();
                let columns = columns.join(", ");

                let conflict = match (self.key, self.policy) {
                    (Some(key), ConflictPolicy::OverwriteColumn(column)) => format!(
                        " ON CONFLICT ({}) DO UPDATE SET {col} = EXCLUDED.{col}",
                        quote_ident(key),
                        col = quote_ident(column)
                    ),
                    (Some(key), _) => format!(" ON CONFLICT ({}) DO NOTHING", quote_ident(key)),
                    (None, _) => String::new(),
                };

                format!(
                    "INSERT INTO {target} ({columns}) SELECT {distinct}{columns} FROM {stage}{conflict}"
                )
            }
        }
    }

    /// Wrap a failed load step as a per-entity error
    pub fn load_error(&self, step: &str, error: impl Display) -> DatabaseError {
        DatabaseError::LoadFailed {
            entity: self.entity,
            message: format!("{}: {}", step, error),
        }
    }
}
