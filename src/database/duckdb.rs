//! DuckDB database backend implementation
//!
//! Provides an embedded store for local runs and tests. Staged tables are
//! written to a temporary CSV file and bulk-loaded with `COPY ... FROM`.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::reconcile::{LoadPlan, quote_ident, quote_literal};
use super::schema::{DatabaseSchema, song_sql};
use super::{
    DatabaseBackend, DatabaseError, DatabaseResult, LoadOutcome, QueryResult, SongMatch,
};
use crate::staging::StagedTable;

/// DuckDB database backend
///
/// Supports both file-based persistence and in-memory mode. The connection is
/// taken out of its slot by [`DatabaseBackend::close`].
pub struct DuckDBBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    connection: Mutex<Option<duckdb::Connection>>,
}

impl DuckDBBackend {
    /// Open (or create) a file-based database
    pub fn new(db_path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        tracing::debug!("Opened DuckDB database at {}", path.display());

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Create an in-memory DuckDB backend
    pub fn in_memory() -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    /// Run `f` against the open connection
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut duckdb::Connection) -> DatabaseResult<T>,
    ) -> DatabaseResult<T> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))?;
        let conn = guard.as_mut().ok_or(DatabaseError::Closed)?;
        f(conn)
    }

    fn copy_from_file_sql(stage: &str, path: &Path) -> String {
        format!(
            "COPY {} FROM {} (FORMAT CSV, HEADER true, DELIMITER ',', QUOTE '\"', ESCAPE '\"')",
            quote_ident(stage),
            quote_literal(&path.to_string_lossy())
        )
    }

    /// Write the staged CSV to a uniquely named temporary file
    fn spill(staged: &StagedTable) -> DatabaseResult<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("songplay-etl-stage-")
            .suffix(".csv")
            .tempfile()
            .map_err(|e| DatabaseError::IoError(format!("Failed to create staging file: {}", e)))?;
        file.write_all(staged.data())
            .and_then(|_| file.flush())
            .map_err(|e| DatabaseError::IoError(format!("Failed to write staging file: {}", e)))?;
        Ok(file)
    }

    /// Convert a DuckDB row to a JSON value
    fn row_to_json(row: &duckdb::Row, columns: &[String]) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        for (i, col_name) in columns.iter().enumerate() {
            let value = match row.get_ref(i) {
                Ok(value_ref) => Self::value_ref_to_json(value_ref),
                Err(_) => serde_json::Value::Null,
            };
            map.insert(col_name.clone(), value);
        }

        serde_json::Value::Object(map)
    }

    /// Convert a DuckDB ValueRef to a JSON value
    fn value_ref_to_json(value: duckdb::types::ValueRef) -> serde_json::Value {
        use duckdb::types::ValueRef;

        match value {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Boolean(b) => serde_json::Value::Bool(b),
            ValueRef::TinyInt(i) => i.into(),
            ValueRef::SmallInt(i) => i.into(),
            ValueRef::Int(i) => i.into(),
            ValueRef::BigInt(i) => i.into(),
            // i128 may not fit in a JSON number
            ValueRef::HugeInt(i) => serde_json::Value::String(i.to_string()),
            ValueRef::UTinyInt(i) => i.into(),
            ValueRef::USmallInt(i) => i.into(),
            ValueRef::UInt(i) => i.into(),
            ValueRef::UBigInt(i) => i.into(),
            ValueRef::Float(f) => serde_json::Number::from_f64(f as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Double(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
            ValueRef::Decimal(d) => serde_json::Value::String(d.to_string()),
            other => serde_json::Value::String(format!("{:?}", other)),
        }
    }
}

#[async_trait(?Send)]
impl DatabaseBackend for DuckDBBackend {
    async fn initialize(&self) -> DatabaseResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch(DatabaseSchema::create_tables_sql())
                .map_err(|e| {
                    DatabaseError::MigrationFailed(format!("Failed to create tables: {}", e))
                })
        })?;
        tracing::info!("DuckDB schema ready");
        Ok(())
    }

    async fn drop_schema(&self) -> DatabaseResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch(DatabaseSchema::drop_all_tables_sql())
                .map_err(|e| DatabaseError::MigrationFailed(format!("Failed to drop tables: {}", e)))
        })?;
        tracing::info!("DuckDB schema dropped");
        Ok(())
    }

    async fn load(&self, plan: &LoadPlan, staged: &StagedTable) -> DatabaseResult<LoadOutcome> {
        plan.check(staged)?;
        if staged.is_empty() {
            tracing::debug!("Nothing staged for {}, skipping load", plan.entity);
            return Ok(LoadOutcome::empty(plan.entity));
        }

        // Removed from disk when dropped at the end of this call.
        let file = Self::spill(staged)?;
        let stage = plan.stage_table_name();
        let insert_sql = plan.insert_select_sql(&stage);
        tracing::debug!("{}: {}", plan.entity, insert_sql);

        let rows_affected = self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|e| {
                DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
            })?;

            tx.execute_batch(&plan.create_stage_sql(&stage))
                .map_err(|e| plan.load_error("create stage table", e))?;
            tx.execute_batch(&Self::copy_from_file_sql(&stage, file.path()))
                .map_err(|e| plan.load_error("bulk copy", e))?;
            let rows = tx
                .execute(&insert_sql, [])
                .map_err(|e| plan.load_error("reconcile", e))?;
            tx.execute_batch(&plan.drop_stage_sql(&stage))
                .map_err(|e| plan.load_error("drop stage table", e))?;

            tx.commit().map_err(|e| {
                DatabaseError::TransactionFailed(format!("Failed to commit {}: {}", plan.entity, e))
            })?;
            Ok(rows)
        })?;

        Ok(LoadOutcome {
            entity: plan.entity,
            rows_staged: staged.row_count() as u64,
            rows_affected: rows_affected as u64,
        })
    }

    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();

        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

            // In DuckDB 1.4+, we need to execute the query first, then get columns
            let mut result_rows = stmt
                .query([])
                .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

            let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
            let columns: Vec<String> = (0..column_count)
                .map(|i| {
                    result_rows
                        .as_ref()
                        .and_then(|r| r.column_name(i).ok())
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| format!("col{}", i))
                })
                .collect();

            let mut rows = Vec::new();
            while let Some(row) = result_rows
                .next()
                .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?
            {
                rows.push(Self::row_to_json(row, &columns));
            }

            Ok(QueryResult {
                columns,
                rows,
                execution_time_ms: start.elapsed().as_millis() as u64,
            })
        })
    }

    async fn find_song(
        &self,
        title: &str,
        artist_name: &str,
        duration: f64,
    ) -> DatabaseResult<Option<SongMatch>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(song_sql::FIND_BY_TITLE_ARTIST_DURATION)
                .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;
            let mut rows = stmt
                .query(duckdb::params![title, artist_name, duration])
                .map_err(|e| DatabaseError::QueryFailed(format!("Song lookup failed: {}", e)))?;

            let row = rows
                .next()
                .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?;
            match row {
                Some(row) => {
                    let found = SongMatch {
                        song_id: row
                            .get(0)
                            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
                        artist_id: row
                            .get(1)
                            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
                    };
                    Ok(Some(found))
                }
                None => Ok(None),
            }
        })
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let result = self.execute_query("SELECT 1 as healthy").await?;
        Ok(!result.rows.is_empty())
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    async fn close(&self) -> DatabaseResult<()> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| {
                DatabaseError::ConnectionFailed(format!("Failed to close DuckDB: {}", e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ArtistRecord, Entity, SongPlayFact, SongRecord, TimeRecord, UserRecord,
    };
    use crate::staging::stage;
    use crate::transform::decompose;
    use chrono::NaiveDate;

    async fn ready() -> DuckDBBackend {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend.initialize().await.unwrap();
        backend
    }

    async fn count(backend: &DuckDBBackend, entity: Entity) -> i64 {
        backend
            .execute_query(&DatabaseSchema::count_rows_sql(entity))
            .await
            .unwrap()
            .first_i64("count")
            .unwrap()
    }

    fn song(song_id: &str, title: &str, artist_id: &str) -> SongRecord {
        SongRecord {
            song_id: song_id.to_string(),
            title: Some(title.to_string()),
            artist_id: artist_id.to_string(),
            year: Some(2000),
            duration: Some(180.5),
        }
    }

    fn user(user_id: i32, level: &str) -> UserRecord {
        UserRecord {
            user_id,
            first_name: Some("Lily".to_string()),
            last_name: Some("Koch".to_string()),
            gender: Some("F".to_string()),
            level: Some(level.to_string()),
        }
    }

    fn play(song_title: &str) -> SongPlayFact {
        SongPlayFact {
            start_time: NaiveDate::from_ymd_opt(2018, 11, 2)
                .unwrap()
                .and_hms_milli_opt(1, 25, 34, 796)
                .unwrap(),
            user_id: 15,
            level: Some("paid".to_string()),
            session_id: "818".to_string(),
            location: Some("Chicago-Naperville-Elgin, IL-IN-WI".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            song_title: Some(song_title.to_string()),
        }
    }

    async fn load<R: crate::staging::StagingRecord>(
        backend: &DuckDBBackend,
        rows: &[R],
    ) -> DatabaseResult<LoadOutcome> {
        let staged = stage(rows).unwrap();
        backend
            .load(&LoadPlan::for_entity(R::ENTITY), &staged)
            .await
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let backend = DuckDBBackend::in_memory().unwrap();
        assert!(backend.is_in_memory());
        assert!(backend.db_path().is_none());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let backend = ready().await;
        backend.initialize().await.unwrap();

        let counts = backend.table_counts().await.unwrap();
        assert_eq!(counts.len(), 5);
        assert!(counts.iter().all(|c| c.rows == 0));
    }

    #[tokio::test]
    async fn test_drop_schema() {
        let backend = ready().await;
        backend.drop_schema().await.unwrap();
        assert!(backend.table_counts().await.is_err());

        backend.initialize().await.unwrap();
        assert!(backend.table_counts().await.is_ok());
    }

    #[tokio::test]
    async fn test_skip_on_conflict_keeps_existing() {
        let backend = ready().await;
        load(&backend, &[song("S1", "Original", "A1")]).await.unwrap();
        load(&backend, &[song("S1", "Changed", "A1"), song("S2", "New", "A2")])
            .await
            .unwrap();

        assert_eq!(count(&backend, Entity::Songs).await, 2);
        let result = backend
            .execute_query("SELECT title FROM songs WHERE song_id = 'S1'")
            .await
            .unwrap();
        assert_eq!(result.rows[0]["title"], "Original");
    }

    #[tokio::test]
    async fn test_overwrite_level_only() {
        let backend = ready().await;
        load(&backend, &[user(15, "free")]).await.unwrap();

        let mut renamed = user(15, "paid");
        renamed.first_name = Some("Someone".to_string());
        load(&backend, &[renamed]).await.unwrap();

        let result = backend
            .execute_query("SELECT first_name, level FROM users WHERE user_id = 15")
            .await
            .unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.rows[0]["first_name"], "Lily");
        assert_eq!(result.rows[0]["level"], "paid");
    }

    #[tokio::test]
    async fn test_duplicate_time_rows_collapse() {
        let backend = ready().await;
        let t = decompose(1_541_121_934_796).unwrap();
        let rows: Vec<TimeRecord> = vec![t.clone(), t.clone(), decompose(1_541_121_934_797).unwrap()];
        load(&backend, &rows).await.unwrap();
        load(&backend, &[t]).await.unwrap();

        assert_eq!(count(&backend, Entity::Time).await, 2);
    }

    #[tokio::test]
    async fn test_join_enrichment() {
        let backend = ready().await;
        load(&backend, &[song("S1", "Test Song", "A1")]).await.unwrap();
        load(&backend, &[play("Test Song"), play("Unknown Song")])
            .await
            .unwrap();

        let result = backend
            .execute_query(
                "SELECT song_id, artist_id FROM songplays ORDER BY song_id NULLS LAST",
            )
            .await
            .unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.rows[0]["song_id"], "S1");
        assert_eq!(result.rows[0]["artist_id"], "A1");
        assert!(result.rows[1]["song_id"].is_null());
        assert!(result.rows[1]["artist_id"].is_null());
    }

    #[tokio::test]
    async fn test_song_plays_append() {
        let backend = ready().await;
        load(&backend, &[play("Anything")]).await.unwrap();
        load(&backend, &[play("Anything")]).await.unwrap();
        assert_eq!(count(&backend, Entity::SongPlays).await, 2);
    }

    #[tokio::test]
    async fn test_failed_load_rolls_back() {
        let backend = ready().await;
        // artists.name is NOT NULL
        let artists = vec![
            ArtistRecord {
                artist_id: "A1".to_string(),
                name: Some("Fine".to_string()),
                location: None,
                latitude: None,
                longitude: None,
            },
            ArtistRecord {
                artist_id: "A2".to_string(),
                name: None,
                location: None,
                latitude: None,
                longitude: None,
            },
        ];

        let err = load(&backend, &artists).await.unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::LoadFailed {
                entity: Entity::Artists,
                ..
            }
        ));
        assert_eq!(count(&backend, Entity::Artists).await, 0);

        // The connection is still usable afterwards
        load(&backend, &artists[..1]).await.unwrap();
        assert_eq!(count(&backend, Entity::Artists).await, 1);
    }

    #[tokio::test]
    async fn test_empty_load_short_circuits() {
        let backend = DuckDBBackend::in_memory().unwrap();
        // No schema: an empty load must not touch the store
        let outcome = load::<SongRecord>(&backend, &[]).await.unwrap();
        assert_eq!(outcome, LoadOutcome::empty(Entity::Songs));
    }

    #[tokio::test]
    async fn test_find_song() {
        let backend = ready().await;
        load(&backend, &[song("S1", "Test Song", "A1")]).await.unwrap();
        load(
            &backend,
            &[ArtistRecord {
                artist_id: "A1".to_string(),
                name: Some("Test Artist".to_string()),
                location: None,
                latitude: None,
                longitude: None,
            }],
        )
        .await
        .unwrap();

        let found = backend
            .find_song("Test Song", "Test Artist", 180.5)
            .await
            .unwrap();
        assert_eq!(
            found,
            Some(SongMatch {
                song_id: "S1".to_string(),
                artist_id: "A1".to_string()
            })
        );
        assert!(
            backend
                .find_song("Test Song", "Test Artist", 1.0)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_close() {
        let backend = ready().await;
        assert!(backend.health_check().await.unwrap());
        backend.close().await.unwrap();
        assert!(matches!(
            backend.health_check().await,
            Err(DatabaseError::Closed)
        ));
        // Closing twice is harmless
        backend.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparkify.duckdb");
        {
            let backend = DuckDBBackend::new(&path).unwrap();
            backend.initialize().await.unwrap();
            load(&backend, &[song("S1", "Persisted", "A1")]).await.unwrap();
            backend.close().await.unwrap();
        }

        let backend = DuckDBBackend::new(&path).unwrap();
        assert_eq!(backend.db_path(), Some(path.as_path()));
        assert_eq!(count(&backend, Entity::Songs).await, 1);
    }
}
