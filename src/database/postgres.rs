//! PostgreSQL database backend implementation
//!
//! Holds one `tokio-postgres` connection for the whole run. Staged tables
//! are streamed to the server with `COPY ... FROM STDIN`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio::sync::Mutex;
use tokio_postgres::CopyInSink;

use super::reconcile::{LoadPlan, quote_ident};
use super::schema::{DatabaseSchema, song_sql};
use super::{
    DatabaseBackend, DatabaseError, DatabaseResult, LoadOutcome, QueryResult, SongMatch,
};
use crate::staging::StagedTable;

/// PostgreSQL database backend
pub struct PostgresBackend {
    /// Connection string
    connection_string: String,
    /// Taken out by [`DatabaseBackend::close`]
    client: Mutex<Option<tokio_postgres::Client>>,
}

impl PostgresBackend {
    /// Connect to PostgreSQL
    ///
    /// The connection task is spawned on the current tokio runtime.
    pub async fn new(connection_string: &str) -> DatabaseResult<Self> {
        let (client, connection) =
            tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
                .await
                .map_err(|e| {
                    DatabaseError::ConnectionFailed(format!(
                        "Failed to connect to PostgreSQL: {}",
                        e
                    ))
                })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        let backend = Self {
            connection_string: connection_string.to_string(),
            client: Mutex::new(Some(client)),
        };
        tracing::info!(
            "Connected to PostgreSQL ({})",
            backend.connection_string_masked()
        );
        Ok(backend)
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> String {
        crate::config::mask_password(&self.connection_string)
    }

    fn copy_from_stdin_sql(plan: &LoadPlan, stage: &str) -> String {
        let columns: Vec<String> = plan
            .stage_column_names()
            .into_iter()
            .map(quote_ident)
            .collect();
        format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT csv, HEADER true)",
            quote_ident(stage),
            columns.join(", ")
        )
    }

    /// Convert a PostgreSQL row to a JSON value
    fn row_to_json(row: &tokio_postgres::Row, columns: &[String]) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        for (i, col_name) in columns.iter().enumerate() {
            let value = Self::get_column_value(row, i);
            map.insert(col_name.clone(), value);
        }

        serde_json::Value::Object(map)
    }

    /// Get a column value as JSON
    fn get_column_value(row: &tokio_postgres::Row, idx: usize) -> serde_json::Value {
        if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
            return v
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
            return v.map(Into::into).unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
            return v.map(Into::into).unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
            return v
                .map(serde_json::Value::Bool)
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
            return v
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<chrono::NaiveDateTime>>(idx) {
            return v
                .map(|ts| {
                    serde_json::Value::String(
                        ts.format(crate::models::records::TIMESTAMP_FORMAT).to_string(),
                    )
                })
                .unwrap_or(serde_json::Value::Null);
        }

        serde_json::Value::Null
    }
}

#[async_trait(?Send)]
impl DatabaseBackend for PostgresBackend {
    async fn initialize(&self) -> DatabaseResult<()> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(DatabaseError::Closed)?;

        client
            .batch_execute(DatabaseSchema::create_tables_sql())
            .await
            .map_err(|e| {
                DatabaseError::MigrationFailed(format!("Failed to create tables: {}", e))
            })?;

        tracing::info!("PostgreSQL schema ready");
        Ok(())
    }

    async fn drop_schema(&self) -> DatabaseResult<()> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(DatabaseError::Closed)?;

        client
            .batch_execute(DatabaseSchema::drop_all_tables_sql())
            .await
            .map_err(|e| DatabaseError::MigrationFailed(format!("Failed to drop tables: {}", e)))?;

        tracing::info!("PostgreSQL schema dropped");
        Ok(())
    }

    async fn load(&self, plan: &LoadPlan, staged: &StagedTable) -> DatabaseResult<LoadOutcome> {
        plan.check(staged)?;
        if staged.is_empty() {
            tracing::debug!("Nothing staged for {}, skipping load", plan.entity);
            return Ok(LoadOutcome::empty(plan.entity));
        }

        let stage = plan.stage_table_name();
        let insert_sql = plan.insert_select_sql(&stage);
        tracing::debug!("{}: {}", plan.entity, insert_sql);

        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(DatabaseError::Closed)?;

        // Dropping the transaction without commit rolls it back.
        let tx = client.transaction().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
        })?;

        tx.batch_execute(&plan.create_stage_sql(&stage))
            .await
            .map_err(|e| plan.load_error("create stage table", e))?;

        let copy_sql = Self::copy_from_stdin_sql(plan, &stage);
        let sink: CopyInSink<Bytes> = tx
            .copy_in(copy_sql.as_str())
            .await
            .map_err(|e| plan.load_error("bulk copy", e))?;
        futures::pin_mut!(sink);
        sink.send(Bytes::copy_from_slice(staged.data()))
            .await
            .map_err(|e| plan.load_error("bulk copy", e))?;
        let rows_staged = sink
            .as_mut()
            .finish()
            .await
            .map_err(|e| plan.load_error("bulk copy", e))?;

        let rows_affected = tx
            .execute(insert_sql.as_str(), &[])
            .await
            .map_err(|e| plan.load_error("reconcile", e))?;

        tx.batch_execute(&plan.drop_stage_sql(&stage))
            .await
            .map_err(|e| plan.load_error("drop stage table", e))?;

        tx.commit().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("Failed to commit {}: {}", plan.entity, e))
        })?;

        Ok(LoadOutcome {
            entity: plan.entity,
            rows_staged,
            rows_affected,
        })
    }

    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(DatabaseError::Closed)?;

        let rows = client
            .query(sql, &[])
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let json_rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| Self::row_to_json(row, &columns))
            .collect();

        Ok(QueryResult {
            columns,
            rows: json_rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn find_song(
        &self,
        title: &str,
        artist_name: &str,
        duration: f64,
    ) -> DatabaseResult<Option<SongMatch>> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(DatabaseError::Closed)?;

        let rows = client
            .query(
                song_sql::FIND_BY_TITLE_ARTIST_DURATION,
                &[&title, &artist_name, &duration],
            )
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Song lookup failed: {}", e)))?;

        rows.first()
            .map(|row| -> DatabaseResult<SongMatch> {
                Ok(SongMatch {
                    song_id: row
                        .try_get(0)
                        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
                    artist_id: row
                        .try_get(1)
                        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
                })
            })
            .transpose()
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let result = self.execute_query("SELECT 1 as healthy").await?;
        Ok(!result.rows.is_empty())
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) -> DatabaseResult<()> {
        // Dropping the client ends the spawned connection task.
        self.client.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entity;

    #[test]
    fn test_copy_from_stdin_sql() {
        let plan = LoadPlan::for_entity(Entity::Users);
        assert_eq!(
            PostgresBackend::copy_from_stdin_sql(&plan, "stage_users_x"),
            "COPY \"stage_users_x\" (\"user_id\", \"first_name\", \"last_name\", \"gender\", \
             \"level\") FROM STDIN WITH (FORMAT csv, HEADER true)"
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        // Nothing listens on port 1
        let result = PostgresBackend::new("host=127.0.0.1 port=1 user=nobody dbname=none").await;
        assert!(matches!(result, Err(DatabaseError::ConnectionFailed(_))));
    }
}
