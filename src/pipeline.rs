//! End-to-end ETL orchestration
//!
//! Runs discovery, merge, projection, staging and load for each input tree.
//! Failures are recorded per entity in the returned reports; the other
//! entities still load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::database::{DatabaseBackend, DatabaseError, DatabaseResult, LoadPlan};
use crate::ingest::{
    DATA_FILE_EXTENSION, DiscoveredFile, MergeStats, discover_files, merge_documents, merge_lines,
};
use crate::models::Entity;
use crate::staging::{StagingError, StagingRecord, stage};
use crate::transform::{
    ProjectionError, project_artists, project_song_plays, project_songs, project_time,
    project_users, song_play_events,
};

/// Why one entity failed to load
#[derive(Debug, thiserror::Error)]
enum EntityError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result of loading one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOutcome {
    pub entity: Entity,
    /// Rows produced by the projection, after dedup
    pub rows_projected: usize,
    /// Rows inserted or updated, as reported by the store
    pub rows_affected: u64,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl EntityOutcome {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            rows_projected: 0,
            rows_affected: 0,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of processing one input tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub root: PathBuf,
    pub files_discovered: usize,
    pub merge: MergeStats,
    /// Discovery failures; no entity is loaded when this is non-empty
    pub errors: Vec<String>,
    pub entities: Vec<EntityOutcome>,
    pub duration_ms: u64,
}

impl SourceReport {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            files_discovered: 0,
            merge: MergeStats::new(),
            errors: Vec::new(),
            entities: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.entities.iter().all(EntityOutcome::is_success)
    }

    pub fn outcome(&self, entity: Entity) -> Option<&EntityOutcome> {
        self.entities.iter().find(|o| o.entity == entity)
    }
}

/// Result of a full run over both input trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub song_data: SourceReport,
    pub log_data: SourceReport,
}

impl RunReport {
    /// True when every entity of both sources loaded
    pub fn is_success(&self) -> bool {
        self.song_data.is_success() && self.log_data.is_success()
    }

    /// Entity outcomes in load order
    pub fn outcomes(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.song_data
            .entities
            .iter()
            .chain(self.log_data.entities.iter())
    }

    pub fn failed_entities(&self) -> Vec<Entity> {
        self.outcomes()
            .filter(|o| !o.is_success())
            .map(|o| o.entity)
            .collect()
    }
}

/// ETL pipeline over one store
pub struct Pipeline<B: DatabaseBackend> {
    backend: B,
}

impl<B: DatabaseBackend> Pipeline<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create the schema if needed
    pub async fn initialize(&self) -> DatabaseResult<()> {
        self.backend.initialize().await
    }

    /// Run the song pipeline, then the log pipeline
    ///
    /// Song plays resolve their song keys against the songs table, so songs
    /// must be loaded first.
    pub async fn run(&self, song_root: &Path, log_root: &Path) -> RunReport {
        let song_data = self.process_song_data(song_root).await;
        let log_data = self.process_log_data(log_root).await;
        RunReport {
            song_data,
            log_data,
        }
    }

    /// Load songs and artists from a song metadata tree
    pub async fn process_song_data(&self, root: &Path) -> SourceReport {
        let start = Instant::now();
        let mut report = SourceReport::new(root);
        tracing::info!("Processing song data from {}", root.display());

        let Some(files) = Self::discover(root, &mut report) else {
            report.duration_ms = start.elapsed().as_millis() as u64;
            return report;
        };
        let (songs, stats) = merge_documents(&files);
        report.merge = stats;
        tracing::debug!("Song data columns: {}", songs.columns().join(", "));

        report.entities.push(self.load_entity(project_songs(&songs)).await);
        report
            .entities
            .push(self.load_entity(project_artists(&songs)).await);

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Load time, users and song plays from an event log tree
    ///
    /// Only "NextSong" events feed the three projections.
    pub async fn process_log_data(&self, root: &Path) -> SourceReport {
        let start = Instant::now();
        let mut report = SourceReport::new(root);
        tracing::info!("Processing log data from {}", root.display());

        let Some(files) = Self::discover(root, &mut report) else {
            report.duration_ms = start.elapsed().as_millis() as u64;
            return report;
        };
        let (logs, stats) = merge_lines(&files);
        report.merge = stats;
        tracing::debug!("Log data columns: {}", logs.columns().join(", "));

        let events = song_play_events(&logs);
        tracing::info!(
            "{} of {} log events are song plays",
            events.len(),
            logs.len()
        );

        report.entities.push(self.load_entity(project_time(&events)).await);
        report
            .entities
            .push(self.load_entity(project_users(&events)).await);
        report
            .entities
            .push(self.load_entity(project_song_plays(&events)).await);

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    fn discover(root: &Path, report: &mut SourceReport) -> Option<Vec<DiscoveredFile>> {
        match discover_files(root, DATA_FILE_EXTENSION) {
            Ok(files) => {
                report.files_discovered = files.len();
                tracing::info!("{} files found in {}", files.len(), root.display());
                Some(files)
            }
            Err(e) => {
                tracing::error!("Discovery failed for {}: {}", root.display(), e);
                report.errors.push(e.to_string());
                None
            }
        }
    }

    /// Stage and load one projection, folding any failure into the outcome
    async fn load_entity<R: StagingRecord>(
        &self,
        projected: Result<Vec<R>, ProjectionError>,
    ) -> EntityOutcome {
        let start = Instant::now();
        let mut outcome = EntityOutcome::new(R::ENTITY);

        match self.stage_and_load(projected, &mut outcome).await {
            Ok(()) => tracing::info!(
                "Loaded {}: {} rows projected, {} rows affected",
                R::ENTITY,
                outcome.rows_projected,
                outcome.rows_affected
            ),
            Err(e) => {
                tracing::error!("Failed to load {}: {}", R::ENTITY, e);
                outcome.error = Some(e.to_string());
            }
        }

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        outcome
    }

    async fn stage_and_load<R: StagingRecord>(
        &self,
        projected: Result<Vec<R>, ProjectionError>,
        outcome: &mut EntityOutcome,
    ) -> Result<(), EntityError> {
        let rows = projected?;
        outcome.rows_projected = rows.len();

        let staged = stage(&rows)?;
        let loaded = self
            .backend
            .load(&LoadPlan::for_entity(R::ENTITY), &staged)
            .await?;
        outcome.rows_affected = loaded.rows_affected;
        Ok(())
    }
}
