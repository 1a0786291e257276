//! Metadata storage using SQLite
//!
//! A local ledger of what has been ingested:
//! - Videos (stored uploads that reached the vector index)
//! - Ingestion runs (every attempt with its outcome)

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Ingestion run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(Error::Config(format!("Unknown run status: {}", s))),
        }
    }
}

/// An ingested video
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VideoRow {
    pub id: String,
    pub original_filename: String,
    pub stored_path: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub mime_type: Option<String>,
    pub frame_dir: String,
    pub sampling_interval: f64,
    pub total_frames: i64,
    pub processed_frames: i64,
    pub ingested_at: String,
}

/// An ingestion attempt
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IngestionRun {
    pub id: String,
    pub video_id: String,
    pub original_filename: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub total_frames: i64,
    pub processed_frames: i64,
    pub errors_json: Option<String>,
}

impl IngestionRun {
    pub fn new(video_id: String, original_filename: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            video_id,
            original_filename,
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            total_frames: 0,
            processed_frames: 0,
            errors_json: None,
        }
    }

    pub fn get_status(&self) -> Result<RunStatus> {
        self.status.parse()
    }

    /// Messages recorded when the run finished
    pub fn errors(&self) -> Vec<String> {
        self.errors_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }
}

/// Ledger-wide counts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub video_count: usize,
    pub run_count: usize,
    pub failed_run_count: usize,
    pub frames_indexed: usize,
    pub bytes_stored: u64,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Open a database file directly (without full config)
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='videos'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Video Operations =====

    /// Record an indexed video
    pub async fn insert_video(&self, video: &VideoRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO videos (id, original_filename, stored_path, size_bytes, content_hash,
                                mime_type, frame_dir, sampling_interval, total_frames,
                                processed_frames, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&video.id)
        .bind(&video.original_filename)
        .bind(&video.stored_path)
        .bind(video.size_bytes)
        .bind(&video.content_hash)
        .bind(&video.mime_type)
        .bind(&video.frame_dir)
        .bind(video.sampling_interval)
        .bind(video.total_frames)
        .bind(video.processed_frames)
        .bind(&video.ingested_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_video(&self, id: &str) -> Result<Option<VideoRow>> {
        let video = sqlx::query_as::<_, VideoRow>("SELECT * FROM videos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    /// Videos whose stored bytes hash to `content_hash`, oldest first
    pub async fn find_videos_by_hash(&self, content_hash: &str) -> Result<Vec<VideoRow>> {
        let videos = sqlx::query_as::<_, VideoRow>(
            "SELECT * FROM videos WHERE content_hash = ? ORDER BY ingested_at",
        )
        .bind(content_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    /// Most recently ingested first
    pub async fn list_videos(&self) -> Result<Vec<VideoRow>> {
        let videos =
            sqlx::query_as::<_, VideoRow>("SELECT * FROM videos ORDER BY ingested_at DESC, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(videos)
    }

    // ===== Ingestion Run Operations =====

    /// Start a new ingestion run
    pub async fn start_ingestion_run(
        &self,
        video_id: &str,
        original_filename: &str,
    ) -> Result<IngestionRun> {
        let run = IngestionRun::new(video_id.to_string(), original_filename.to_string());
        sqlx::query(
            r#"
            INSERT INTO ingestion_runs (id, video_id, original_filename, started_at, status,
                                        total_frames, processed_frames)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.video_id)
        .bind(&run.original_filename)
        .bind(&run.started_at)
        .bind(&run.status)
        .bind(run.total_frames)
        .bind(run.processed_frames)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    /// Complete an ingestion run
    pub async fn complete_ingestion_run(
        &self,
        id: &str,
        status: RunStatus,
        total_frames: usize,
        processed_frames: usize,
        errors: Option<Vec<String>>,
    ) -> Result<()> {
        let errors_json = errors
            .filter(|e| !e.is_empty())
            .map(|e| serde_json::to_string(&e))
            .transpose()?;
        sqlx::query(
            r#"
            UPDATE ingestion_runs SET
                completed_at = ?,
                status = ?,
                total_frames = ?,
                processed_frames = ?,
                errors_json = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(status.to_string())
        .bind(total_frames as i64)
        .bind(processed_frames as i64)
        .bind(errors_json)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_run(&self, id: &str) -> Result<Option<IngestionRun>> {
        let run = sqlx::query_as::<_, IngestionRun>("SELECT * FROM ingestion_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(run)
    }

    /// Most recent runs first
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<IngestionRun>> {
        let runs = sqlx::query_as::<_, IngestionRun>(
            "SELECT * FROM ingestion_runs ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }

    // ===== Statistics =====

    pub async fn get_stats(&self) -> Result<LedgerStats> {
        let (video_count, frames_indexed, bytes_stored): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(processed_frames), 0), COALESCE(SUM(size_bytes), 0) FROM videos",
        )
        .fetch_one(&self.pool)
        .await?;

        let run_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingestion_runs")
            .fetch_one(&self.pool)
            .await?;

        let failed_run_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ingestion_runs WHERE status = ?")
                .bind(RunStatus::Failed.to_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(LedgerStats {
            video_count: video_count as usize,
            run_count: run_count as usize,
            failed_run_count: failed_run_count as usize,
            frames_indexed: frames_indexed as usize,
            bytes_stored: bytes_stored as u64,
        })
    }
}
