//! Status, health and ledger listing commands

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::{IngestionRun, LedgerStats, MetaDb, VideoRow};
use crate::store::{QdrantStore, VectorIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    pub status: String,
}

/// Make sure the collection exists; any failure is surfaced to the caller
pub async fn cmd_health(index: &dyn VectorIndex) -> Result<HealthInfo> {
    index.ensure_collection().await?;
    Ok(HealthInfo {
        status: "healthy".to_string(),
    })
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub video_dir: String,
    pub frame_dir: String,
    pub qdrant_url: String,
    pub collection_name: String,
    pub vector_dim: usize,
    pub qdrant_connected: bool,
    pub collection_exists: bool,
    pub qdrant_points: u64,
    pub ledger: LedgerStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &MetaDb, store: &QdrantStore) -> Result<StatusInfo> {
    info!("Getting status");

    let ledger = db.get_stats().await?;

    let (qdrant_connected, collection_exists, qdrant_points) =
        match store.get_collection_info().await {
            Ok(Some(info)) => (true, true, info.points_count),
            Ok(None) => (true, false, 0),
            Err(e) => {
                debug!("Qdrant connection error: {:?}", e);
                (false, false, 0)
            }
        };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        video_dir: config.video_dir().display().to_string(),
        frame_dir: config.frame_dir().display().to_string(),
        qdrant_url: config.qdrant_url.clone(),
        collection_name: config.collection_name.clone(),
        vector_dim: config.vector_dim,
        qdrant_connected,
        collection_exists,
        qdrant_points,
        ledger,
    })
}

/// Ingested videos, newest first
pub async fn cmd_list_videos(db: &MetaDb) -> Result<Vec<VideoRow>> {
    info!("Listing videos");
    db.list_videos().await
}

/// One ingested video by id
pub async fn cmd_video_info(db: &MetaDb, video_id: &str) -> Result<VideoRow> {
    db.get_video(video_id)
        .await?
        .ok_or_else(|| Error::VideoNotFound(video_id.to_string()))
}

/// Most recent ingestion runs
pub async fn cmd_list_runs(db: &MetaDb, limit: usize) -> Result<Vec<IngestionRun>> {
    db.list_runs(limit).await
}

/// One ingestion run by id
pub async fn cmd_run_info(db: &MetaDb, run_id: &str) -> Result<IngestionRun> {
    db.get_run(run_id)
        .await?
        .ok_or_else(|| Error::RunNotFound(run_id.to_string()))
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 vidsim Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Videos: {}", status.video_dir);
    println!("Frames: {}", status.frame_dir);
    println!("\nQdrant:");
    println!("  URL: {}", status.qdrant_url);
    println!("  Collection: {} ({} dims)", status.collection_name, status.vector_dim);

    let connection_status = if status.qdrant_connected {
        if status.collection_exists {
            "✓ Connected"
        } else {
            "⚠ Connected (collection not created - run 'vidsim db init' to create)"
        }
    } else {
        "✗ Not connected"
    };
    println!("  Status: {}", connection_status);
    println!("  Points: {}", status.qdrant_points);
    println!("\nLedger:");
    println!("  Videos: {}", status.ledger.video_count);
    println!("  Frames indexed: {}", status.ledger.frames_indexed);
    println!("  Bytes stored: {}", status.ledger.bytes_stored);
    println!(
        "  Ingestion runs: {} ({} failed)",
        status.ledger.run_count, status.ledger.failed_run_count
    );
}

/// Print the video list to console
pub fn print_videos(videos: &[VideoRow]) {
    println!("\n🎞 Ingested Videos\n");

    if videos.is_empty() {
        println!("No videos ingested. Use 'vidsim ingest <file>' to add one.");
        return;
    }

    for video in videos {
        print_video(video);
        println!();
    }
}

pub fn print_video(video: &VideoRow) {
    println!("• {} [{}]", video.original_filename, video.id);
    println!("  Stored: {} ({} bytes)", video.stored_path, video.size_bytes);
    println!("  Frames: {}", video.frame_dir);
    println!(
        "  Indexed {}/{} frames every {}s",
        video.processed_frames, video.total_frames, video.sampling_interval
    );
    println!("  Hash: {}", video.content_hash);
    println!("  Ingested: {}", video.ingested_at);
}

/// Print the run list to console
pub fn print_runs(runs: &[IngestionRun]) {
    println!("\n🧾 Ingestion Runs\n");

    if runs.is_empty() {
        println!("No ingestion runs recorded.");
        return;
    }

    for run in runs {
        print_run(run);
        println!();
    }
}

pub fn print_run(run: &IngestionRun) {
    println!("• {} [{}] {}", run.original_filename, run.status, run.id);
    println!("  Video: {}", run.video_id);
    println!(
        "  Frames: {}/{} indexed",
        run.processed_frames, run.total_frames
    );
    println!("  Started: {}", run.started_at);
    if let Some(done) = &run.completed_at {
        println!("  Completed: {}", done);
    }
    for error in run.errors() {
        println!("  ! {}", error);
    }
}
