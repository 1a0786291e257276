//! Ingest command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::create_extractor;
use crate::media::{validate_interval, FfmpegBackend, FrameSampler};
use crate::meta::{MetaDb, RunStatus, VideoRow};
use crate::models::{IngestSummary, VideoAsset};
use crate::pipeline::{IndexOutcome, IndexingPipeline};
use crate::store::{QdrantStore, VectorIndex};
use chrono::Utc;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

pub const SUCCESS_MESSAGE: &str = "Video uploaded and processed successfully";

/// Per-call ingestion options
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Sampling interval in seconds (config default when unset)
    pub interval: Option<f64>,
    /// Name recorded for the upload (source file name when unset)
    pub filename: Option<String>,
}

/// Accepts uploads, stores them and drives them through the indexing pipeline
pub struct IngestService {
    config: Config,
    pipeline: IndexingPipeline,
    db: MetaDb,
}

impl IngestService {
    pub fn new(config: Config, pipeline: IndexingPipeline, db: MetaDb) -> Self {
        Self {
            config,
            pipeline,
            db,
        }
    }

    /// Wire the ffmpeg backend, configured extractor and Qdrant together
    pub async fn connect(config: &Config, db: MetaDb, show_progress: bool) -> Result<Self> {
        let store = QdrantStore::connect(config).await?;
        store.ensure_collection().await?;

        let sampler = FrameSampler::new(
            Arc::new(FfmpegBackend::new(&config.media)),
            config.frame_dir(),
            config.sampling.frame_format.clone(),
        );
        let pipeline = IndexingPipeline::new(sampler, create_extractor(config), Arc::new(store))?
            .with_progress(show_progress);

        Ok(Self::new(config.clone(), pipeline, db))
    }

    /// Ingest one video file
    pub async fn ingest_file(&self, source: &Path, options: IngestOptions) -> Result<IngestSummary> {
        let filename = match options.filename {
            Some(name) => name,
            None => source
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| Error::UnsupportedFormat(source.display().to_string()))?,
        };

        if !self.config.ingest.is_supported_format(&filename) {
            return Err(Error::UnsupportedFormat(format!(
                "{} (allowed: {})",
                filename,
                self.config.ingest.supported_formats.join(", ")
            )));
        }

        let interval = options
            .interval
            .unwrap_or(self.config.sampling.default_interval_secs);
        validate_interval(interval)?;

        let started = Utc::now();
        let mut asset = VideoAsset::new(filename.clone(), PathBuf::new(), 0, started);
        asset.stored_path = self.stored_path_for(&asset.id, &filename);

        info!(video_id = %asset.id, source = %source.display(), interval, "Ingesting video");
        let run = self.db.start_ingestion_run(&asset.id, &filename).await?;

        let (outcome, video) = match self.store_and_index(source, &mut asset, interval).await {
            Ok(stored) => stored,
            Err(e) => {
                if e.is_asset_failure() {
                    warn!(video_id = %asset.id, "Video could not be indexed: {}", e);
                } else {
                    warn!(video_id = %asset.id, "Ingestion failed: {}", e);
                }
                let total_frames = match &e {
                    Error::NoValidFrames { total_frames } => *total_frames,
                    _ => 0,
                };
                self.record_failure(&run.id, total_frames, 0, &e).await;
                return Err(e);
            }
        };

        // Frames are already searchable here; the run still has to be closed
        if let Err(e) = self.db.insert_video(&video).await {
            warn!(
                video_id = %asset.id,
                indexed = outcome.indexed_frames,
                "Frames were indexed but the video row could not be written: {}",
                e
            );
            self.record_failure(&run.id, outcome.total_frames, outcome.indexed_frames, &e)
                .await;
            return Err(e);
        }

        self.db
            .complete_ingestion_run(
                &run.id,
                RunStatus::Completed,
                outcome.total_frames,
                outcome.indexed_frames,
                Some(outcome.skipped.clone()),
            )
            .await?;

        Ok(IngestSummary {
            message: SUCCESS_MESSAGE.to_string(),
            video_id: asset.id,
            total_frames: outcome.total_frames,
            processed_frames: outcome.indexed_frames,
            skipped_frames: outcome.skipped,
        })
    }

    /// Close a run as failed, logging rather than masking the original error
    async fn record_failure(&self, run_id: &str, total: usize, processed: usize, error: &Error) {
        if let Err(db_err) = self
            .db
            .complete_ingestion_run(
                run_id,
                RunStatus::Failed,
                total,
                processed,
                Some(vec![error.to_string()]),
            )
            .await
        {
            warn!("Failed to record ingestion run {}: {}", run_id, db_err);
        }
    }

    /// `<video_dir>/<id>.<ext>`
    fn stored_path_for(&self, video_id: &str, filename: &str) -> PathBuf {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "mp4".to_string());
        self.config.video_dir().join(format!("{}.{}", video_id, ext))
    }

    async fn store_and_index(
        &self,
        source: &Path,
        asset: &mut VideoAsset,
        interval: f64,
    ) -> Result<(IndexOutcome, VideoRow)> {
        let limit = self.config.ingest.max_file_size_bytes();
        asset.size_bytes = copy_capped(source, &asset.stored_path, limit).await?;

        let stored = asset.stored_path.clone();
        let content_hash =
            tokio::task::spawn_blocking(move || compute_file_hash(&stored)).await??;
        let mime_type = mime_guess::from_path(&asset.stored_path)
            .first()
            .map(|m| m.essence_str().to_string());
        debug!(video_id = %asset.id, %content_hash, ?mime_type, "Stored video");

        match self.db.find_videos_by_hash(&content_hash).await {
            Ok(earlier) if !earlier.is_empty() => {
                let ids: Vec<&str> = earlier.iter().map(|v| v.id.as_str()).collect();
                warn!(
                    video_id = %asset.id,
                    "Same content was already ingested as {}",
                    ids.join(", ")
                );
            }
            Ok(_) => {}
            Err(e) => debug!(video_id = %asset.id, "Duplicate lookup failed: {}", e),
        }

        let outcome = match self.run_pipeline(asset, interval).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.discards_upload() {
                    self.discard(asset).await;
                }
                return Err(e);
            }
        };

        let video = VideoRow {
            id: asset.id.clone(),
            original_filename: asset.original_filename.clone(),
            stored_path: asset.stored_path.display().to_string(),
            size_bytes: asset.size_bytes as i64,
            content_hash,
            mime_type,
            frame_dir: self.pipeline.sampler().frame_dir(&asset.id).display().to_string(),
            sampling_interval: interval,
            total_frames: outcome.total_frames as i64,
            processed_frames: outcome.indexed_frames as i64,
            ingested_at: asset.ingested_at.to_rfc3339(),
        };

        Ok((outcome, video))
    }

    async fn run_pipeline(&self, asset: &VideoAsset, interval: f64) -> Result<IndexOutcome> {
        let timeout_secs = self.config.ingest.timeout_secs;
        let limit = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        self.pipeline
            .index_video_within(asset, interval, limit)
            .await
    }

    /// Remove the stored upload and any frames already written
    async fn discard(&self, asset: &VideoAsset) {
        if let Err(e) = tokio::fs::remove_file(&asset.stored_path).await {
            warn!("Failed to remove {}: {}", asset.stored_path.display(), e);
        }
        let frames = self.pipeline.sampler().frame_dir(&asset.id);
        if frames.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&frames).await {
                warn!("Failed to remove {}: {}", frames.display(), e);
            }
        }
    }
}

/// Copy `source` to `dest`, reading at most `limit + 1` bytes.
///
/// An oversized upload leaves nothing behind at `dest`.
pub async fn copy_capped(source: &Path, dest: &Path, limit: u64) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let input = tokio::fs::File::open(source).await?;
    let mut output = tokio::fs::File::create(dest).await?;
    let mut capped = input.take(limit.saturating_add(1));
    let copied = match tokio::io::copy(&mut capped, &mut output).await {
        Ok(n) => output.flush().await.map(|_| n),
        Err(e) => Err(e),
    };

    let copied = match copied {
        Ok(n) => n,
        Err(e) => {
            drop(output);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e.into());
        }
    };

    if copied > limit {
        drop(output);
        tokio::fs::remove_file(dest).await?;
        let size_bytes = tokio::fs::metadata(source)
            .await
            .map(|m| m.len())
            .unwrap_or(copied);
        return Err(Error::FileTooLarge {
            size_bytes,
            limit_bytes: limit,
        });
    }

    Ok(copied)
}

/// blake3 hex digest of a file's contents
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Print an ingestion summary to console
pub fn print_ingest_summary(summary: &IngestSummary) {
    println!("\n✓ {}", summary.message);
    println!("  Video ID: {}", summary.video_id);
    println!("  Frames sampled: {}", summary.total_frames);
    println!("  Frames indexed: {}", summary.processed_frames);

    if !summary.skipped_frames.is_empty() {
        println!("\n⚠ Skipped {} frame(s):", summary.skipped_frames.len());
        for skipped in &summary.skipped_frames {
            println!("  • {}", skipped);
        }
    }
}
