//! Indexing pipeline
//!
//! Sampler → extractor → record assembly → one batch upsert. A frame whose
//! features cannot be computed is skipped; the video fails only when nothing
//! survives or the store rejects the batch.

use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::media::FrameSampler;
use crate::models::{FeatureRecord, FrameMetadata, SampledFrame, VideoAsset};
use crate::progress::FrameProgress;
use crate::store::{check_dimension, VectorIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counts reported for one indexed video
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexOutcome {
    /// Frames selected by the sampler
    pub total_frames: usize,
    /// Frames stored in the vector index
    pub indexed_frames: usize,
    /// Frames read from the stream, selected or not
    pub frames_decoded: u64,
    pub stride: u64,
    pub frame_rate: f64,
    /// One message per skipped frame
    pub skipped: Vec<String>,
}

/// A frame that could not be turned into a feature record
#[derive(Debug)]
pub struct FrameFailure {
    pub frame: SampledFrame,
    pub error: Error,
}

impl FrameFailure {
    pub fn describe(&self) -> String {
        format!(
            "frame {} ({}): {}",
            self.frame.index,
            self.frame.location.display(),
            self.error
        )
    }
}

/// Sampled frames partitioned into indexable records and failures
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub records: Vec<FeatureRecord>,
    pub failures: Vec<FrameFailure>,
}

/// Compute a record for every frame, keeping failures alongside successes.
///
/// Frames left over when `cancel` fires are not visited.
pub fn extract_records(
    extractor: &dyn FeatureExtractor,
    asset: &VideoAsset,
    frames: Vec<SampledFrame>,
    progress: &FrameProgress,
    cancel: &CancellationToken,
) -> ExtractionReport {
    let dimension = extractor.dimension();

    frames
        .into_iter()
        .take_while(|_| !cancel.is_cancelled())
        .fold(ExtractionReport::default(), |mut report, frame| {
            let built = extractor.extract(&frame.location).and_then(|vector| {
                check_dimension(dimension, vector.len())?;
                let metadata = FrameMetadata::new(asset, &frame)?;
                Ok(FeatureRecord { vector, metadata })
            });
            progress.advance();

            match built {
                Ok(record) => report.records.push(record),
                Err(error) => {
                    let failure = FrameFailure { frame, error };
                    warn!(video_id = %asset.id, "Skipping {}", failure.describe());
                    report.failures.push(failure);
                }
            }
            report
        })
}

/// Drives one video from container to vector index
#[derive(Clone)]
pub struct IndexingPipeline {
    sampler: FrameSampler,
    extractor: Arc<dyn FeatureExtractor>,
    index: Arc<dyn VectorIndex>,
    show_progress: bool,
}

impl IndexingPipeline {
    pub fn new(
        sampler: FrameSampler,
        extractor: Arc<dyn FeatureExtractor>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        check_dimension(index.dimension(), extractor.dimension()).map_err(|_| {
            Error::Config(format!(
                "extractor '{}' produces {} values but the index expects {}",
                extractor.name(),
                extractor.dimension(),
                index.dimension()
            ))
        })?;

        Ok(Self {
            sampler,
            extractor,
            index,
            show_progress: false,
        })
    }

    /// Draw a per-frame progress bar while extracting
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    /// Sample, extract and index one video.
    ///
    /// Sampler errors propagate unchanged. Per-frame extraction errors are
    /// collected in the outcome. Zero surviving frames is `NoValidFrames` and
    /// the store is never called; a rejected batch is `IndexInsertFailed`.
    pub async fn index_video(&self, asset: &VideoAsset, interval_secs: f64) -> Result<IndexOutcome> {
        self.index_video_within(asset, interval_secs, None).await
    }

    /// [`IndexingPipeline::index_video`] with an optional time limit.
    ///
    /// When sampling and extraction overrun the limit the blocking stage is
    /// cancelled and awaited, so no frame is written after `Timeout` returns.
    /// An upsert that overruns is reported as `IndexInsertFailed`.
    pub async fn index_video_within(
        &self,
        asset: &VideoAsset,
        interval_secs: f64,
        limit: Option<Duration>,
    ) -> Result<IndexOutcome> {
        let deadline = limit.map(|l| Instant::now() + l);
        let cancel = CancellationToken::new();

        let sampler = self.sampler.clone();
        let extractor = Arc::clone(&self.extractor);
        let job_asset = asset.clone();
        let job_cancel = cancel.clone();
        let show_progress = self.show_progress;

        let mut handle = tokio::task::spawn_blocking(move || -> Result<_> {
            let sampling = sampler.sample_until(
                &job_asset.stored_path,
                interval_secs,
                &job_asset.id,
                &job_cancel,
            )?;

            let progress = if show_progress {
                FrameProgress::start(sampling.frames.len(), &job_asset.id)
            } else {
                FrameProgress::hidden()
            };
            let report = extract_records(
                extractor.as_ref(),
                &job_asset,
                sampling.frames.clone(),
                &progress,
                &job_cancel,
            );
            progress.finish("extracted");

            if job_cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            Ok((sampling, report))
        });

        let joined = match deadline {
            None => handle.await,
            Some(deadline) => {
                let waited = tokio::time::timeout_at(deadline, &mut handle).await;
                if let Ok(joined) = waited {
                    joined
                } else {
                    cancel.cancel();
                    let secs = limit.map(|l| l.as_secs()).unwrap_or_default();
                    warn!(video_id = %asset.id, secs, "Indexing timed out, stopping sampler");
                    if let Err(e) = handle.await {
                        warn!(video_id = %asset.id, "Sampler task failed after cancel: {}", e);
                    }
                    return Err(Error::Timeout(secs));
                }
            }
        };
        let (sampling, report) = joined??;

        let total_frames = sampling.frames.len();
        let skipped: Vec<String> = report.failures.iter().map(FrameFailure::describe).collect();

        if report.records.is_empty() {
            warn!(
                video_id = %asset.id,
                total_frames,
                "No frame produced a feature vector"
            );
            return Err(Error::NoValidFrames { total_frames });
        }

        let indexed_frames = report.records.len();
        debug!(video_id = %asset.id, indexed_frames, "Submitting batch");

        let upsert = self.index.upsert(report.records);
        let stored = match deadline {
            None => upsert.await,
            Some(deadline) => tokio::time::timeout_at(deadline, upsert)
                .await
                .unwrap_or_else(|_| {
                    Err(Error::IndexInsertFailed(
                        "upsert did not finish before the ingestion time limit".to_string(),
                    ))
                }),
        };
        stored.map_err(|e| match e {
            Error::IndexInsertFailed(_) => e,
            other => Error::IndexInsertFailed(other.to_string()),
        })?;

        info!(
            video_id = %asset.id,
            total_frames,
            indexed_frames,
            skipped = skipped.len(),
            "Indexed video"
        );

        Ok(IndexOutcome {
            total_frames,
            indexed_frames,
            frames_decoded: sampling.frames_decoded,
            stride: sampling.stride,
            frame_rate: sampling.frame_rate,
            skipped,
        })
    }
}
