//! Frame sampling
//!
//! Walks a decoded video stream and keeps every `stride`-th frame, where the
//! stride is the sampling interval expressed in frames. Selected frames are
//! written as images under a directory named after the video identity.

mod ffmpeg;

pub use ffmpeg::*;

use crate::error::{Error, Result};
use crate::models::SampledFrame;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A decoded, sequential stream of frames
pub trait FrameSource: Send {
    /// Frames per second reported by the container
    fn frame_rate(&self) -> f64;

    /// Next decoded frame, or `None` once the stream is exhausted.
    ///
    /// A decode failure part-way through also ends the stream.
    fn next_frame(&mut self) -> Option<RgbImage>;
}

/// Opens video containers
pub trait VideoBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

/// Convert a time interval into a frame stride (always at least 1)
pub fn compute_stride(interval_secs: f64, frame_rate: f64) -> u64 {
    let frames = (interval_secs * frame_rate).floor();
    if frames.is_finite() && frames >= 1.0 {
        frames as u64
    } else {
        1
    }
}

/// Timestamp in seconds of the frame at `index`
pub fn frame_timestamp(index: u64, frame_rate: f64) -> f64 {
    index as f64 / frame_rate
}

/// Reject zero, negative and non-finite intervals
pub fn validate_interval(interval_secs: f64) -> Result<()> {
    if interval_secs.is_finite() && interval_secs > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInterval(interval_secs))
    }
}

/// Result of sampling one video
#[derive(Debug, Clone)]
pub struct SamplingOutcome {
    /// Selected frames in stream order
    pub frames: Vec<SampledFrame>,
    /// Every frame read from the stream, selected or not
    pub frames_decoded: u64,
    pub frame_rate: f64,
    pub stride: u64,
}

/// Selects frames at a fixed stride and persists them as images
#[derive(Clone)]
pub struct FrameSampler {
    backend: Arc<dyn VideoBackend>,
    frame_root: PathBuf,
    frame_format: String,
}

impl FrameSampler {
    pub fn new(
        backend: Arc<dyn VideoBackend>,
        frame_root: impl Into<PathBuf>,
        frame_format: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            frame_root: frame_root.into(),
            frame_format: frame_format.into().trim_start_matches('.').to_lowercase(),
        }
    }

    /// Directory holding the frames of one video
    pub fn frame_dir(&self, video_id: &str) -> PathBuf {
        self.frame_root.join(video_id)
    }

    /// Sample `video_path`, writing frames under `<frame_root>/<video_id>/`.
    ///
    /// The stream is read to the end before returning.
    pub fn sample(
        &self,
        video_path: &Path,
        interval_secs: f64,
        video_id: &str,
    ) -> Result<SamplingOutcome> {
        self.sample_until(video_path, interval_secs, video_id, &CancellationToken::new())
    }

    /// Like [`FrameSampler::sample`], but stops with `Cancelled` before the
    /// next frame once `cancel` fires. Dropping the source stops the decoder.
    pub fn sample_until(
        &self,
        video_path: &Path,
        interval_secs: f64,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SamplingOutcome> {
        validate_interval(interval_secs)?;

        let mut source = self.backend.open(video_path)?;
        let frame_rate = source.frame_rate();
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(Error::UnreadableMedia(format!(
                "{}: no usable frame rate ({})",
                video_path.display(),
                frame_rate
            )));
        }

        let stride = compute_stride(interval_secs, frame_rate);
        let out_dir = self.frame_dir(video_id);
        std::fs::create_dir_all(&out_dir).map_err(|e| {
            Error::FrameExtractionFailed(format!(
                "cannot create frame directory {}: {}",
                out_dir.display(),
                e
            ))
        })?;

        debug!(
            video_id,
            frame_rate,
            stride,
            dir = %out_dir.display(),
            "Sampling frames"
        );

        let mut frames = Vec::new();
        let mut index: u64 = 0;

        while let Some(frame) = source.next_frame() {
            if cancel.is_cancelled() {
                debug!(video_id, decoded = index, "Sampling cancelled");
                return Err(Error::Cancelled);
            }
            if index % stride == 0 {
                let location = out_dir.join(format!("frame_{}.{}", index, self.frame_format));
                frame.save(&location).map_err(|e| {
                    Error::FrameExtractionFailed(format!(
                        "cannot write frame {} to {}: {}",
                        index,
                        location.display(),
                        e
                    ))
                })?;

                frames.push(SampledFrame {
                    index,
                    timestamp: frame_timestamp(index, frame_rate),
                    location,
                });
            }
            index += 1;
        }

        info!(
            video_id,
            decoded = index,
            sampled = frames.len(),
            "Finished sampling"
        );

        Ok(SamplingOutcome {
            frames,
            frames_decoded: index,
            frame_rate,
            stride,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Synthetic video backends for sampler and pipeline tests

    use super::*;
    use image::Rgb;

    /// Generates `total_frames` solid frames whose colour drifts with the index
    pub struct SyntheticBackend {
        pub frame_rate: f64,
        pub total_frames: u64,
    }

    struct SyntheticSource {
        frame_rate: f64,
        total_frames: u64,
        next: u64,
    }

    impl FrameSource for SyntheticSource {
        fn frame_rate(&self) -> f64 {
            self.frame_rate
        }

        fn next_frame(&mut self) -> Option<RgbImage> {
            if self.next >= self.total_frames {
                return None;
            }
            let shade = (self.next % 256) as u8;
            self.next += 1;
            Some(RgbImage::from_pixel(8, 8, Rgb([shade, 255 - shade, 128])))
        }
    }

    impl VideoBackend for SyntheticBackend {
        fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>> {
            Ok(Box::new(SyntheticSource {
                frame_rate: self.frame_rate,
                total_frames: self.total_frames,
                next: 0,
            }))
        }
    }

    /// Synthetic frames that each take `delay` to decode
    pub struct SlowBackend {
        pub frame_rate: f64,
        pub total_frames: u64,
        pub delay: std::time::Duration,
    }

    struct SlowSource {
        inner: SyntheticSource,
        delay: std::time::Duration,
    }

    impl FrameSource for SlowSource {
        fn frame_rate(&self) -> f64 {
            self.inner.frame_rate
        }

        fn next_frame(&mut self) -> Option<RgbImage> {
            std::thread::sleep(self.delay);
            self.inner.next_frame()
        }
    }

    impl VideoBackend for SlowBackend {
        fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>> {
            Ok(Box::new(SlowSource {
                inner: SyntheticSource {
                    frame_rate: self.frame_rate,
                    total_frames: self.total_frames,
                    next: 0,
                },
                delay: self.delay,
            }))
        }
    }

    /// Backend that cannot open anything
    pub struct BrokenBackend;

    impl VideoBackend for BrokenBackend {
        fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
            Err(Error::UnreadableMedia(format!(
                "{}: cannot open container",
                path.display()
            )))
        }
    }
}
