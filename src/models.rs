//! Domain records shared by the sampler, pipeline and vector store

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// An uploaded video stored on disk for the duration of an ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAsset {
    /// `<stem>_<YYYYmmddHHMMSS>_<suffix>`; also names the frame directory
    pub id: String,
    pub original_filename: String,
    pub stored_path: PathBuf,
    pub size_bytes: u64,
    pub ingested_at: DateTime<Utc>,
}

impl VideoAsset {
    pub fn new(
        original_filename: impl Into<String>,
        stored_path: PathBuf,
        size_bytes: u64,
        ingested_at: DateTime<Utc>,
    ) -> Self {
        let original_filename = original_filename.into();
        Self {
            id: generate_video_id(&original_filename, ingested_at),
            original_filename,
            stored_path,
            size_bytes,
            ingested_at,
        }
    }
}

/// Build a video identity from the filename stem and ingestion time.
///
/// A random suffix keeps two uploads of the same file within one second apart.
pub fn generate_video_id(original_filename: &str, at: DateTime<Utc>) -> String {
    let stem = Path::new(original_filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_stem)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", stem, at.format("%Y%m%d%H%M%S"), &suffix[..8])
}

fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// One frame selected by the sampler and written to blob storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledFrame {
    /// Zero-based index in the decoded stream
    pub index: u64,
    /// Seconds from stream start (`index / frame_rate`)
    pub timestamp: f64,
    pub location: PathBuf,
}

/// Typed payload stored alongside every frame vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub image_path: String,
    pub frame_timestamp: f64,
    pub video_filename: String,
    /// RFC 3339, UTC
    pub upload_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u64>,
}

impl FrameMetadata {
    pub fn new(asset: &VideoAsset, frame: &SampledFrame) -> Result<Self> {
        if !frame.timestamp.is_finite() || frame.timestamp < 0.0 {
            return Err(Error::FrameExtractionFailed(format!(
                "frame {} has invalid timestamp {}",
                frame.index, frame.timestamp
            )));
        }

        let image_path = frame.location.to_string_lossy().into_owned();
        if image_path.is_empty() {
            return Err(Error::FrameExtractionFailed(format!(
                "frame {} has no storage location",
                frame.index
            )));
        }

        Ok(Self {
            image_path,
            frame_timestamp: frame.timestamp,
            video_filename: asset.original_filename.clone(),
            upload_timestamp: asset.ingested_at.to_rfc3339(),
            video_id: Some(asset.id.clone()),
            frame_index: Some(frame.index),
        })
    }
}

/// A frame vector with its payload, ready for the vector store
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub vector: Vec<f32>,
    pub metadata: FrameMetadata,
}

/// One ranked search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub id: String,
    pub score: f32,
    pub metadata: FrameMetadata,
}

/// Outcome reported to the ingestion caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub message: String,
    pub video_id: String,
    pub total_frames: usize,
    pub processed_frames: usize,
    pub skipped_frames: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_video_id_uses_stem_and_timestamp() {
        let id = generate_video_id("holiday clip.mp4", fixed_time());
        assert!(id.starts_with("holiday_clip_20240309140507_"));
        assert_eq!(id.len(), "holiday_clip_20240309140507_".len() + 8);
    }

    #[test]
    fn test_video_ids_do_not_collide_within_a_second() {
        let a = generate_video_id("clip.mp4", fixed_time());
        let b = generate_video_id("clip.mp4", fixed_time());
        assert_ne!(a, b);
    }

    #[test]
    fn test_video_id_sanitizes_and_falls_back() {
        let id = generate_video_id("../ü.mp4", fixed_time());
        assert!(id.starts_with("__20240309140507_"));

        let id = generate_video_id("", fixed_time());
        assert!(id.starts_with("video_20240309140507_"));
    }

    #[test]
    fn test_frame_metadata_from_asset() {
        let asset = VideoAsset::new("clip.mp4", PathBuf::from("/v/clip.mp4"), 10, fixed_time());
        let frame = SampledFrame {
            index: 60,
            timestamp: 2.0,
            location: PathBuf::from("/f/clip/frame_60.jpg"),
        };

        let meta = FrameMetadata::new(&asset, &frame).unwrap();
        assert_eq!(meta.image_path, "/f/clip/frame_60.jpg");
        assert_eq!(meta.frame_timestamp, 2.0);
        assert_eq!(meta.video_filename, "clip.mp4");
        assert_eq!(meta.upload_timestamp, "2024-03-09T14:05:07+00:00");
        assert_eq!(meta.frame_index, Some(60));
    }

    #[test]
    fn test_frame_metadata_rejects_negative_timestamp() {
        let asset = VideoAsset::new("clip.mp4", PathBuf::from("/v/clip.mp4"), 10, fixed_time());
        let frame = SampledFrame {
            index: 0,
            timestamp: -1.0,
            location: PathBuf::from("/f/frame_0.jpg"),
        };
        assert!(FrameMetadata::new(&asset, &frame).is_err());
    }

    #[test]
    fn test_frame_metadata_tolerates_missing_optional_fields() {
        let json = r#"{
            "image_path": "/f/frame_0.jpg",
            "frame_timestamp": 0.0,
            "video_filename": "clip.mp4",
            "upload_timestamp": "2024-03-09T14:05:07+00:00"
        }"#;
        let meta: FrameMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.video_id, None);
        assert_eq!(meta.frame_index, None);
    }
}
