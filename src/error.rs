//! Custom error types for vidsim

use thiserror::Error;

/// Main error type for vidsim operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Unreadable media: {0}")]
    UnreadableMedia(String),

    #[error("Frame extraction failed: {0}")]
    FrameExtractionFailed(String),

    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    #[error("No valid frames could be processed ({total_frames} sampled)")]
    NoValidFrames { total_frames: usize },

    #[error("Index insert failed: {0}")]
    IndexInsertFailed(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("Invalid sampling interval: {0} (must be a positive number of seconds)")]
    InvalidInterval(f64),

    #[error("Invalid top_k: {value} (must be between 1 and {max})")]
    InvalidTopK { value: usize, max: usize },

    #[error("Ingestion timed out after {0} seconds")]
    Timeout(u64),

    #[error("Sampling cancelled")]
    Cancelled,

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Ingestion run not found: {0}")]
    RunNotFound(String),

    #[error("Not initialized: run 'vidsim init' first")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors that abort ingestion of a whole video asset
    pub fn is_asset_failure(&self) -> bool {
        matches!(
            self,
            Error::UnreadableMedia(_)
                | Error::FrameExtractionFailed(_)
                | Error::NoValidFrames { .. }
                | Error::IndexInsertFailed(_)
        )
    }

    /// Failures after which the stored upload and its frames are removed
    pub fn discards_upload(&self) -> bool {
        self.is_sampler_failure() || matches!(self, Error::Timeout(_) | Error::Cancelled)
    }

    /// Errors raised by the sampler stage, before any feature is computed
    pub fn is_sampler_failure(&self) -> bool {
        matches!(
            self,
            Error::UnreadableMedia(_) | Error::FrameExtractionFailed(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for vidsim
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("Background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_failure_classification() {
        assert!(Error::UnreadableMedia("x".into()).is_asset_failure());
        assert!(Error::NoValidFrames { total_frames: 3 }.is_asset_failure());
        assert!(Error::IndexInsertFailed("down".into()).is_asset_failure());
        assert!(!Error::UnreadableImage("frame_0.jpg".into()).is_asset_failure());
        assert!(!Error::DimensionMismatch {
            expected: 512,
            actual: 511
        }
        .is_asset_failure());
    }

    #[test]
    fn test_upload_discarded_on_sampler_failure_and_timeout() {
        assert!(Error::UnreadableMedia("x".into()).discards_upload());
        assert!(Error::Timeout(1).discards_upload());
        assert!(Error::Cancelled.discards_upload());
        assert!(!Error::NoValidFrames { total_frames: 3 }.discards_upload());
        assert!(!Error::IndexInsertFailed("down".into()).discards_upload());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = Error::DimensionMismatch {
            expected: 512,
            actual: 511,
        };
        assert_eq!(
            err.to_string(),
            "Vector dimension mismatch: expected 512, got 511"
        );
    }
}
