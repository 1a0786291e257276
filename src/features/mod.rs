//! Visual feature extraction
//!
//! This module provides an abstraction over frame descriptors with:
//! - A trait for different extraction algorithms
//! - An HSV colour histogram extractor (the default)
//! - Vector normalization helpers

mod histogram;

pub use histogram::*;

use crate::config::Config;
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;

/// Scale a vector to unit L2 length; all-zero vectors are returned unchanged
pub fn normalize_vector(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Trait for frame descriptor providers.
///
/// Implementations must be deterministic and must not touch anything but the
/// image they are given, so frames can be processed in any order.
pub trait FeatureExtractor: Send + Sync {
    /// Compute the descriptor for the image at `path`
    fn extract(&self, path: &Path) -> Result<Vec<f32>>;

    /// Length of every vector this extractor returns
    fn dimension(&self) -> usize;

    /// Human readable algorithm name
    fn name(&self) -> &str;
}

/// Create the extractor described by configuration
pub fn create_extractor(config: &Config) -> Arc<dyn FeatureExtractor> {
    Arc::new(ColorHistogramExtractor::new(
        config.features.hue_bins,
        config.features.saturation_bins,
        config.features.value_bins,
    ))
}
