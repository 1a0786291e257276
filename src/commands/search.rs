//! Search command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::models::SimilarityResult;
use crate::store::{check_dimension, check_top_k, VectorIndex};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where the query vector comes from
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// A literal feature vector
    Vector(Vec<f32>),
    /// A JSON file holding an array of numbers
    VectorFile(PathBuf),
    /// An example image; its features become the query
    Image(PathBuf),
}

/// Search output for CLI display
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub top_k: usize,
    pub results: Vec<SimilarityResult>,
}

/// Parse a vector given as a JSON array (`[0.1, 0.2, ...]`)
pub fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    let vector: Vec<f32> = serde_json::from_str(raw.trim())?;
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::Other(
            "query vector contains non-finite values".to_string(),
        ));
    }
    Ok(vector)
}

fn read_vector_file(path: &Path) -> Result<Vec<f32>> {
    let raw = std::fs::read_to_string(path)?;
    parse_vector(&raw)
}

/// Resolve the query into a vector of the configured dimension
pub fn resolve_query(
    input: QueryInput,
    extractor: &dyn FeatureExtractor,
) -> Result<Vec<f32>> {
    match input {
        QueryInput::Vector(vector) => Ok(vector),
        QueryInput::VectorFile(path) => read_vector_file(&path),
        QueryInput::Image(path) => {
            debug!("Extracting query features from {}", path.display());
            extractor.extract(&path)
        }
    }
}

/// Rank stored frames against a query vector
pub async fn cmd_search(
    config: &Config,
    index: &dyn VectorIndex,
    vector: Vec<f32>,
    top_k: Option<usize>,
) -> Result<SearchResponse> {
    let top_k = top_k.unwrap_or(config.query.default_k);
    check_top_k(top_k, config.query.max_k)?;
    check_dimension(index.dimension(), vector.len())?;

    info!("Searching {} nearest frames", top_k);
    let results = index.search(vector, top_k).await?;
    debug!("Got {} results", results.len());

    Ok(SearchResponse { top_k, results })
}

/// Print search results to console
pub fn print_search_results(response: &SearchResponse) {
    println!("\n🔍 Similar frames (top {})\n", response.top_k);

    if response.results.is_empty() {
        println!("No frames indexed yet. Use 'vidsim ingest' to add videos.");
        return;
    }

    for (i, r) in response.results.iter().enumerate() {
        let meta = &r.metadata;
        println!(
            "{}. [score: {:.4}] {} @ {:.2}s",
            i + 1,
            r.score,
            meta.video_filename,
            meta.frame_timestamp
        );
        println!("   Frame: {}", meta.image_path);
        if let Some(video_id) = &meta.video_id {
            println!("   Video ID: {}", video_id);
        }
        println!("   Uploaded: {}\n", meta.upload_timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ColorHistogramExtractor;
    use crate::models::{FeatureRecord, FrameMetadata};
    use crate::store::testing::MemoryIndex;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn record(extractor: &ColorHistogramExtractor, color: [u8; 3], ts: f64) -> FeatureRecord {
        let image = RgbImage::from_pixel(4, 4, Rgb(color));
        FeatureRecord {
            vector: extractor.histogram(&image),
            metadata: FrameMetadata {
                image_path: format!("/frames/v/frame_{}.jpg", ts as u64),
                frame_timestamp: ts,
                video_filename: "clip.mp4".to_string(),
                upload_timestamp: "2024-01-01T00:00:00+00:00".to_string(),
                video_id: Some("v".to_string()),
                frame_index: Some(ts as u64 * 30),
            },
        }
    }

    async fn populated() -> (Config, MemoryIndex, ColorHistogramExtractor) {
        let extractor = ColorHistogramExtractor::new(8, 8, 8);
        let index = MemoryIndex::new(512);
        index
            .upsert(vec![
                record(&extractor, [255, 0, 0], 0.0),
                record(&extractor, [0, 255, 0], 1.0),
                record(&extractor, [0, 0, 255], 2.0),
            ])
            .await
            .unwrap();
        (Config::default(), index, extractor)
    }

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("[1, 0.5, -2]").unwrap(), vec![1.0, 0.5, -2.0]);
        assert!(matches!(parse_vector("not json"), Err(Error::Json(_))));
        assert!(matches!(parse_vector("{\"a\": 1}"), Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_search_returns_closest_first() {
        let (config, index, extractor) = populated().await;
        let query = extractor.histogram(&RgbImage::from_pixel(9, 9, Rgb([0, 255, 0])));

        let response = cmd_search(&config, &index, query, Some(2)).await.unwrap();
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].metadata.frame_timestamp, 1.0);
        assert!((response.results[0].score - 1.0).abs() < 1e-5);
        assert!(response.results[0].score >= response.results[1].score);
    }

    #[tokio::test]
    async fn test_default_k_applies() {
        let (config, index, extractor) = populated().await;
        let query = extractor.histogram(&RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])));
        let response = cmd_search(&config, &index, query, None).await.unwrap();
        assert_eq!(response.top_k, 5);
        assert_eq!(response.results.len(), 3);
    }

    #[tokio::test]
    async fn test_top_k_bounds() {
        let (config, index, _) = populated().await;
        for k in [0, 101] {
            let err = cmd_search(&config, &index, vec![0.0; 512], Some(k))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidTopK { .. }));
        }
        assert!(cmd_search(&config, &index, vec![0.1; 512], Some(100))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_wrong_length_query_is_rejected() {
        let (config, index, _) = populated().await;
        for len in [511, 513] {
            let err = cmd_search(&config, &index, vec![0.1; len], Some(3))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                Error::DimensionMismatch {
                    expected: 512,
                    actual
                } if actual == len
            ));
        }
    }

    #[test]
    fn test_resolve_query_from_file_and_image() {
        let tmp = TempDir::new().unwrap();
        let extractor = ColorHistogramExtractor::new(8, 8, 8);

        let vector_file = tmp.path().join("q.json");
        std::fs::write(&vector_file, "[0.25, 0.75]").unwrap();
        let v = resolve_query(QueryInput::VectorFile(vector_file), &extractor).unwrap();
        assert_eq!(v, vec![0.25, 0.75]);

        let image_path = tmp.path().join("q.png");
        RgbImage::from_pixel(3, 3, Rgb([0, 0, 255]))
            .save(&image_path)
            .unwrap();
        let v = resolve_query(QueryInput::Image(image_path), &extractor).unwrap();
        assert_eq!(v.len(), 512);

        let missing =
            resolve_query(QueryInput::Image(tmp.path().join("nope.png")), &extractor).unwrap_err();
        assert!(matches!(missing, Error::UnreadableImage(_)));
    }
}
