//! HSV colour histogram descriptor

use super::{normalize_vector, FeatureExtractor};
use crate::error::{Error, Result};
use image::{Rgb, RgbImage};
use std::path::Path;

/// Upper bounds of the 8-bit HSV channels (hue is stored halved)
const HUE_RANGE: f32 = 180.0;
const SAT_RANGE: f32 = 256.0;
const VAL_RANGE: f32 = 256.0;

/// 3-D hue/saturation/value histogram, flattened hue-major and L2-normalized
#[derive(Debug, Clone)]
pub struct ColorHistogramExtractor {
    hue_bins: usize,
    saturation_bins: usize,
    value_bins: usize,
    name: String,
}

impl ColorHistogramExtractor {
    pub fn new(hue_bins: usize, saturation_bins: usize, value_bins: usize) -> Self {
        let (hue_bins, saturation_bins, value_bins) =
            (hue_bins.max(1), saturation_bins.max(1), value_bins.max(1));
        Self {
            hue_bins,
            saturation_bins,
            value_bins,
            name: format!(
                "hsv-histogram-{}x{}x{}",
                hue_bins, saturation_bins, value_bins
            ),
        }
    }

    /// Histogram of an already decoded image
    pub fn histogram(&self, image: &RgbImage) -> Vec<f32> {
        let mut bins = vec![0f32; self.dimension()];

        for pixel in image.pixels() {
            let (h, s, v) = rgb_to_hsv(pixel);
            let hb = bin_of(h, HUE_RANGE, self.hue_bins);
            let sb = bin_of(s, SAT_RANGE, self.saturation_bins);
            let vb = bin_of(v, VAL_RANGE, self.value_bins);
            bins[(hb * self.saturation_bins + sb) * self.value_bins + vb] += 1.0;
        }

        normalize_vector(&bins)
    }
}

impl FeatureExtractor for ColorHistogramExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<f32>> {
        let image = image::open(path)
            .map_err(|e| Error::UnreadableImage(format!("{}: {}", path.display(), e)))?;
        Ok(self.histogram(&image.to_rgb8()))
    }

    fn dimension(&self) -> usize {
        self.hue_bins * self.saturation_bins * self.value_bins
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn bin_of(value: f32, range: f32, bins: usize) -> usize {
    let idx = (value * bins as f32 / range) as usize;
    idx.min(bins - 1)
}

/// Convert one 8-bit RGB pixel to H in [0, 180), S and V in [0, 255]
pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = pixel.0.map(f32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta * 255.0 / max } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    (h / 2.0, s, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(rgb))
    }

    fn extractor() -> ColorHistogramExtractor {
        ColorHistogramExtractor::new(8, 8, 8)
    }

    #[test]
    fn test_rgb_to_hsv_primaries() {
        assert_eq!(rgb_to_hsv(&Rgb([255, 0, 0])), (0.0, 255.0, 255.0));
        assert_eq!(rgb_to_hsv(&Rgb([0, 255, 0])), (60.0, 255.0, 255.0));
        assert_eq!(rgb_to_hsv(&Rgb([0, 0, 255])), (120.0, 255.0, 255.0));
        assert_eq!(rgb_to_hsv(&Rgb([0, 0, 0])), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_solid_red_fills_single_bin() {
        let hist = extractor().histogram(&solid(4, 4, [255, 0, 0]));
        assert_eq!(hist.len(), 512);
        // hue bin 0, saturation bin 7, value bin 7
        assert_eq!(hist[63], 1.0);
        assert_eq!(hist.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_black_frame_lands_in_first_bin() {
        let hist = extractor().histogram(&solid(2, 2, [0, 0, 0]));
        assert_eq!(hist[0], 1.0);
    }

    #[test]
    fn test_histogram_is_resolution_independent() {
        let ex = extractor();
        let mut small = solid(4, 4, [10, 200, 30]);
        let mut large = solid(64, 64, [10, 200, 30]);
        for x in 0..2 {
            small.put_pixel(x, 0, Rgb([250, 250, 250]));
        }
        for x in 0..64 {
            for y in 0..8 {
                large.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }

        let a = ex.histogram(&small);
        let b = ex.histogram(&large);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_extract_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("frame.png");
        let mut img = solid(16, 16, [30, 60, 90]);
        img.put_pixel(3, 3, Rgb([200, 10, 10]));
        img.save(&path).unwrap();

        let ex = extractor();
        let first = ex.extract(&path).unwrap();
        let second = ex.extract(&path).unwrap();
        assert_eq!(first, second);

        let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_extract_rejects_undecodable_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = extractor().extract(&path).unwrap_err();
        assert!(matches!(err, Error::UnreadableImage(_)));

        let err = extractor()
            .extract(&tmp.path().join("missing.png"))
            .unwrap_err();
        assert!(matches!(err, Error::UnreadableImage(_)));
    }

    #[test]
    fn test_name_reports_bins() {
        assert_eq!(extractor().name(), "hsv-histogram-8x8x8");

        let clamped = ColorHistogramExtractor::new(0, 4, 0);
        assert_eq!(clamped.name(), "hsv-histogram-1x4x1");
        assert_eq!(clamped.dimension(), 4);
    }
}
