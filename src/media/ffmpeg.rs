//! ffmpeg/ffprobe backed video decoding
//!
//! `ffprobe` reports the stream geometry and frame rate; `ffmpeg` then decodes
//! the first video stream to packed RGB24 on stdout, which is read one frame at
//! a time.

use super::{FrameSource, VideoBackend};
use crate::config::MediaConfig;
use crate::error::{Error, Result};
use image::RgbImage;
use serde::Deserialize;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{debug, warn};

/// Stream properties reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    #[serde(default)]
    tags: ProbeTags,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

impl ProbeStream {
    /// Display rotation in degrees, normalised to `0..360`
    fn rotation(&self) -> i64 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .unwrap_or(0.0);
        (degrees.round() as i64).rem_euclid(360)
    }
}

/// Parse an ffmpeg rational such as `30000/1001` or `25`
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };

    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Extract the first video stream's geometry and frame rate from ffprobe JSON.
///
/// ffmpeg applies the display rotation while decoding, so a stream rotated by
/// a quarter turn is reported with width and height swapped.
pub fn parse_probe_output(json: &str) -> Result<StreamInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| Error::UnreadableMedia(format!("unexpected ffprobe output: {}", e)))?;

    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnreadableMedia("no video stream found".to_string()))?;

    let rotation = stream.rotation();
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 && (rotation == 90 || rotation == 270) => (h, w),
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(Error::UnreadableMedia(
                "video stream reports no frame size".to_string(),
            ))
        }
    };

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| Error::UnreadableMedia("no usable frame rate".to_string()))?;

    Ok(StreamInfo {
        width,
        height,
        frame_rate,
    })
}

/// Decodes containers by shelling out to ffprobe and ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegBackend {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
        }
    }

    /// Read stream properties without decoding
    pub fn probe(&self, path: &Path) -> Result<StreamInfo> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,avg_frame_rate,r_frame_rate:stream_tags=rotate:stream_side_data=rotation",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::FrameExtractionFailed(format!("failed to run {}: {}", self.ffprobe, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::UnreadableMedia(format!(
                "{}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| match e {
                Error::UnreadableMedia(msg) => {
                    Error::UnreadableMedia(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
    }
}

impl VideoBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let info = self.probe(path)?;
        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            frame_rate = info.frame_rate,
            "Probed video stream"
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::FrameExtractionFailed(format!("failed to run {}: {}", self.ffmpeg, e))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::FrameExtractionFailed("ffmpeg stdout was not captured".to_string())
        })?;

        Ok(Box::new(
            RawFrameSource::new(BufReader::new(stdout), info).with_child(child),
        ))
    }
}

/// Packed RGB24 frames of a fixed size read back to back from `reader`.
///
/// A short or failed read ends the stream; whatever was read before it stands.
pub struct RawFrameSource<R> {
    reader: R,
    info: StreamInfo,
    child: Option<Child>,
    done: bool,
}

impl<R: Read + Send> RawFrameSource<R> {
    pub fn new(reader: R, info: StreamInfo) -> Self {
        Self {
            reader,
            info,
            child: None,
            done: false,
        }
    }

    /// Reap `child` when the stream ends or the source is dropped
    fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }

    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }
}

impl<R> RawFrameSource<R> {
    fn finish(&mut self) {
        self.done = true;
        let Some(mut child) = self.child.take() else {
            return;
        };
        let _ = child.kill();
        match child.wait() {
            Ok(status) if !status.success() => {
                debug!(?status, "ffmpeg exited before the end of the stream")
            }
            Err(e) => warn!("Failed to reap ffmpeg: {}", e),
            _ => {}
        }
    }
}

impl<R: Read + Send> FrameSource for RawFrameSource<R> {
    fn frame_rate(&self) -> f64 {
        self.info.frame_rate
    }

    fn next_frame(&mut self) -> Option<RgbImage> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; self.frame_len()];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => RgbImage::from_raw(self.info.width, self.info.height, buf),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    debug!("Frame read ended the stream: {}", e);
                }
                self.finish();
                None
            }
        }
    }
}

impl<R> Drop for RawFrameSource<R> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FrameSampler;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn tiny_stream() -> StreamInfo {
        StreamInfo {
            width: 2,
            height: 2,
            frame_rate: 10.0,
        }
    }

    /// Two and a half 2x2 RGB frames: a cut-off container
    fn truncated_bytes() -> Vec<u8> {
        let mut bytes = vec![10u8; 12];
        bytes.extend(vec![200u8; 12]);
        bytes.extend(vec![99u8; 6]);
        bytes
    }

    struct TruncatedBackend;

    impl VideoBackend for TruncatedBackend {
        fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>> {
            Ok(Box::new(RawFrameSource::new(
                Cursor::new(truncated_bytes()),
                tiny_stream(),
            )))
        }
    }

    #[test]
    fn test_short_read_ends_the_stream() {
        let mut source = RawFrameSource::new(Cursor::new(truncated_bytes()), tiny_stream());

        let first = source.next_frame().unwrap();
        assert_eq!(first.dimensions(), (2, 2));
        assert_eq!(first.get_pixel(0, 0).0, [10, 10, 10]);
        let second = source.next_frame().unwrap();
        assert_eq!(second.get_pixel(1, 1).0, [200, 200, 200]);

        assert!(source.next_frame().is_none());
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn test_sampler_keeps_frames_read_before_truncation() {
        let tmp = TempDir::new().unwrap();
        let sampler = FrameSampler::new(Arc::new(TruncatedBackend), tmp.path(), "png");

        let outcome = sampler.sample(Path::new("cut.mp4"), 0.1, "cut").unwrap();
        assert_eq!(outcome.stride, 1);
        assert_eq!(outcome.frames_decoded, 2);
        assert_eq!(outcome.frames.len(), 2);
        assert!(outcome.frames.iter().all(|f| f.location.exists()));
    }

    #[test]
    fn test_quarter_turn_rotation_swaps_geometry() {
        let side_data = r#"{"streams":[{"width":1920,"height":1080,"avg_frame_rate":"30/1","side_data_list":[{"side_data_type":"Display Matrix","rotation":-90}]}]}"#;
        let info = parse_probe_output(side_data).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));

        let tagged = r#"{"streams":[{"width":1280,"height":720,"avg_frame_rate":"25/1","tags":{"rotate":"90"}}]}"#;
        let info = parse_probe_output(tagged).unwrap();
        assert_eq!((info.width, info.height), (720, 1280));

        let flipped = r#"{"streams":[{"width":640,"height":360,"avg_frame_rate":"30/1","side_data_list":[{"rotation":180}]}]}"#;
        let info = parse_probe_output(flipped).unwrap();
        assert_eq!((info.width, info.height), (640, 360));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.001);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("0/1"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{"programs":[],"streams":[{"width":640,"height":360,"r_frame_rate":"30/1","avg_frame_rate":"30/1"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(
            info,
            StreamInfo {
                width: 640,
                height: 360,
                frame_rate: 30.0
            }
        );
    }

    #[test]
    fn test_probe_falls_back_to_r_frame_rate() {
        let json = r#"{"streams":[{"width":320,"height":240,"r_frame_rate":"24/1","avg_frame_rate":"0/0"}]}"#;
        assert_eq!(parse_probe_output(json).unwrap().frame_rate, 24.0);
    }

    #[test]
    fn test_probe_without_streams_is_unreadable() {
        let err = parse_probe_output(r#"{"streams":[]}"#).unwrap_err();
        assert!(matches!(err, Error::UnreadableMedia(_)));

        let err = parse_probe_output(r#"{}"#).unwrap_err();
        assert!(matches!(err, Error::UnreadableMedia(_)));
    }

    #[test]
    fn test_probe_without_rate_is_unreadable() {
        let json = r#"{"streams":[{"width":320,"height":240,"avg_frame_rate":"0/0"}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(Error::UnreadableMedia(_))
        ));
    }

    #[test]
    fn test_missing_ffprobe_binary_fails_extraction() {
        let backend = FfmpegBackend {
            ffmpeg: "/nonexistent/ffmpeg".to_string(),
            ffprobe: "/nonexistent/ffprobe".to_string(),
        };
        let err = backend.open(Path::new("clip.mp4")).err().unwrap();
        assert!(err.is_sampler_failure());
    }
}
