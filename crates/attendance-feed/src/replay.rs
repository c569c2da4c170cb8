//! Recorded feed: replays captured frames from a JSON Lines file.
//!
//! Each line is one frame:
//!
//! ```json
//! {"image": "frames/0001.jpg", "detections": [{"descriptor": [0.1, ...], "box": {"x": 12, "y": 40, "width": 96, "height": 96}, "score": 0.97}]}
//! ```
//!
//! A `null` line, or a frame with `"ready": false`, stands for a tick where
//! the camera had no usable frame. Image paths are resolved relative to the
//! feed file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use attendance_core::{CaptureError, CapturedFrame, Detection, FaceSource};
use serde::Deserialize;
use thiserror::Error;

use crate::snapshot;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("cannot read feed {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid frame on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("feed contains no frames")]
    Empty,
}

impl From<FeedError> for CaptureError {
    fn from(err: FeedError) -> Self {
        CaptureError::Unavailable(err.to_string())
    }
}

/// One recorded frame.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordedFrame {
    #[serde(default = "default_ready")]
    pub ready: bool,
    /// Frame image, relative to the feed file.
    #[serde(default)]
    pub image: Option<PathBuf>,
    /// Pre-encoded snapshot data URI, used when no image is given.
    #[serde(default)]
    pub snapshot: Option<String>,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

fn default_ready() -> bool {
    true
}

pub struct ReplaySource {
    frames: Vec<Option<RecordedFrame>>,
    base_dir: PathBuf,
    cursor: usize,
    looping: bool,
}

impl ReplaySource {
    /// Load a feed file. Fails if the file is missing, malformed or empty.
    pub async fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| FeedError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let source = Self::from_jsonl(&text, base_dir, looping)?;
        tracing::info!(
            path = %path.display(),
            frames = source.frames.len(),
            looping,
            "opened recorded feed"
        );
        Ok(source)
    }

    pub fn from_jsonl(text: &str, base_dir: PathBuf, looping: bool) -> Result<Self, FeedError> {
        let mut frames = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let frame: Option<RecordedFrame> = serde_json::from_str(line).map_err(|source| {
                FeedError::Parse {
                    line: idx + 1,
                    source,
                }
            })?;
            frames.push(frame);
        }
        if frames.is_empty() {
            return Err(FeedError::Empty);
        }
        Ok(Self {
            frames,
            base_dir,
            cursor: 0,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn next_frame(&mut self) -> Result<Option<RecordedFrame>, CaptureError> {
        if self.cursor >= self.frames.len() {
            if !self.looping {
                return Err(CaptureError::Unavailable("feed exhausted".into()));
            }
            self.cursor = 0;
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        Ok(frame)
    }
}

#[async_trait]
impl FaceSource for ReplaySource {
    async fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
        let frame = match self.next_frame()? {
            Some(frame) if frame.ready => frame,
            _ => return Err(CaptureError::NotReady("no frame available".into())),
        };

        let snapshot = match &frame.image {
            Some(image) => load_snapshot(self.base_dir.join(image)).await?,
            None => frame.snapshot.unwrap_or_default(),
        };

        Ok(CapturedFrame {
            snapshot,
            detections: frame.detections,
        })
    }
}

/// Decode a frame image and re-encode it as a snapshot, off the async runtime.
///
/// Unreadable and dark images are transient: the next tick gets a new frame.
async fn load_snapshot(path: PathBuf) -> Result<String, CaptureError> {
    tokio::task::spawn_blocking(move || {
        let img = image::open(&path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to load frame image");
            CaptureError::NotReady(format!("frame image unreadable: {e}"))
        })?;
        if snapshot::is_dark_image(&img) {
            tracing::debug!(path = %path.display(), "skipping dark frame");
            return Err(CaptureError::NotReady("dark frame".into()));
        }
        snapshot::jpeg_data_uri(&img, snapshot::SNAPSHOT_QUALITY)
            .map_err(|e| CaptureError::NotReady(format!("snapshot encoding failed: {e}")))
    })
    .await
    .map_err(|e| CaptureError::Unavailable(format!("snapshot worker failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const FRAME_A: &str = r#"{"detections":[{"descriptor":[0.0,0.0],"box":{"x":1,"y":2,"width":30,"height":30},"score":0.9}]}"#;

    #[test]
    fn test_from_jsonl_skips_blank_lines() {
        let text = format!("{FRAME_A}\n\nnull\n{{\"ready\": false}}\n");
        let source = ReplaySource::from_jsonl(&text, PathBuf::new(), false).unwrap();
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_from_jsonl_reports_line_number() {
        let text = format!("{FRAME_A}\n{{not json}}\n");
        let err = ReplaySource::from_jsonl(&text, PathBuf::new(), false).err().unwrap();
        assert!(matches!(err, FeedError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_empty_feed_rejected() {
        let err = ReplaySource::from_jsonl("\n\n", PathBuf::new(), true).err().unwrap();
        assert!(matches!(err, FeedError::Empty));
    }

    #[tokio::test]
    async fn test_capture_sequence_and_exhaustion() {
        let text = format!("{FRAME_A}\nnull\n{{\"ready\": false}}\n");
        let mut source = ReplaySource::from_jsonl(&text, PathBuf::new(), false).unwrap();

        let frame = source.capture().await.unwrap();
        assert_eq!(frame.detections.len(), 1);
        assert_eq!(frame.detections[0].bounding_box.width, 30.0);

        assert!(matches!(source.capture().await, Err(CaptureError::NotReady(_))));
        assert!(matches!(source.capture().await, Err(CaptureError::NotReady(_))));
        assert_eq!(
            source.capture().await.unwrap_err(),
            CaptureError::Unavailable("feed exhausted".into())
        );
    }

    #[tokio::test]
    async fn test_looping_feed_restarts() {
        let mut source = ReplaySource::from_jsonl(FRAME_A, PathBuf::new(), true).unwrap();
        for _ in 0..3 {
            assert_eq!(source.capture().await.unwrap().detections.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_inline_snapshot_passthrough() {
        let text = r#"{"snapshot":"data:image/jpeg;base64,AAA","detections":[]}"#;
        let mut source = ReplaySource::from_jsonl(text, PathBuf::new(), false).unwrap();
        assert_eq!(source.capture().await.unwrap().snapshot, "data:image/jpeg;base64,AAA");
    }

    #[tokio::test]
    async fn test_open_missing_file_is_unavailable() {
        let err = ReplaySource::open("/nonexistent/feed.jsonl", false).await.err().unwrap();
        assert!(matches!(err, FeedError::Io { .. }));
        assert!(matches!(CaptureError::from(err), CaptureError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_image_frames_are_encoded_and_dark_frames_skipped() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]))
            .save(dir.path().join("dark.png"))
            .unwrap();
        RgbImage::from_pixel(20, 20, Rgb([180, 160, 140]))
            .save(dir.path().join("lit.png"))
            .unwrap();
        let feed = dir.path().join("feed.jsonl");
        std::fs::write(
            &feed,
            "{\"image\":\"dark.png\",\"detections\":[]}\n{\"image\":\"lit.png\",\"detections\":[]}\n{\"image\":\"missing.png\"}\n",
        )
        .unwrap();

        let mut source = ReplaySource::open(&feed, false).await.unwrap();

        assert_eq!(
            source.capture().await.unwrap_err(),
            CaptureError::NotReady("dark frame".into())
        );
        let lit = source.capture().await.unwrap();
        assert!(lit.snapshot.starts_with("data:image/jpeg;base64,"));
        assert!(matches!(source.capture().await, Err(CaptureError::NotReady(_))));
    }
}
