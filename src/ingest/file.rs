//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file (ffmpeg) or, for
//! `stub://` paths, generates synthetic aerial-looking frames. Remote URLs are
//! rejected.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;
use crate::frame::{Frame, FrameSize};

const SYNTHETIC_SIZE: FrameSize = FrameSize::new(640, 360);

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path, or `stub://<name>` for synthetic frames.
    pub path: String,
    /// Frame rate reported for synthetic sources.
    pub target_fps: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            target_fps: 30,
            max_frames: None,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
    max_frames: Option<u64>,
    delivered: u64,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        let max_frames = config.max_frames;
        let backend = if config.path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticFileSource::new(config))
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                FileBackend::Ffmpeg(FfmpegFileSource::new(config)?)
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                return Err(anyhow!(
                    "file ingestion requires the ingest-file-ffmpeg feature"
                ));
            }
        };
        Ok(Self {
            backend,
            max_frames,
            delivered: 0,
        })
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

impl FrameSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.max_frames.is_some_and(|max| self.delivered >= max) {
            return Ok(None);
        }
        let frame = match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame()?,
        };
        if frame.is_some() {
            self.delivered += 1;
        }
        Ok(frame)
    }

    fn fps(&self) -> f64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.config.target_fps.max(1) as f64,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.fps(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    config: FileConfig,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        log::info!("FileSource: reading {} (synthetic)", config.path);
        Self {
            config,
            frame_count: 0,
        }
    }

    fn next_frame(&mut self) -> Option<Frame> {
        self.frame_count += 1;
        Some(Frame::from_image(self.generate_synthetic_image()))
    }

    /// Dark terrain with a bright patch drifting left to right.
    fn generate_synthetic_image(&self) -> image::RgbImage {
        let FrameSize { width, height } = SYNTHETIC_SIZE;
        let patch_w = width / 4;
        let span = (width - patch_w) as u64;
        let patch_x = ((self.frame_count * 4) % span.max(1)) as u32;
        image::RgbImage::from_fn(width, height, |x, y| {
            if x >= patch_x && x < patch_x + patch_w && y >= height / 3 && y < height * 2 / 3 {
                image::Rgb([220, 230, 200])
            } else {
                let shade = ((x / 16 + y / 16) % 4) as u8 * 12;
                image::Rgb([40 + shade, 60 + shade, 30 + shade])
            }
        })
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_remote_urls() {
        let err = FileSource::new(FileConfig {
            path: "rtsp://camera/stream".into(),
            ..FileConfig::default()
        });
        assert!(err.is_err());
        assert!(FileSource::new(FileConfig::default()).is_err());
    }

    #[test]
    fn synthetic_source_honours_frame_limit() -> Result<()> {
        let mut source = FileSource::new(FileConfig {
            path: "stub://flight".into(),
            target_fps: 25,
            max_frames: Some(2),
        })?;
        assert_eq!(source.fps(), 25.0);
        assert_eq!(source.next_frame()?.map(|f| f.size()), Some(SYNTHETIC_SIZE));
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }
}
