//! Output streams for rendered views.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::frame::Frame;

/// Sequential frame writer.
pub trait FrameSink {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close. Called once at end of session.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes every frame as a numbered JPEG into one directory.
///
/// The frame rate is recorded in `stream.json` next to the images so the
/// sequence can be muxed into a video later.
pub struct ImageSequenceSink {
    dir: PathBuf,
    fps: f64,
    written: u64,
}

impl ImageSequenceSink {
    pub fn create<P: AsRef<Path>>(dir: P, fps: f64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        Ok(Self {
            dir,
            fps,
            written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        self.written += 1;
        let path = self.dir.join(format!("frame_{:06}.jpg", self.written));
        frame
            .image()
            .save(&path)
            .with_context(|| format!("writing frame to {}", path.display()))
    }

    fn finish(&mut self) -> Result<()> {
        let meta = serde_json::json!({
            "fps": self.fps,
            "frames": self.written,
            "pattern": "frame_%06d.jpg",
        });
        let path = self.dir.join("stream.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&meta)?)
            .with_context(|| format!("writing {}", path.display()))
    }
}

/// Keeps every written frame in memory.
#[derive(Default)]
pub struct CollectingSink {
    pub frames: Vec<Frame>,
    pub finished: bool,
}

impl FrameSink for CollectingSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSize;

    #[test]
    fn image_sequence_sink_numbers_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = ImageSequenceSink::create(dir.path().join("normal"), 30.0)?;
        let frame = Frame::filled(FrameSize::new(8, 8), [1, 2, 3]);
        sink.write(&frame)?;
        sink.write(&frame)?;
        sink.finish()?;
        assert_eq!(sink.frames_written(), 2);
        assert!(sink.dir().join("frame_000002.jpg").exists());
        let meta: serde_json::Value =
            serde_json::from_slice(&std::fs::read(sink.dir().join("stream.json"))?)?;
        assert_eq!(meta["frames"], 2);
        Ok(())
    }
}
