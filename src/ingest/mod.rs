//! Frame ingestion and output streams.
//!
//! Sources:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` source (testing, demos)
//!
//! Sinks receive the rendered normal and emergency views, one frame per tick:
//! - Numbered JPEG sequences
//! - Video files (feature: ingest-file-ffmpeg)

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod sink;
#[cfg(feature = "ingest-file-ffmpeg")]
pub mod sink_ffmpeg;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource, FileStats};
pub use sink::{CollectingSink, FrameSink, ImageSequenceSink};
#[cfg(feature = "ingest-file-ffmpeg")]
pub use sink_ffmpeg::VideoFileSink;

/// Sequential frame reader.
pub trait FrameSource {
    /// Next decoded frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Nominal frame rate of the source.
    fn fps(&self) -> f64;
}
