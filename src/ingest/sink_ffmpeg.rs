//! Video file sink using FFmpeg.
//!
//! Encodes rendered frames to MPEG-4 Part 2 in whatever container the output
//! path's extension selects (`.mp4` in practice).

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::sink::FrameSink;
use crate::frame::{Frame, FrameSize};

pub struct VideoFileSink {
    path: PathBuf,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    size: FrameSize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    stream_index: usize,
    written: u64,
    finished: bool,
}

impl VideoFileSink {
    /// Open `path` for writing frames of exactly `size` at `fps`.
    pub fn create<P: AsRef<Path>>(path: P, size: FrameSize, fps: f64) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let path = path.as_ref().to_path_buf();
        if size.is_empty() || size.width % 2 != 0 || size.height % 2 != 0 {
            return Err(anyhow!("video size {} must be non-zero and even", size));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }

        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("failed to open video output {}", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg has no MPEG-4 encoder"))?;

        let rate = ffmpeg::Rational::from(if fps > 0.0 { fps } else { 30.0 });
        let encoder_time_base = rate.invert();

        let (encoder, stream_index) = {
            let mut stream = output.add_stream(codec).context("add video stream")?;
            let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
                .encoder()
                .video()
                .context("create ffmpeg video encoder")?;
            encoder.set_width(size.width);
            encoder.set_height(size.height);
            encoder.set_format(ffmpeg::format::Pixel::YUV420P);
            encoder.set_frame_rate(Some(rate));
            encoder.set_time_base(encoder_time_base);
            if global_header {
                encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
            }
            let encoder = encoder
                .open_with(ffmpeg::Dictionary::new())
                .context("open ffmpeg video encoder")?;
            stream.set_parameters(&encoder);
            (encoder, stream.index())
        };

        output
            .write_header()
            .with_context(|| format!("write header to {}", path.display()))?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or_else(|| anyhow!("video stream disappeared after header"))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::RGB24,
            size.width,
            size.height,
            ffmpeg::format::Pixel::YUV420P,
            size.width,
            size.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!("VideoFileSink: writing {} ({} @ {:.2} fps)", path.display(), size, fps);

        Ok(Self {
            path,
            output,
            encoder,
            scaler,
            size,
            encoder_time_base,
            stream_time_base,
            stream_index,
            written: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    fn drain(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.size() != self.size {
            return Err(anyhow!(
                "frame size {} does not match video size {}",
                frame.size(),
                self.size
            ));
        }

        let mut rgb = ffmpeg::frame::Video::new(
            ffmpeg::format::Pixel::RGB24,
            self.size.width,
            self.size.height,
        );
        let row_bytes = self.size.width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data_mut(0);
        for (row, src) in frame.pixels().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            data.get_mut(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?
                .copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("scale frame to YUV")?;
        yuv.set_pts(Some(self.written as i64));
        self.encoder
            .send_frame(&yuv)
            .context("send frame to ffmpeg encoder")?;
        self.written += 1;
        self.drain()
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().context("flush ffmpeg encoder")?;
        self.drain()?;
        self.output
            .write_trailer()
            .with_context(|| format!("write trailer to {}", self.path.display()))
    }
}
