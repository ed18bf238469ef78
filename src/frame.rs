//! Video frames.
//!
//! - `Frame`: packed RGB24 pixels plus dimensions. Detectors receive frames
//!   behind an `Arc` and only ever read them.
//! - `FrameSize`: a width/height pair used for display and inference sizes.

use anyhow::{anyhow, Result};
use image::{imageops::FilterType, RgbImage};
use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One decoded RGB24 frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap packed RGB24 bytes. Fails when the length does not match the
    /// dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self { image })
    }

    /// Uniformly colored frame.
    pub fn filled(size: FrameSize, color: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(size.width, size.height, image::Rgb(color)),
        }
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width(), self.height())
    }

    /// Packed RGB24 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Copy of this frame resampled to `size`. Returns a plain clone when the
    /// size already matches.
    pub fn resized(&self, size: FrameSize) -> Frame {
        if self.size() == size {
            return self.clone();
        }
        Frame {
            image: image::imageops::resize(&self.image, size.width, size.height, FilterType::Triangle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn resize_changes_dimensions_only() {
        let frame = Frame::filled(FrameSize::new(64, 36), [10, 20, 30]);
        let small = frame.resized(FrameSize::new(32, 32));
        assert_eq!(small.size(), FrameSize::new(32, 32));
        assert_eq!(&small.pixels()[..3], &[10, 20, 30]);
        assert_eq!(frame.size(), FrameSize::new(64, 36));
    }
}
