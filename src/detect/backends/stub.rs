use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionModel, InferenceParams};
use crate::detect::result::RawDetection;
use crate::frame::{Frame, FrameSize};

#[derive(Clone, Debug)]
enum Behavior {
    Scripted(Vec<RawDetection>),
    Grid { class_count: u32 },
    Fail(String),
    Panic,
}

/// Stub model for tests and `stub://` demo runs.
///
/// Either replays a fixed list of raw detections or, in grid mode, proposes one
/// box per class laid out over the image and scores each by the mean
/// brightness under it.
#[derive(Clone, Debug)]
pub struct StubModel {
    name: String,
    behavior: Behavior,
    latency: Duration,
    expected_input: Option<FrameSize>,
}

impl StubModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: Behavior::Scripted(Vec::new()),
            latency: Duration::ZERO,
            expected_input: None,
        }
    }

    pub fn grid(name: impl Into<String>, class_count: usize) -> Self {
        Self {
            behavior: Behavior::Grid {
                class_count: class_count as u32,
            },
            ..Self::new(name)
        }
    }

    pub fn with_detections(mut self, detections: Vec<RawDetection>) -> Self {
        self.behavior = Behavior::Scripted(detections);
        self
    }

    /// Sleep this long inside every `infer` call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::Fail(message.into());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behavior = Behavior::Panic;
        self
    }

    /// Fail any call whose image is not exactly `size`.
    pub fn expect_input(mut self, size: FrameSize) -> Self {
        self.expected_input = Some(size);
        self
    }
}

impl DetectionModel for StubModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, image: &Frame, params: &InferenceParams) -> Result<Vec<RawDetection>> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if let Some(expected) = self.expected_input {
            if image.size() != expected || params.input_size != expected {
                return Err(anyhow!(
                    "stub {}: expected {} input, got {}",
                    self.name,
                    expected,
                    image.size()
                ));
            }
        }

        match &self.behavior {
            Behavior::Scripted(detections) => Ok(detections.clone()),
            Behavior::Grid { class_count } => Ok(grid_detections(image, *class_count, params)),
            Behavior::Fail(message) => Err(anyhow!("stub {}: {}", self.name, message)),
            Behavior::Panic => panic!("stub {} panicked", self.name),
        }
    }
}

fn grid_detections(image: &Frame, class_count: u32, params: &InferenceParams) -> Vec<RawDetection> {
    if class_count == 0 || image.size().is_empty() {
        return Vec::new();
    }
    let cols = (class_count as f32).sqrt().ceil() as u32;
    let rows = class_count.div_ceil(cols);
    let cell_w = image.width() / cols;
    let cell_h = image.height() / rows;
    if cell_w == 0 || cell_h == 0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for class_id in 0..class_count {
        let x0 = (class_id % cols) * cell_w;
        let y0 = (class_id / cols) * cell_h;
        let confidence = mean_brightness(image, x0, y0, cell_w, cell_h);
        if confidence < params.confidence_threshold {
            continue;
        }
        out.push(RawDetection::new(
            [
                x0 as f32,
                y0 as f32,
                (x0 + cell_w) as f32,
                (y0 + cell_h) as f32,
            ],
            confidence,
            class_id,
        ));
        if out.len() >= params.max_detections {
            break;
        }
    }
    out
}

fn mean_brightness(image: &Frame, x0: u32, y0: u32, w: u32, h: u32) -> f32 {
    let img = image.image();
    let mut total = 0u64;
    let mut count = 0u64;
    for y in (y0..y0 + h).step_by(4) {
        for x in (x0..x0 + w).step_by(4) {
            let p = img.get_pixel(x, y);
            total += (p[0] as u64 + p[1] as u64 + p[2] as u64) / 3;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    total as f32 / count as f32 / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: FrameSize) -> InferenceParams {
        InferenceParams {
            confidence_threshold: 0.5,
            max_detections: 40,
            input_size: size,
        }
    }

    #[test]
    fn grid_scores_by_brightness() {
        let size = FrameSize::new(64, 64);
        let bright = Frame::filled(size, [255, 255, 255]);
        let dark = Frame::filled(size, [0, 0, 0]);
        let model = StubModel::grid("grid", 4);

        let dets = model.infer(&bright, &params(size)).unwrap();
        assert_eq!(dets.len(), 4);
        assert_eq!(dets[3].class_id, 3);
        assert_eq!((dets[3].x1, dets[3].y1), (32.0, 32.0));

        assert!(model.infer(&dark, &params(size)).unwrap().is_empty());
    }

    #[test]
    fn expect_input_rejects_other_sizes() {
        let model = StubModel::new("s").expect_input(FrameSize::new(8, 8));
        let frame = Frame::filled(FrameSize::new(4, 4), [0, 0, 0]);
        assert!(model.infer(&frame, &params(FrameSize::new(4, 4))).is_err());
    }
}
