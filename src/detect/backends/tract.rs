#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionModel, InferenceParams};
use crate::detect::result::RawDetection;
use crate::frame::{Frame, FrameSize};

const NMS_IOU_THRESHOLD: f32 = 0.7;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// The model is built for a fixed input size. Its first output must have shape
/// `[1, 4 + classes, anchors]` with rows `cx, cy, w, h` followed by one score per
/// class, all in input pixel coordinates.
pub struct TractModel {
    name: String,
    model: TypedRunnableModel<TypedModel>,
    input_size: FrameSize,
}

impl TractModel {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: FrameSize) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size.height as usize, input_size.width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tract".to_string());

        Ok(Self {
            name,
            model,
            input_size,
        })
    }

    fn build_input(&self, image: &Frame) -> Result<Tensor> {
        if image.size() != self.input_size {
            return Err(anyhow!(
                "frame size {} does not match model input {}",
                image.size(),
                self.input_size
            ));
        }

        let pixels = image.pixels();
        let width = image.width() as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, image.height() as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, params: &InferenceParams) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        let rows = shape[1];
        let anchors = shape[2];

        let mut candidates = Vec::new();
        for a in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for c in 4..rows {
                let score = view[[0, c, a]];
                if score > best_score {
                    best_score = score;
                    best_class = c - 4;
                }
            }
            if !best_score.is_finite() || best_score < params.confidence_threshold {
                continue;
            }
            let cx = view[[0, 0, a]];
            let cy = view[[0, 1, a]];
            let w = view[[0, 2, a]];
            let h = view[[0, 3, a]];
            if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
                continue;
            }
            candidates.push(RawDetection::new(
                [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                best_score,
                best_class as u32,
            ));
        }

        let mut kept = non_max_suppression(candidates, NMS_IOU_THRESHOLD);
        kept.truncate(params.max_detections);
        Ok(kept)
    }
}

impl DetectionModel for TractModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, image: &Frame, params: &InferenceParams) -> Result<Vec<RawDetection>> {
        let input = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, params)
    }

    fn warm_up(&self) -> Result<()> {
        let blank = Frame::filled(self.input_size, [0, 0, 0]);
        let input = self.build_input(&blank)?;
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up failed")?;
        Ok(())
    }
}

/// Greedy per-class NMS, highest confidence first.
fn non_max_suppression(mut dets: Vec<RawDetection>, iou_thresh: f32) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && iou(k, &det) >= iou_thresh);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);
    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_keeps_distinct_classes() {
        let dets = vec![
            RawDetection::new([0.0, 0.0, 10.0, 10.0], 0.9, 0),
            RawDetection::new([0.0, 0.0, 10.0, 10.0], 0.8, 0),
            RawDetection::new([0.0, 0.0, 10.0, 10.0], 0.7, 1),
        ];
        let kept = non_max_suppression(dets, 0.7);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 1);
    }
}
