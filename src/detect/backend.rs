use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::{Frame, FrameSize};

/// Per-call inference parameters handed to a model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceParams {
    pub confidence_threshold: f32,
    pub max_detections: usize,
    /// Resolution the image has been resized to before the call.
    pub input_size: FrameSize,
}

/// Object-detection model capability.
///
/// Given an image already resized to `params.input_size`, return zero or more
/// boxes in that image's pixel coordinates.
///
/// `infer` takes `&self` and implementations must be `Sync`: the fusion engine
/// may still be running a late call from a previous frame when the next call
/// arrives, so a model must not keep a mutable lock held across calls.
pub trait DetectionModel: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &str;

    /// Run inference on one image.
    fn infer(&self, image: &Frame, params: &InferenceParams) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
