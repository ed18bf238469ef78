use crate::safety::{RenderStyle, Tier};

/// One raw model output in inference-resolution coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl RawDetection {
    pub fn new(bbox: [f32; 4], confidence: f32, class_id: u32) -> Self {
        Self {
            x1: bbox[0],
            y1: bbox[1],
            x2: bbox[2],
            y2: bbox[3],
            confidence,
            class_id,
        }
    }

    /// True when every coordinate and the confidence are finite.
    pub fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2, self.confidence]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Axis-aligned box in display pixels. Corners are always ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Build a box, swapping coordinates so that `x1 <= x2` and `y1 <= y2`.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn as_tuple(&self) -> (i32, i32, i32, i32) {
        (self.x1, self.y1, self.x2, self.y2)
    }
}

/// A classified region in one frame.
///
/// Built by a detector adapter and never modified afterwards; the renderer
/// reads the style straight off the detection.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    bbox: BoundingBox,
    confidence: f32,
    class_id: u32,
    class_name: String,
    tier: Tier,
    style: RenderStyle,
    source_detector: String,
    display_name: String,
}

impl Detection {
    /// The render style is taken from `tier`. Confidence is clamped to 0..1.
    pub fn new(
        bbox: BoundingBox,
        confidence: f32,
        class_id: u32,
        class_name: impl Into<String>,
        tier: Tier,
        source_detector: impl Into<String>,
    ) -> Self {
        let source_detector = source_detector.into();
        Self {
            bbox,
            confidence: clamp_confidence(confidence),
            class_id,
            class_name: class_name.into(),
            tier,
            style: tier.style(),
            display_name: source_detector.clone(),
            source_detector,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn class_id(&self) -> u32 {
        self.class_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn style(&self) -> RenderStyle {
        self.style
    }

    /// Id of the detector that produced this detection.
    pub fn source_detector(&self) -> &str {
        &self.source_detector
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

fn clamp_confidence(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
