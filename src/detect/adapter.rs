//! Detector adapter.
//!
//! Wraps one detection model with its vocabulary and inference settings and
//! turns raw model output into classified, display-resolution detections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionModel, InferenceParams};
use crate::detect::result::{BoundingBox, Detection, RawDetection};
use crate::frame::{Frame, FrameSize};
use crate::safety::SafetyTaxonomy;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_DETECTIONS: usize = 40;
pub const DEFAULT_INPUT_SIZE: FrameSize = FrameSize::new(320, 320);

/// Static settings of one detector.
#[derive(Clone, Debug)]
pub struct AdapterConfig {
    pub id: String,
    pub display_name: String,
    /// Class vocabulary; index is the model's class id.
    pub classes: Vec<String>,
    pub confidence_threshold: f32,
    pub max_detections: usize,
    pub input_size: FrameSize,
}

impl AdapterConfig {
    pub fn new(id: impl Into<String>, classes: Vec<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            classes,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            input_size: DEFAULT_INPUT_SIZE,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow!("detector id must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "detector {}: confidence threshold {} is outside 0..1",
                self.id,
                self.confidence_threshold
            ));
        }
        if self.max_detections == 0 {
            return Err(anyhow!("detector {}: max detections must be > 0", self.id));
        }
        if self.input_size.is_empty() {
            return Err(anyhow!(
                "detector {}: input size {} must be non-zero",
                self.id,
                self.input_size
            ));
        }
        Ok(())
    }

    /// Vocabulary name for `class_id`, or `class_<id>` when out of range.
    pub fn class_name(&self, class_id: u32) -> String {
        self.classes
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    fn params(&self) -> InferenceParams {
        InferenceParams {
            confidence_threshold: self.confidence_threshold,
            max_detections: self.max_detections,
            input_size: self.input_size,
        }
    }
}

/// One model plus the settings needed to turn its output into detections.
pub struct DetectorAdapter {
    config: AdapterConfig,
    model: Arc<dyn DetectionModel>,
    taxonomy: Arc<SafetyTaxonomy>,
    in_flight: AtomicBool,
}

impl DetectorAdapter {
    pub fn new(
        config: AdapterConfig,
        model: Arc<dyn DetectionModel>,
        taxonomy: Arc<SafetyTaxonomy>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model,
            taxonomy,
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn warm_up(&self) -> Result<()> {
        self.model.warm_up()
    }

    /// Detections for `frame`, with boxes in `frame`'s resolution.
    ///
    /// A failing model contributes an empty list; the failure is logged.
    pub fn detect(&self, frame: &Frame) -> Vec<Detection> {
        match self.try_detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("detector {}: inference failed: {:#}", self.config.id, e);
                Vec::new()
            }
        }
    }

    /// Like `detect` but surfaces model errors.
    pub fn try_detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let display = frame.size();
        if display.is_empty() {
            return Ok(Vec::new());
        }

        let input = frame.resized(self.config.input_size);
        let params = self.config.params();
        let raw = self.model.infer(&input, &params)?;

        let scale = Scale::between(self.config.input_size, display);
        let mut kept: Vec<RawDetection> = raw
            .into_iter()
            .filter(|r| r.is_finite() && r.confidence >= params.confidence_threshold)
            .collect();
        // Stable, so equal scores keep model order.
        kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        kept.truncate(params.max_detections);
        let detections = kept.iter().map(|r| self.to_detection(r, scale)).collect();
        Ok(detections)
    }

    fn to_detection(&self, raw: &RawDetection, scale: Scale) -> Detection {
        let class_name = self.config.class_name(raw.class_id);
        let tier = self.taxonomy.classify(&class_name);
        Detection::new(
            scale.apply(raw),
            raw.confidence,
            raw.class_id,
            class_name,
            tier,
            self.config.id.clone(),
        )
        .with_display_name(self.config.display_name.clone())
    }

    /// Mark the adapter busy. Returns `None` while a previous call is still
    /// running; the flag clears when the guard drops.
    pub(crate) fn try_begin(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                adapter: Arc::clone(self),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DetectorAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorAdapter")
            .field("config", &self.config)
            .field("model", &self.model.name())
            .finish()
    }
}

pub(crate) struct InFlightGuard {
    adapter: Arc<DetectorAdapter>,
}

impl InFlightGuard {
    pub(crate) fn adapter(&self) -> &DetectorAdapter {
        &self.adapter
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.adapter.in_flight.store(false, Ordering::Release);
    }
}

/// Independent x/y factors from inference to display resolution.
#[derive(Clone, Copy, Debug)]
struct Scale {
    x: f64,
    y: f64,
    max_x: f64,
    max_y: f64,
}

impl Scale {
    fn between(from: FrameSize, to: FrameSize) -> Self {
        Self {
            x: to.width as f64 / from.width as f64,
            y: to.height as f64 / from.height as f64,
            max_x: to.width.saturating_sub(1) as f64,
            max_y: to.height.saturating_sub(1) as f64,
        }
    }

    /// Coordinates are truncated to whole pixels before and after scaling and
    /// clamped to the display frame.
    fn apply(&self, raw: &RawDetection) -> BoundingBox {
        let sx = |v: f32| (v.trunc() as f64 * self.x).clamp(0.0, self.max_x) as i32;
        let sy = |v: f32| (v.trunc() as f64 * self.y).clamp(0.0, self.max_y) as i32;
        BoundingBox::new(sx(raw.x1), sy(raw.y1), sx(raw.x2), sy(raw.y2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubModel;
    use crate::safety::Tier;

    fn adapter(model: StubModel, classes: &[&str]) -> Arc<DetectorAdapter> {
        let config = AdapterConfig::new("test", classes.iter().map(|c| c.to_string()).collect());
        Arc::new(
            DetectorAdapter::new(config, Arc::new(model), Arc::new(SafetyTaxonomy::default()))
                .unwrap(),
        )
    }

    fn display_frame() -> Frame {
        Frame::filled(FrameSize::new(1280, 720), [0, 0, 0])
    }

    #[test]
    fn rescales_boxes_to_display_resolution() {
        let model = StubModel::new("stub")
            .with_detections(vec![RawDetection::new([0.0, 0.0, 160.0, 160.0], 0.9, 0)]);
        let dets = adapter(model, &["grass"]).detect(&display_frame());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox().as_tuple(), (0, 0, 640, 360));
        assert_eq!(dets[0].tier(), Tier::Safe);
        assert_eq!(dets[0].source_detector(), "test");
    }

    #[test]
    fn truncates_fractional_coordinates() {
        let model = StubModel::new("stub")
            .with_detections(vec![RawDetection::new([10.9, 10.9, 20.5, 20.5], 0.9, 0)]);
        let dets = adapter(model, &["grass"]).detect(&display_frame());
        // 10 * 4 = 40, 10 * 2.25 = 22.5 -> 22, 20 * 4 = 80, 20 * 2.25 = 45
        assert_eq!(dets[0].bbox().as_tuple(), (40, 22, 80, 45));
    }

    #[test]
    fn out_of_range_class_id_gets_synthetic_name() {
        let model = StubModel::new("stub")
            .with_detections(vec![RawDetection::new([0.0, 0.0, 1.0, 1.0], 0.9, 99)]);
        let dets = adapter(model, &["grass", "sand", "dirt"]).detect(&display_frame());
        assert_eq!(dets[0].class_name(), "class_99");
        assert_eq!(dets[0].class_id(), 99);
        assert_eq!(dets[0].tier(), Tier::Danger);
        assert_eq!(dets[0].style(), Tier::Danger.style());
    }

    #[test]
    fn failing_model_contributes_nothing() {
        let adapter = adapter(StubModel::new("stub").failing("boom"), &["grass"]);
        assert!(adapter.detect(&display_frame()).is_empty());
        assert!(adapter.try_detect(&display_frame()).is_err());
    }

    #[test]
    fn applies_threshold_and_cap() {
        let raw: Vec<RawDetection> = (0..10)
            .map(|i| RawDetection::new([0.0, 0.0, 4.0, 4.0], 0.1 * i as f32, 0))
            .collect();
        let mut config = AdapterConfig::new("capped", vec!["grass".into()]);
        config.confidence_threshold = 0.35;
        config.max_detections = 3;
        let adapter = DetectorAdapter::new(
            config,
            Arc::new(StubModel::new("stub").with_detections(raw)),
            Arc::new(SafetyTaxonomy::default()),
        )
        .unwrap();
        let dets = adapter.detect(&display_frame());
        assert_eq!(dets.len(), 3);
        assert!(dets.iter().all(|d| d.confidence() >= 0.35));
    }

    #[test]
    fn cap_keeps_the_most_confident() {
        let raw = vec![
            RawDetection::new([0.0, 0.0, 4.0, 4.0], 0.6, 0),
            RawDetection::new([0.0, 0.0, 4.0, 4.0], 0.9, 1),
            RawDetection::new([0.0, 0.0, 4.0, 4.0], 0.7, 2),
        ];
        let mut config = AdapterConfig::new("capped", vec!["a".into(), "b".into(), "c".into()]);
        config.max_detections = 2;
        let adapter = DetectorAdapter::new(
            config,
            Arc::new(StubModel::new("stub").with_detections(raw)),
            Arc::new(SafetyTaxonomy::default()),
        )
        .unwrap();
        let names: Vec<String> = adapter
            .detect(&display_frame())
            .iter()
            .map(|d| d.class_name().to_string())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn boxes_are_clamped_to_the_display_frame() {
        let model = StubModel::new("stub").with_detections(vec![
            RawDetection::new([-1e12, 0.0, 1e12, 10.0], 0.9, 99),
            RawDetection::new([-50.0, 300.0, 400.0, 900.0], 0.8, 0),
        ]);
        let dets = adapter(model, &["grass"]).detect(&display_frame());
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].bbox().as_tuple(), (0, 0, 1279, 22));
        assert_eq!(dets[1].bbox().as_tuple(), (0, 675, 1279, 719));
    }

    #[test]
    fn non_finite_coordinates_are_dropped() {
        let model = StubModel::new("stub").with_detections(vec![
            RawDetection::new([f32::NEG_INFINITY, 0.0, 10.0, 10.0], 0.9, 0),
            RawDetection::new([0.0, 0.0, f32::NAN, 10.0], 0.9, 0),
            RawDetection::new([0.0, 0.0, 10.0, 10.0], 0.9, 0),
        ]);
        let dets = adapter(model, &["grass"]).detect(&display_frame());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox().as_tuple(), (0, 0, 40, 22));
    }

    #[test]
    fn model_receives_inference_resolution() {
        let model = StubModel::new("stub").expect_input(FrameSize::new(320, 320));
        let adapter = adapter(model, &["grass"]);
        assert!(adapter.try_detect(&display_frame()).is_ok());
    }

    #[test]
    fn busy_flag_clears_when_guard_drops() {
        let adapter = adapter(StubModel::new("stub"), &["grass"]);
        let guard = adapter.try_begin().expect("first begin");
        assert!(adapter.is_busy());
        assert!(adapter.try_begin().is_none());
        drop(guard);
        assert!(!adapter.is_busy());
        assert!(adapter.try_begin().is_some());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = AdapterConfig::new("bad", vec![]);
        config.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
        let mut config = AdapterConfig::new("bad", vec![]);
        config.input_size = FrameSize::new(0, 320);
        assert!(config.validate().is_err());
    }
}
