mod adapter;
mod backend;
pub mod backends;
mod fusion;
mod registry;
mod result;

pub use adapter::{
    AdapterConfig, DetectorAdapter, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_SIZE,
    DEFAULT_MAX_DETECTIONS,
};
pub use backend::{DetectionModel, InferenceParams};
pub use backends::StubModel;
#[cfg(feature = "backend-tract")]
pub use backends::TractModel;
pub use fusion::{DetectorOutcome, FusionEngine, FusionReport, DEFAULT_DEADLINE};
pub use registry::DetectorRegistry;
pub use result::{BoundingBox, Detection, RawDetection};
