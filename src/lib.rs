//! Emergency landing-site assessment for aerial video.
//!
//! Several detectors look at each frame concurrently; every detected region is
//! tagged with a landing-safety tier, and two views are rendered: a normal
//! overlay with everything, and an emergency overlay showing only the best
//! tier present (SAFE over CAUTION over DANGER).
//!
//! # Module Structure
//!
//! - `safety`: class name to tier table and per-tier render styles
//! - `detect`: model capability, detector adapters, registry, fusion engine
//! - `priority`: emergency tier selection and summaries
//! - `overlay`: drawing both views
//! - `ingest`: frame sources and sinks
//! - `session`: the frame loop and operator controls
//! - `config`: layered configuration for the binaries

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod priority;
pub mod safety;
pub mod session;

pub use config::{BackendKind, DetectorSettings, LandingConfig};
pub use detect::{
    AdapterConfig, BoundingBox, Detection, DetectionModel, DetectorAdapter, DetectorOutcome,
    DetectorRegistry, FusionEngine, FusionReport, InferenceParams, RawDetection, StubModel,
};
pub use frame::{Frame, FrameSize};
pub use ingest::{FileConfig, FileSource, FrameSink, FrameSource, ImageSequenceSink};
pub use overlay::ViewMode;
pub use priority::{priority_tier, resolve, TierSummary};
pub use safety::{RenderStyle, SafetyTaxonomy, TaxonomyEntry, Tier};
pub use session::{Control, Session, SessionSettings, SessionState, SessionStats};
