use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::{
    AdapterConfig, DetectionModel, DetectorAdapter, DetectorRegistry, StubModel,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_DEADLINE, DEFAULT_INPUT_SIZE, DEFAULT_MAX_DETECTIONS,
};
use crate::frame::FrameSize;
use crate::safety::{SafetyTaxonomy, TaxonomyEntry};
use crate::session::{SessionSettings, DEFAULT_DETECT_EVERY, DEFAULT_DISPLAY_SIZE};

const DEFAULT_INPUT: &str = "stub://flight";
const DEFAULT_OUTPUT_DIR: &str = "landing_out";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LandingConfigFile {
    input: Option<String>,
    output_dir: Option<PathBuf>,
    display: Option<SizeFile>,
    fusion: Option<FusionConfigFile>,
    detectors: Option<Vec<DetectorConfigFile>>,
    taxonomy: Option<Vec<TaxonomyEntry>>,
}

#[derive(Debug, Deserialize, Default)]
struct SizeFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FusionConfigFile {
    deadline_ms: Option<u64>,
    detect_every: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DetectorConfigFile {
    id: String,
    display_name: Option<String>,
    backend: Option<BackendKind>,
    model_path: Option<PathBuf>,
    classes: Vec<String>,
    confidence_threshold: Option<f32>,
    max_detections: Option<usize>,
    input: Option<SizeFile>,
}

/// Which model implementation backs a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Synthetic brightness-grid model; needs no weights.
    Stub,
    /// ONNX model via tract (feature `backend-tract`).
    Tract,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub adapter: AdapterConfig,
    pub backend: BackendKind,
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LandingConfig {
    pub input: String,
    pub output_dir: PathBuf,
    pub display_size: FrameSize,
    pub deadline: Duration,
    pub detect_every: u32,
    pub detectors: Vec<DetectorSettings>,
    /// `None` means the built-in table.
    pub taxonomy: Option<Vec<TaxonomyEntry>>,
}

impl LandingConfig {
    /// Defaults, then the file named by `LANDING_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LANDING_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LandingConfigFile) -> Result<Self> {
        let display = file.display.unwrap_or_default();
        let fusion = file.fusion.unwrap_or_default();
        let detectors = match file.detectors {
            Some(detectors) => detectors.into_iter().map(DetectorSettings::from_file).collect(),
            None => default_detectors(),
        };
        Ok(Self {
            input: file.input.unwrap_or_else(|| DEFAULT_INPUT.to_string()),
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            display_size: FrameSize::new(
                display.width.unwrap_or(DEFAULT_DISPLAY_SIZE.width),
                display.height.unwrap_or(DEFAULT_DISPLAY_SIZE.height),
            ),
            deadline: fusion
                .deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DEADLINE),
            detect_every: fusion.detect_every.unwrap_or(DEFAULT_DETECT_EVERY),
            detectors,
            taxonomy: file.taxonomy,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(input) = std::env::var("LANDING_INPUT") {
            if !input.trim().is_empty() {
                self.input = input;
            }
        }
        if let Ok(dir) = std::env::var("LANDING_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(deadline) = std::env::var("LANDING_DEADLINE_MS") {
            let ms: u64 = deadline
                .trim()
                .parse()
                .map_err(|_| anyhow!("LANDING_DEADLINE_MS must be an integer number of milliseconds"))?;
            self.deadline = Duration::from_millis(ms);
        }
        if let Ok(every) = std::env::var("LANDING_DETECT_EVERY") {
            self.detect_every = every
                .trim()
                .parse()
                .map_err(|_| anyhow!("LANDING_DETECT_EVERY must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.display_size.is_empty() {
            return Err(anyhow!("display size must be non-zero"));
        }
        if self.deadline.is_zero() {
            return Err(anyhow!("fusion deadline must be greater than zero"));
        }
        if self.detect_every == 0 {
            return Err(anyhow!("detect_every must be greater than zero"));
        }
        let mut seen = std::collections::HashSet::new();
        for detector in &self.detectors {
            detector.adapter.validate()?;
            if !seen.insert(detector.adapter.id.as_str()) {
                return Err(anyhow!("duplicate detector id '{}'", detector.adapter.id));
            }
            if detector.backend == BackendKind::Tract && detector.model_path.is_none() {
                return Err(anyhow!(
                    "detector {}: tract backend needs a model_path",
                    detector.adapter.id
                ));
            }
        }
        if let Some(entries) = &self.taxonomy {
            SafetyTaxonomy::from_overrides(entries)?;
        }
        Ok(())
    }

    pub fn taxonomy(&self) -> Result<SafetyTaxonomy> {
        match &self.taxonomy {
            Some(entries) => SafetyTaxonomy::from_overrides(entries),
            None => Ok(SafetyTaxonomy::default()),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            display_size: self.display_size,
            detect_every: self.detect_every,
            ..SessionSettings::default()
        }
    }

    /// Load every configured model and register its adapter.
    ///
    /// A detector whose model fails to load is skipped with an error log, so
    /// the session can still run on the remaining ones.
    pub fn build_registry(&self, taxonomy: Arc<SafetyTaxonomy>) -> Result<DetectorRegistry> {
        let mut registry = DetectorRegistry::new();
        for detector in &self.detectors {
            let model = match detector.load_model() {
                Ok(model) => model,
                Err(e) => {
                    log::error!("detector {}: {:#}", detector.adapter.id, e);
                    continue;
                }
            };
            let adapter = DetectorAdapter::new(detector.adapter.clone(), model, Arc::clone(&taxonomy))?;
            log::info!(
                "{}: {} classes via {}",
                detector.adapter.display_name,
                detector.adapter.classes.len(),
                adapter.model_name()
            );
            registry.register(adapter)?;
        }
        Ok(registry)
    }
}

impl DetectorSettings {
    fn from_file(file: DetectorConfigFile) -> Self {
        let input = file.input.unwrap_or_default();
        let adapter = AdapterConfig {
            display_name: file.display_name.unwrap_or_else(|| file.id.clone()),
            id: file.id,
            classes: file.classes,
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            max_detections: file.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
            input_size: FrameSize::new(
                input.width.unwrap_or(DEFAULT_INPUT_SIZE.width),
                input.height.unwrap_or(DEFAULT_INPUT_SIZE.height),
            ),
        };
        let backend = file.backend.unwrap_or(if file.model_path.is_some() {
            BackendKind::Tract
        } else {
            BackendKind::Stub
        });
        Self {
            adapter,
            backend,
            model_path: file.model_path,
        }
    }

    pub fn load_model(&self) -> Result<Arc<dyn DetectionModel>> {
        match self.backend {
            BackendKind::Stub => Ok(Arc::new(StubModel::grid(
                self.adapter.id.clone(),
                self.adapter.classes.len(),
            ))),
            BackendKind::Tract => self.load_tract(),
        }
    }

    #[cfg(feature = "backend-tract")]
    fn load_tract(&self) -> Result<Arc<dyn DetectionModel>> {
        let path = self
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("tract backend needs a model_path"))?;
        if !path.exists() {
            return Err(anyhow!("model not found: {}", path.display()));
        }
        let model = crate::detect::TractModel::new(path, self.adapter.input_size)?;
        Ok(Arc::new(model))
    }

    #[cfg(not(feature = "backend-tract"))]
    fn load_tract(&self) -> Result<Arc<dyn DetectionModel>> {
        Err(anyhow!("tract backend requires the backend-tract feature"))
    }
}

/// The four stock landcover detectors, backed by ONNX exports of their weights.
fn default_detectors() -> Vec<DetectorSettings> {
    let stock = |id: &str, name: &str, classes: &[&str], threshold: f32, cap: usize| {
        let mut adapter = AdapterConfig::new(id, classes.iter().map(|c| c.to_string()).collect());
        adapter.display_name = name.to_string();
        adapter.confidence_threshold = threshold;
        adapter.max_detections = cap;
        DetectorSettings {
            adapter,
            backend: BackendKind::Tract,
            model_path: Some(PathBuf::from(format!(
                "runs/landcover_yolo_{}/weights/best.onnx",
                id.replace('_', "")
            ))),
        }
    };
    vec![
        stock("model_2", "Building", &["building"], 0.5, 40),
        stock(
            "model_4",
            "Objects",
            &[
                "ar-marker", "bald-tree", "bicycle", "car", "dirt", "dog", "door", "fence",
                "fence-pole", "grass", "gravel", "human", "log", "metal", "misc", "mobile-home",
                "other", "pickup-truck", "pole", "rocks", "sand", "tree", "wood",
            ],
            0.3,
            60,
        ),
        stock(
            "model_14",
            "Vehicles",
            &["small-vehicle", "large-vehicle", "human"],
            0.5,
            40,
        ),
        stock(
            "model_15",
            "Landcover",
            &["buildings", "road", "vegetation", "waterbody"],
            0.5,
            40,
        ),
    ]
}

fn read_config_file(path: &Path) -> Result<LandingConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
