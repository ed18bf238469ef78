use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use landing_assessor::config::{BackendKind, LandingConfig};
use landing_assessor::{FrameSize, Tier};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LANDING_CONFIG",
        "LANDING_INPUT",
        "LANDING_OUTPUT_DIR",
        "LANDING_DEADLINE_MS",
        "LANDING_DETECT_EVERY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "input": "stub://field",
        "output_dir": "/tmp/landing",
        "display": { "width": 640, "height": 360 },
        "fusion": { "deadline_ms": 500, "detect_every": 2 },
        "detectors": [
            {
                "id": "terrain",
                "display_name": "Terrain",
                "classes": ["grass", "road", "waterbody"],
                "confidence_threshold": 0.25,
                "max_detections": 10,
                "input": { "width": 416, "height": 416 }
            }
        ],
        "taxonomy": [
            { "class": "helipad", "tier": "SAFE" },
            { "class": "grass", "tier": "CAUTION" }
        ]
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("LANDING_CONFIG", file.path());
    std::env::set_var("LANDING_DETECT_EVERY", "5");

    let cfg = LandingConfig::load().expect("load config");

    assert_eq!(cfg.input, "stub://field");
    assert_eq!(cfg.output_dir.to_str(), Some("/tmp/landing"));
    assert_eq!(cfg.display_size, FrameSize::new(640, 360));
    assert_eq!(cfg.deadline, Duration::from_millis(500));
    assert_eq!(cfg.detect_every, 5);
    assert_eq!(cfg.detectors.len(), 1);
    let terrain = &cfg.detectors[0];
    assert_eq!(terrain.backend, BackendKind::Stub);
    assert_eq!(terrain.adapter.display_name, "Terrain");
    assert_eq!(terrain.adapter.confidence_threshold, 0.25);
    assert_eq!(terrain.adapter.max_detections, 10);
    assert_eq!(terrain.adapter.input_size, FrameSize::new(416, 416));

    let taxonomy = cfg.taxonomy().expect("taxonomy");
    assert_eq!(taxonomy.len(), 2);
    assert_eq!(taxonomy.classify("Helipad"), Tier::Safe);
    assert_eq!(taxonomy.classify("grass"), Tier::Caution);
    assert_eq!(taxonomy.classify("road"), Tier::Danger);

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
input = "stub://toml"

[fusion]
deadline_ms = 250

[[detectors]]
id = "objects"
classes = ["car", "human"]
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("LANDING_CONFIG", file.path());
    std::env::set_var("LANDING_INPUT", "stub://env");

    let cfg = LandingConfig::load().expect("load config");
    assert_eq!(cfg.input, "stub://env");
    assert_eq!(cfg.deadline, Duration::from_millis(250));
    assert_eq!(cfg.detect_every, 3);
    assert_eq!(cfg.detectors[0].adapter.id, "objects");
    assert_eq!(cfg.detectors[0].adapter.display_name, "objects");

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = LandingConfig::load().expect("load defaults");
    assert_eq!(cfg.display_size, FrameSize::new(1280, 720));
    assert_eq!(cfg.deadline, Duration::from_millis(800));
    assert_eq!(cfg.detectors.len(), 4);
    assert!(cfg
        .detectors
        .iter()
        .all(|d| d.backend == BackendKind::Tract && d.model_path.is_some()));
    assert_eq!(cfg.taxonomy().expect("taxonomy").len(), 30);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LANDING_DEADLINE_MS", "soon");
    assert!(LandingConfig::load().is_err());
    std::env::set_var("LANDING_DEADLINE_MS", "0");
    assert!(LandingConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(
        br#"{ "detectors": [ { "id": "d", "classes": [], "confidence_threshold": 1.5 } ] }"#,
    )
    .expect("write config");
    std::env::set_var("LANDING_CONFIG", file.path());
    assert!(LandingConfig::load().is_err());

    std::env::set_var("LANDING_CONFIG", "/nonexistent/landing.json");
    assert!(LandingConfig::load().is_err());

    clear_env();
}
