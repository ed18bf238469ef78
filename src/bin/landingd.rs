//! landingd - Emergency landing-site assessment over a video source
//!
//! This daemon:
//! 1. Loads the detector set and safety taxonomy
//! 2. Reads frames from a local file or a `stub://` source
//! 3. Writes the normal and emergency views as two image sequences, or as
//!    two video files with `--video`
//!
//! Operator controls arrive one per line on stdin:
//! `e` or a single space toggles emergency mode, `1` toggles the overlay,
//! `q` exits. Ctrl-C also exits.

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::Sender;
use std::io::BufRead;
use std::sync::Arc;

use landing_assessor::{
    Control, FileConfig, FileSource, FrameSink, FrameSource, FusionEngine, ImageSequenceSink,
    LandingConfig, Session,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "landingd",
    version,
    about = "Assess emergency landing sites in aerial video"
)]
struct Args {
    /// Input video path or stub://<name>; overrides the config file.
    #[arg(long, env = "LANDING_INPUT")]
    input: Option<String>,

    /// Directory receiving the normal and emergency streams.
    #[arg(long, env = "LANDING_OUTPUT_DIR")]
    output_dir: Option<String>,

    /// Stop after this many source frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Pace output to the source frame rate.
    #[arg(long)]
    realtime: bool,

    /// Start in emergency mode on the first frame.
    #[arg(long)]
    emergency: bool,

    /// Write normal.mp4 and emergency.mp4 instead of JPEG sequences.
    #[arg(long)]
    video: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::detect(Some(&args.ui));

    let mut config = {
        let _stage = ui.stage("Load configuration");
        LandingConfig::load()?
    };
    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir.into();
    }

    let registry = {
        let mut stage = ui.stage("Load detectors");
        let taxonomy = Arc::new(config.taxonomy()?);
        let registry = config.build_registry(taxonomy)?;
        registry.warm_up();
        stage.set_detail(format!(
            "{}/{} detectors",
            registry.len(),
            config.detectors.len()
        ));
        registry
    };
    if registry.is_empty() {
        log::warn!("no detectors loaded; overlays will stay empty");
    }

    let mut source = {
        let _stage = ui.stage("Open video source");
        FileSource::new(FileConfig {
            path: config.input.clone(),
            max_frames: args.max_frames,
            ..FileConfig::default()
        })?
    };
    let fps = source.fps();
    let mut normal_sink = open_sink(&config, "normal", fps, args.video)?;
    let mut emergency_sink = open_sink(&config, "emergency", fps, args.video)?;

    let (tx, rx) = crossbeam_channel::unbounded();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Control::Exit);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    spawn_stdin_reader(tx)?;

    let mut settings = config.session_settings();
    settings.realtime = args.realtime;
    let engine = FusionEngine::new(config.deadline);
    log::info!(
        "landingd running: {} -> {} ({} fps, display {}, deadline {} ms)",
        config.input,
        config.output_dir.display(),
        fps,
        config.display_size,
        engine.deadline().as_millis()
    );
    let mut session = Session::new(settings, registry, engine);
    if args.emergency {
        session.apply(Control::ToggleEmergency);
    }
    let stats = session.run(&mut source, normal_sink.as_mut(), emergency_sink.as_mut(), &rx)?;
    let source_stats = source.stats();
    log::info!(
        "source {}: {} frames decoded",
        source_stats.path,
        source_stats.frames_captured
    );
    println!(
        "landingd: {} frames read, {} fusion rounds; wrote {} frames to each stream",
        stats.frames_read, stats.fusion_rounds, stats.ticks
    );
    Ok(())
}

fn open_sink(config: &LandingConfig, name: &str, fps: f64, video: bool) -> Result<Box<dyn FrameSink>> {
    if !video {
        let sink = ImageSequenceSink::create(config.output_dir.join(name), fps)?;
        return Ok(Box::new(sink));
    }
    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        let path = config.output_dir.join(format!("{name}.mp4"));
        let sink = landing_assessor::ingest::VideoFileSink::create(path, config.display_size, fps)?;
        Ok(Box::new(sink))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Err(anyhow!("--video requires the ingest-file-ffmpeg feature"))
    }
}

/// Forward parsed stdin lines as controls. The thread ends at EOF or when
/// the session drops its receiver.
fn spawn_stdin_reader(tx: Sender<Control>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin-controls".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match Control::parse(&line) {
                    Some(control) => {
                        if tx.send(control).is_err() {
                            break;
                        }
                    }
                    None => log::warn!("unknown control '{}' (e, 1, q)", line.trim()),
                }
            }
        })?;
    Ok(())
}
