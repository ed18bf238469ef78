//! Session controller.
//!
//! Drives the frame loop: read, fuse, render both views, write both streams.
//! Mode flags live in `SessionState`; rendering and priority resolution are
//! plain functions of that state and the current frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{Receiver, TryRecvError};

use crate::detect::{Detection, DetectorRegistry, FusionEngine};
use crate::frame::{Frame, FrameSize};
use crate::ingest::{FrameSink, FrameSource};
use crate::overlay::{self, ViewMode};
use crate::priority::TierSummary;

pub const DEFAULT_DISPLAY_SIZE: FrameSize = FrameSize::new(1280, 720);
pub const DEFAULT_DETECT_EVERY: u32 = 3;

/// Operator input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Enter or leave emergency mode (freezes the current frame).
    ToggleEmergency,
    /// Show or hide detection overlays in both views.
    ToggleOverlay,
    Exit,
}

impl Control {
    /// Parse one line of operator input.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim_end_matches(['\r', '\n']) {
            " " | "e" | "E" | "space" => Some(Control::ToggleEmergency),
            "1" | "o" | "O" => Some(Control::ToggleOverlay),
            "q" | "Q" | "exit" | "quit" => Some(Control::Exit),
            _ => None,
        }
    }
}

/// Frozen frame plus the detections computed for it when emergency mode began.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub frame: Arc<Frame>,
    pub detections: Vec<Detection>,
    pub frame_index: u64,
    pub summary: TierSummary,
}

/// Mode flags and carried-over detections.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub show_detections: bool,
    pub snapshot: Option<Snapshot>,
    pub exit_requested: bool,
    pub frame_index: u64,
    /// Detections reused on frames between fusion rounds.
    pub last_detections: Vec<Detection>,
    /// Emergency was requested before any frame was read.
    pub emergency_pending: bool,
}

impl SessionState {
    pub fn is_emergency(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn view_mode(&self) -> ViewMode {
        if self.is_emergency() {
            ViewMode::Emergency
        } else {
            ViewMode::Normal
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            show_detections: true,
            snapshot: None,
            exit_requested: false,
            frame_index: 0,
            last_detections: Vec::new(),
            emergency_pending: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub display_size: FrameSize,
    /// Run fusion on every Nth frame read.
    pub detect_every: u32,
    /// Pace normal-mode ticks to the source frame rate.
    pub realtime: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            display_size: DEFAULT_DISPLAY_SIZE,
            detect_every: DEFAULT_DETECT_EVERY,
            realtime: false,
        }
    }
}

/// Both views rendered for one tick.
pub struct Rendered {
    pub normal: Frame,
    pub emergency: Frame,
    /// The view the operator is currently looking at.
    pub displayed: ViewMode,
}

impl Rendered {
    pub fn displayed_frame(&self) -> &Frame {
        match self.displayed {
            ViewMode::Normal => &self.normal,
            ViewMode::Emergency => &self.emergency,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_read: u64,
    pub ticks: u64,
    pub fusion_rounds: u64,
}

pub struct Session {
    settings: SessionSettings,
    detectors: DetectorRegistry,
    engine: FusionEngine,
    state: SessionState,
    current: Option<Arc<Frame>>,
    stats: SessionStats,
}

impl Session {
    pub fn new(settings: SessionSettings, detectors: DetectorRegistry, engine: FusionEngine) -> Self {
        Self {
            settings,
            detectors,
            engine,
            state: SessionState::default(),
            current: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn detectors(&self) -> &DetectorRegistry {
        &self.detectors
    }

    /// Apply one operator control to the session state.
    pub fn apply(&mut self, control: Control) {
        match control {
            Control::ToggleEmergency => {
                if self.state.is_emergency() {
                    self.state.snapshot = None;
                    log::info!("returning to normal mode");
                } else if self.current.is_none() {
                    self.state.emergency_pending = !self.state.emergency_pending;
                    if self.state.emergency_pending {
                        log::info!("emergency mode will engage on the first frame");
                    }
                } else {
                    self.enter_emergency();
                }
            }
            Control::ToggleOverlay => {
                self.state.show_detections = !self.state.show_detections;
                log::info!(
                    "detection overlay {}",
                    if self.state.show_detections { "on" } else { "off" }
                );
            }
            Control::Exit => self.state.exit_requested = true,
        }
    }

    fn enter_emergency(&mut self) {
        let Some(frame) = self.current.clone() else {
            return;
        };
        log::warn!("EMERGENCY MODE at frame {}", self.state.frame_index);
        let detections = self.fuse(&frame);
        let summary = TierSummary::from_detections(&detections);
        summary.log();
        self.state.snapshot = Some(Snapshot {
            frame,
            detections,
            frame_index: self.state.frame_index,
            summary,
        });
    }

    fn fuse(&mut self, frame: &Arc<Frame>) -> Vec<Detection> {
        self.stats.fusion_rounds += 1;
        self.engine.fuse(frame, &self.detectors)
    }

    /// Advance one tick. Returns `None` once the source is exhausted.
    ///
    /// In emergency mode the source is not read; the frozen snapshot is
    /// rendered again.
    pub fn tick(&mut self, source: &mut dyn FrameSource) -> Result<Option<Rendered>> {
        let (frame, detections) = match &self.state.snapshot {
            Some(snapshot) => (Arc::clone(&snapshot.frame), snapshot.detections.clone()),
            None => {
                let Some(raw) = source.next_frame()? else {
                    return Ok(None);
                };
                self.stats.frames_read += 1;
                self.state.frame_index += 1;
                let display = Arc::new(raw.resized(self.settings.display_size));
                let every = self.settings.detect_every.max(1) as u64;
                if self.state.frame_index % every == 0 {
                    self.state.last_detections = self.fuse(&display);
                }
                self.current = Some(Arc::clone(&display));
                if std::mem::take(&mut self.state.emergency_pending) {
                    self.enter_emergency();
                }
                match &self.state.snapshot {
                    Some(snapshot) => (Arc::clone(&snapshot.frame), snapshot.detections.clone()),
                    None => (display, self.state.last_detections.clone()),
                }
            }
        };

        self.stats.ticks += 1;
        let show = self.state.show_detections;
        Ok(Some(Rendered {
            normal: overlay::render_normal(&frame, &detections, show),
            emergency: overlay::render_emergency(&frame, &detections, show),
            displayed: self.state.view_mode(),
        }))
    }

    /// Run until the source ends or `Control::Exit` arrives. Every tick writes
    /// one frame to each sink.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        normal_sink: &mut dyn FrameSink,
        emergency_sink: &mut dyn FrameSink,
        controls: &Receiver<Control>,
    ) -> Result<SessionStats> {
        let fps = source.fps();
        let frame_period = if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::ZERO
        };

        loop {
            let tick_start = Instant::now();
            loop {
                match controls.try_recv() {
                    Ok(control) => self.apply(control),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }
            if self.state.exit_requested {
                log::info!("exit requested");
                break;
            }

            let Some(rendered) = self.tick(source)? else {
                log::info!("end of stream");
                break;
            };
            normal_sink.write(&rendered.normal)?;
            emergency_sink.write(&rendered.emergency)?;

            // A frozen snapshot would otherwise spin as fast as rendering allows.
            if self.settings.realtime || self.state.is_emergency() {
                if let Some(rest) = frame_period.checked_sub(tick_start.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }

        normal_sink.finish()?;
        emergency_sink.finish()?;
        log::info!(
            "session finished: {} frames read, {} ticks, {} fusion rounds",
            self.stats.frames_read,
            self.stats.ticks,
            self.stats.fusion_rounds
        );
        Ok(self.stats.clone())
    }
}
