use std::sync::Arc;
use std::time::Duration;

use landing_assessor::ingest::CollectingSink;
use landing_assessor::{
    AdapterConfig, Control, DetectorAdapter, DetectorRegistry, FileConfig, FileSource,
    FusionEngine, FrameSize, RawDetection, SafetyTaxonomy, Session, SessionSettings, StubModel,
    Tier, ViewMode,
};

const DISPLAY: FrameSize = FrameSize::new(320, 180);

fn session(detect_every: u32) -> Session {
    let model = StubModel::new("terrain").with_detections(vec![
        RawDetection::new([0.0, 0.0, 160.0, 160.0], 0.9, 0),
        RawDetection::new([160.0, 160.0, 320.0, 320.0], 0.8, 1),
    ]);
    let adapter = DetectorAdapter::new(
        AdapterConfig::new("terrain", vec!["grass".to_string(), "car".to_string()]),
        Arc::new(model),
        Arc::new(SafetyTaxonomy::default()),
    )
    .expect("adapter");
    let mut registry = DetectorRegistry::new();
    registry.register(adapter).expect("register");

    let settings = SessionSettings {
        display_size: DISPLAY,
        detect_every,
        realtime: false,
    };
    Session::new(settings, registry, FusionEngine::new(Duration::from_millis(500)))
}

fn source(frames: u64) -> FileSource {
    FileSource::new(FileConfig {
        path: "stub://session".into(),
        max_frames: Some(frames),
        ..FileConfig::default()
    })
    .expect("stub source")
}

#[test]
fn writes_both_streams_every_tick() {
    let mut session = session(3);
    let mut source = source(7);
    let mut normal = CollectingSink::default();
    let mut emergency = CollectingSink::default();
    let (_tx, rx) = crossbeam_channel::unbounded();

    let stats = session
        .run(&mut source, &mut normal, &mut emergency, &rx)
        .expect("run");

    assert_eq!(stats.frames_read, 7);
    assert_eq!(stats.ticks, 7);
    // frames 3 and 6
    assert_eq!(stats.fusion_rounds, 2);
    assert_eq!(normal.frames.len(), 7);
    assert_eq!(emergency.frames.len(), 7);
    assert!(normal.finished && emergency.finished);
    assert!(normal.frames.iter().all(|f| f.size() == DISPLAY));
    // Detections from frame 6 carry over to frame 7.
    assert_eq!(session.state().last_detections.len(), 2);
}

#[test]
fn exit_control_stops_before_reading() {
    let mut session = session(1);
    let mut source = source(10);
    let mut normal = CollectingSink::default();
    let mut emergency = CollectingSink::default();
    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(Control::Exit).expect("send");

    let stats = session
        .run(&mut source, &mut normal, &mut emergency, &rx)
        .expect("run");
    assert_eq!(stats.ticks, 0);
    assert!(normal.frames.is_empty());
    assert!(normal.finished && emergency.finished);
}

#[test]
fn emergency_freezes_the_frame_until_released() {
    let mut session = session(100);
    let mut source = source(10);

    session.tick(&mut source).expect("tick").expect("frame");
    session.apply(Control::ToggleEmergency);
    let snapshot = session.state().snapshot.clone().expect("snapshot");
    assert_eq!(snapshot.frame_index, 1);
    assert_eq!(snapshot.detections.len(), 2);
    assert_eq!(snapshot.summary.priority, Some(Tier::Safe));
    assert_eq!(snapshot.summary.count(Tier::Danger), 1);

    for _ in 0..3 {
        let rendered = session.tick(&mut source).expect("tick").expect("frame");
        assert_eq!(rendered.displayed, ViewMode::Emergency);
        assert_eq!(rendered.normal.size(), DISPLAY);
        assert_eq!(rendered.displayed_frame().pixels(), rendered.emergency.pixels());
    }
    assert_eq!(session.stats().frames_read, 1);
    assert_eq!(session.stats().fusion_rounds, 1);

    session.apply(Control::ToggleEmergency);
    let rendered = session.tick(&mut source).expect("tick").expect("frame");
    assert_eq!(rendered.displayed, ViewMode::Normal);
    assert_eq!(rendered.displayed_frame().pixels(), rendered.normal.pixels());
    assert_eq!(session.stats().frames_read, 2);
}

#[test]
fn emergency_requested_before_first_frame_engages_on_it() {
    let mut session = session(100);
    let mut source = source(10);

    session.apply(Control::ToggleEmergency);
    assert!(!session.state().is_emergency());

    let rendered = session.tick(&mut source).expect("tick").expect("frame");
    assert_eq!(rendered.displayed, ViewMode::Emergency);
    assert!(session.state().is_emergency());
    assert_eq!(session.stats().fusion_rounds, 1);
}

#[test]
fn hidden_overlay_passes_frames_through() {
    let mut session = session(1);
    let mut source = source(3);

    let shown = session.tick(&mut source).expect("tick").expect("frame");
    assert_ne!(shown.normal.pixels(), shown.emergency.pixels());

    session.apply(Control::ToggleOverlay);
    let hidden = session.tick(&mut source).expect("tick").expect("frame");
    assert_eq!(hidden.normal.pixels(), hidden.emergency.pixels());
}

#[test]
fn out_of_frame_detections_do_not_stop_the_loop() {
    let model = StubModel::new("wild").with_detections(vec![
        RawDetection::new([-1e12, 0.0, 1e12, 10.0], 0.9, 99),
        RawDetection::new([f32::NEG_INFINITY, 0.0, 10.0, f32::INFINITY], 0.9, 0),
    ]);
    let adapter = DetectorAdapter::new(
        AdapterConfig::new("wild", vec!["grass".to_string()]),
        Arc::new(model),
        Arc::new(SafetyTaxonomy::default()),
    )
    .expect("adapter");
    let mut registry = DetectorRegistry::new();
    registry.register(adapter).expect("register");
    let settings = SessionSettings {
        display_size: DISPLAY,
        detect_every: 1,
        realtime: false,
    };
    let mut session = Session::new(settings, registry, FusionEngine::new(Duration::from_millis(500)));
    let mut source = source(2);

    let rendered = session.tick(&mut source).expect("tick").expect("frame");
    let detections = &session.state().last_detections;
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].bbox().as_tuple(), (0, 0, 319, 5));
    assert_eq!(detections[0].tier(), Tier::Danger);
    assert_eq!(rendered.emergency.size(), DISPLAY);

    session.apply(Control::ToggleEmergency);
    assert!(session.tick(&mut source).expect("tick").is_some());
}
