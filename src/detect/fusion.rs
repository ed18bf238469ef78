//! Fusion engine.
//!
//! Fans one frame out to every registered detector on its own thread and fans
//! the results back in through a channel, waiting at most one shared deadline.
//! Late detectors are not cancelled: their threads run to completion and the
//! result is dropped. A detector whose previous call is still running is not
//! relaunched, so a persistently slow model never has more than one call in
//! flight.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use super::registry::DetectorRegistry;
use super::result::Detection;
use crate::frame::Frame;

pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(800);

/// What happened to one detector during a fusion round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorOutcome {
    /// Finished within the deadline with this many detections.
    Completed(usize),
    /// Did not finish within the deadline.
    TimedOut,
    /// Still busy with an earlier frame; not launched.
    Busy,
    /// The detector thread panicked or could not be spawned.
    Crashed,
}

/// Merged detections plus per-detector bookkeeping for one round.
#[derive(Clone, Debug, Default)]
pub struct FusionReport {
    pub detections: Vec<Detection>,
    /// One entry per registered detector, in registration order.
    pub outcomes: Vec<(String, DetectorOutcome)>,
    pub elapsed: Duration,
}

impl FusionReport {
    pub fn outcome(&self, detector: &str) -> Option<&DetectorOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == detector)
            .map(|(_, outcome)| outcome)
    }
}

/// Concurrent, deadline-bounded aggregation over all detectors.
#[derive(Clone, Debug)]
pub struct FusionEngine {
    deadline: Duration,
}

impl FusionEngine {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Union of every detector's contribution, in registration order.
    pub fn fuse(&self, frame: &Arc<Frame>, detectors: &DetectorRegistry) -> Vec<Detection> {
        self.fuse_with_report(frame, detectors).detections
    }

    pub fn fuse_with_report(&self, frame: &Arc<Frame>, detectors: &DetectorRegistry) -> FusionReport {
        let start = Instant::now();
        let deadline = start + self.deadline;
        let count = detectors.len();

        let mut slots: Vec<Option<Vec<Detection>>> = vec![None; count];
        let mut outcomes: Vec<DetectorOutcome> = vec![DetectorOutcome::TimedOut; count];
        // Unbounded so a late sender never blocks after the receiver is gone.
        let (tx, rx) = crossbeam_channel::unbounded::<(usize, Option<Vec<Detection>>)>();

        let mut launched = 0usize;
        for (index, adapter) in detectors.iter().enumerate() {
            let Some(guard) = adapter.try_begin() else {
                log::warn!("detector {}: still busy, skipping frame", adapter.id());
                outcomes[index] = DetectorOutcome::Busy;
                continue;
            };
            let tx = tx.clone();
            let frame = Arc::clone(frame);
            let spawned = std::thread::Builder::new()
                .name(format!("detector-{}", adapter.id()))
                .spawn(move || {
                    let adapter = guard.adapter();
                    let result = catch_unwind(AssertUnwindSafe(|| adapter.detect(&frame)));
                    let contribution = match result {
                        Ok(detections) => Some(detections),
                        Err(_) => {
                            log::error!("detector {}: inference panicked", adapter.id());
                            None
                        }
                    };
                    // Free the adapter before reporting so the next round can launch it.
                    drop(guard);
                    // Receiver may already be gone if we missed the deadline.
                    let _ = tx.send((index, contribution));
                });
            match spawned {
                Ok(_) => launched += 1,
                Err(e) => {
                    log::error!("detector {}: failed to spawn worker: {}", adapter.id(), e);
                    outcomes[index] = DetectorOutcome::Crashed;
                }
            }
        }
        drop(tx);

        let mut received = 0usize;
        while received < launched {
            match rx.recv_deadline(deadline) {
                Ok((index, contribution)) => {
                    received += 1;
                    match contribution {
                        Some(detections) => {
                            outcomes[index] = DetectorOutcome::Completed(detections.len());
                            slots[index] = Some(detections);
                        }
                        None => outcomes[index] = DetectorOutcome::Crashed,
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let ids = detectors.list();
        for (id, outcome) in ids.iter().zip(&outcomes) {
            if *outcome == DetectorOutcome::TimedOut {
                log::warn!(
                    "detector {}: no result within {} ms, contributing nothing",
                    id,
                    self.deadline.as_millis()
                );
            }
        }

        let detections: Vec<Detection> = slots.into_iter().flatten().flatten().collect();
        let elapsed = start.elapsed();
        log::debug!(
            "fusion: {} detections from {}/{} detectors in {} ms",
            detections.len(),
            received,
            count,
            elapsed.as_millis()
        );

        FusionReport {
            detections,
            outcomes: ids.into_iter().zip(outcomes).collect(),
            elapsed,
        }
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DEADLINE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::adapter::{AdapterConfig, DetectorAdapter};
    use crate::detect::backends::StubModel;
    use crate::detect::result::RawDetection;
    use crate::frame::FrameSize;
    use crate::safety::SafetyTaxonomy;

    fn register(registry: &mut DetectorRegistry, id: &str, model: StubModel, classes: &[&str]) {
        let config = AdapterConfig::new(id, classes.iter().map(|c| c.to_string()).collect());
        let adapter =
            DetectorAdapter::new(config, Arc::new(model), Arc::new(SafetyTaxonomy::default()))
                .unwrap();
        registry.register(adapter).unwrap();
    }

    fn one_box(class_id: u32) -> Vec<RawDetection> {
        vec![RawDetection::new([0.0, 0.0, 32.0, 32.0], 0.9, class_id)]
    }

    fn frame() -> Arc<Frame> {
        Arc::new(Frame::filled(FrameSize::new(640, 360), [0, 0, 0]))
    }

    #[test]
    fn concatenates_in_registration_order() {
        let mut registry = DetectorRegistry::new();
        register(
            &mut registry,
            "slow",
            StubModel::new("slow")
                .with_detections(one_box(0))
                .with_latency(Duration::from_millis(60)),
            &["building"],
        );
        register(
            &mut registry,
            "fast",
            StubModel::new("fast").with_detections(one_box(0)),
            &["grass"],
        );

        let dets = FusionEngine::default().fuse(&frame(), &registry);
        let sources: Vec<&str> = dets.iter().map(|d| d.source_detector()).collect();
        assert_eq!(sources, vec!["slow", "fast"]);
    }

    #[test]
    fn no_cross_detector_suppression() {
        let mut registry = DetectorRegistry::new();
        register(&mut registry, "a", StubModel::new("a").with_detections(one_box(0)), &["grass"]);
        register(&mut registry, "b", StubModel::new("b").with_detections(one_box(0)), &["grass"]);
        let dets = FusionEngine::default().fuse(&frame(), &registry);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].bbox(), dets[1].bbox());
    }

    #[test]
    fn failing_and_panicking_detectors_are_isolated() {
        let mut registry = DetectorRegistry::new();
        register(&mut registry, "bad", StubModel::new("bad").failing("no gpu"), &["grass"]);
        register(&mut registry, "boom", StubModel::new("boom").panicking(), &["grass"]);
        register(&mut registry, "ok", StubModel::new("ok").with_detections(one_box(0)), &["sand"]);

        let report = FusionEngine::default().fuse_with_report(&frame(), &registry);
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.detections[0].class_name(), "sand");
        assert_eq!(report.outcome("bad"), Some(&DetectorOutcome::Completed(0)));
        assert_eq!(report.outcome("boom"), Some(&DetectorOutcome::Crashed));
        assert_eq!(report.outcome("ok"), Some(&DetectorOutcome::Completed(1)));
    }

    #[test]
    fn empty_registry_yields_nothing() {
        let report = FusionEngine::default().fuse_with_report(&frame(), &DetectorRegistry::new());
        assert!(report.detections.is_empty());
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn busy_detector_is_not_relaunched() {
        let mut registry = DetectorRegistry::new();
        register(
            &mut registry,
            "laggard",
            StubModel::new("laggard")
                .with_detections(one_box(0))
                .with_latency(Duration::from_millis(400)),
            &["grass"],
        );
        let engine = FusionEngine::new(Duration::from_millis(20));

        let first = engine.fuse_with_report(&frame(), &registry);
        assert_eq!(first.outcome("laggard"), Some(&DetectorOutcome::TimedOut));

        let second = engine.fuse_with_report(&frame(), &registry);
        assert_eq!(second.outcome("laggard"), Some(&DetectorOutcome::Busy));
        assert!(second.detections.is_empty());
    }
}
