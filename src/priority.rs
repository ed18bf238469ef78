//! Priority resolution for the emergency overlay.
//!
//! The emergency view shows exactly one tier: SAFE if anything safe was seen,
//! otherwise CAUTION, otherwise DANGER.

use std::collections::BTreeSet;

use crate::detect::Detection;
use crate::safety::Tier;

/// The tier the emergency overlay should show, if any.
pub fn priority_tier(detections: &[Detection]) -> Option<Tier> {
    Tier::PRIORITY_ORDER
        .into_iter()
        .find(|tier| detections.iter().any(|d| d.tier() == *tier))
}

/// All detections of the highest-priority tier present, in input order.
pub fn resolve(detections: &[Detection]) -> Vec<Detection> {
    match priority_tier(detections) {
        Some(tier) => detections
            .iter()
            .filter(|d| d.tier() == tier)
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

/// Per-tier counts for one detection set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TierSummary {
    pub safe: usize,
    pub caution: usize,
    pub danger: usize,
    /// Tier selected by `resolve`.
    pub priority: Option<Tier>,
    /// Up to three distinct class names of the priority tier, sorted.
    pub priority_classes: Vec<String>,
}

impl TierSummary {
    pub const MAX_LISTED_CLASSES: usize = 3;

    pub fn from_detections(detections: &[Detection]) -> Self {
        let count = |tier: Tier| detections.iter().filter(|d| d.tier() == tier).count();
        let priority = priority_tier(detections);
        let priority_classes = match priority {
            Some(tier) => detections
                .iter()
                .filter(|d| d.tier() == tier)
                .map(|d| d.class_name().to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .take(Self::MAX_LISTED_CLASSES)
                .collect(),
            None => Vec::new(),
        };
        Self {
            safe: count(Tier::Safe),
            caution: count(Tier::Caution),
            danger: count(Tier::Danger),
            priority,
            priority_classes,
        }
    }

    pub fn count(&self, tier: Tier) -> usize {
        match tier {
            Tier::Safe => self.safe,
            Tier::Caution => self.caution,
            Tier::Danger => self.danger,
        }
    }

    /// Write the summary to the log.
    pub fn log(&self) {
        log::info!(
            "zones detected: safe={} caution={} danger={}",
            self.safe,
            self.caution,
            self.danger
        );
        match self.priority {
            Some(tier) => log::info!(
                "showing only {} zones ({}): {}",
                tier,
                tier.description(),
                self.priority_classes.join(", ")
            ),
            None => log::warn!("no zones detected"),
        }
    }
}
