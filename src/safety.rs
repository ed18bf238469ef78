//! Safety taxonomy.
//!
//! Maps detector class names onto landing-safety tiers and carries the render
//! style for each tier. The table is ordered: the substring fallback scans it
//! in declaration order, so reordering entries changes fallback results.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Landing-safety tier of a detected region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Safe,
    Caution,
    Danger,
}

impl Tier {
    /// All tiers, highest landing priority first.
    pub const PRIORITY_ORDER: [Tier; 3] = [Tier::Safe, Tier::Caution, Tier::Danger];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Safe => "SAFE",
            Tier::Caution => "CAUTION",
            Tier::Danger => "DANGER",
        }
    }

    /// Rendering style for this tier.
    pub fn style(self) -> RenderStyle {
        match self {
            Tier::Safe => SAFE_STYLE,
            Tier::Caution => CAUTION_STYLE,
            Tier::Danger => DANGER_STYLE,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Tier::Safe => "Safe - landing possible",
            Tier::Caution => "Caution - landing not recommended",
            Tier::Danger => "Danger - avoid landing",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAFE" => Ok(Tier::Safe),
            "CAUTION" => Ok(Tier::Caution),
            "DANGER" => Ok(Tier::Danger),
            other => Err(anyhow!("unknown safety tier '{}'", other)),
        }
    }
}

/// RGB color.
pub type Rgb = [u8; 3];

/// Stroke and fill parameters the overlay renderer consumes per detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderStyle {
    pub stroke_color: Rgb,
    pub stroke_width: u32,
    pub fill_color: Rgb,
    /// Fill opacity in 0..1.
    pub fill_opacity: f32,
}

const SAFE_STYLE: RenderStyle = RenderStyle {
    stroke_color: [0, 255, 0],
    stroke_width: 3,
    fill_color: [0, 255, 0],
    fill_opacity: 0.4,
};

const CAUTION_STYLE: RenderStyle = RenderStyle {
    stroke_color: [255, 255, 0],
    stroke_width: 2,
    fill_color: [255, 255, 0],
    fill_opacity: 0.3,
};

const DANGER_STYLE: RenderStyle = RenderStyle {
    stroke_color: [255, 0, 0],
    stroke_width: 2,
    fill_color: [255, 0, 0],
    fill_opacity: 0.25,
};

/// Stock class table covering the vocabularies of the bundled detectors.
pub const DEFAULT_ENTRIES: &[(&str, Tier)] = &[
    ("building", Tier::Danger),
    ("ar-marker", Tier::Caution),
    ("bald-tree", Tier::Danger),
    ("bicycle", Tier::Danger),
    ("car", Tier::Danger),
    ("dirt", Tier::Safe),
    ("dog", Tier::Danger),
    ("door", Tier::Danger),
    ("fence", Tier::Danger),
    ("fence-pole", Tier::Danger),
    ("grass", Tier::Safe),
    ("gravel", Tier::Caution),
    ("human", Tier::Danger),
    ("log", Tier::Danger),
    ("metal", Tier::Danger),
    ("misc", Tier::Caution),
    ("mobile-home", Tier::Danger),
    ("other", Tier::Caution),
    ("pickup-truck", Tier::Danger),
    ("pole", Tier::Danger),
    ("rocks", Tier::Danger),
    ("sand", Tier::Safe),
    ("tree", Tier::Danger),
    ("wood", Tier::Danger),
    ("small-vehicle", Tier::Danger),
    ("large-vehicle", Tier::Danger),
    ("buildings", Tier::Danger),
    ("road", Tier::Caution),
    ("vegetation", Tier::Safe),
    ("waterbody", Tier::Danger),
];

/// One row of a taxonomy override.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub class: String,
    pub tier: Tier,
}

/// Ordered class-name to tier table.
#[derive(Clone, Debug)]
pub struct SafetyTaxonomy {
    entries: Vec<(String, Tier)>,
}

impl SafetyTaxonomy {
    /// Build from ordered entries. Keys are lowercased; duplicate keys keep
    /// their first position and tier.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Tier)>,
        S: AsRef<str>,
    {
        let mut out: Vec<(String, Tier)> = Vec::new();
        for (class, tier) in entries {
            let key = class.as_ref().trim().to_lowercase();
            if key.is_empty() {
                return Err(anyhow!("taxonomy entries must have a non-empty class name"));
            }
            if out.iter().any(|(existing, _)| *existing == key) {
                log::warn!("taxonomy: duplicate class '{}' ignored", key);
                continue;
            }
            out.push((key, tier));
        }
        Ok(Self { entries: out })
    }

    pub fn from_overrides(entries: &[TaxonomyEntry]) -> Result<Self> {
        Self::from_entries(entries.iter().map(|e| (e.class.as_str(), e.tier)))
    }

    /// Tier for a class name: exact match, then ordered substring match,
    /// then `Tier::Danger`.
    pub fn classify(&self, class_name: &str) -> Tier {
        let name = class_name.trim().to_lowercase();
        if name.is_empty() {
            return Tier::Danger;
        }

        if let Some((_, tier)) = self.entries.iter().find(|(key, _)| *key == name) {
            return *tier;
        }

        self.entries
            .iter()
            .find(|(key, _)| name.contains(key.as_str()) || key.contains(name.as_str()))
            .map(|(_, tier)| *tier)
            .unwrap_or(Tier::Danger)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, Tier)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), *t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries per tier, in priority order.
    pub fn tier_counts(&self) -> [(Tier, usize); 3] {
        Tier::PRIORITY_ORDER.map(|tier| {
            let count = self.entries.iter().filter(|(_, t)| *t == tier).count();
            (tier, count)
        })
    }
}

impl Default for SafetyTaxonomy {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ENTRIES
                .iter()
                .map(|(k, t)| (k.to_string(), *t))
                .collect(),
        }
    }
}
