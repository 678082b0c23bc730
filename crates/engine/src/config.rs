//! Stacking configuration loaded from TOML.
//!
//! One [`ClassConfig`] per object class plus a handful of global knobs.
//! Every section is `#[serde(default)]` so a partial file only overrides
//! what it names; a missing file falls back to defaults with a warning.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stackforge_core::ObjectClass;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Per-class stacking settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassConfig {
    /// Global kill switch for stacking this class.
    pub enabled: bool,
    /// Stack limit applied to kinds without an explicit entry.
    /// 0 means unbounded.
    pub default_limit: u32,
    /// Per-kind stack limits, keyed by the kind's canonical string.
    pub limits: HashMap<String, u32>,
    /// Merge radius applied to kinds without an explicit entry.
    /// 0 disables radius-based merging for those kinds.
    pub default_merge_radius: i32,
    /// Per-kind merge radii.
    pub merge_radius: HashMap<String, i32>,
    /// Draw merge candidates from the whole chunk instead of a radius box.
    pub chunk_merge: bool,
    /// Kinds that never stack. Blacklist wins over whitelist.
    pub blacklist: BTreeSet<String>,
    /// When non-empty, only these kinds stack.
    pub whitelist: BTreeSet<String>,
    /// Worlds (by name) where stacking this class is disabled.
    pub disabled_worlds: BTreeSet<String>,
    /// Spawn merge particles at the donor's position on a successful merge.
    pub particles: bool,
    /// Display decoration format; `{amount}` and `{kind}` are substituted.
    /// Empty string disables the decoration.
    pub display_format: String,
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_limit: 0,
            limits: HashMap::new(),
            default_merge_radius: 8,
            merge_radius: HashMap::new(),
            chunk_merge: false,
            blacklist: BTreeSet::new(),
            whitelist: BTreeSet::new(),
            disabled_worlds: BTreeSet::new(),
            particles: true,
            display_format: "x{amount} {kind}".to_string(),
        }
    }
}

/// Root stacking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StackingConfig {
    /// Ticks between periodic merge sweeps. 0 disables the sweep.
    pub sweep_interval_ticks: u64,
    /// Maximum distance a spawner's linked entity may wander before the
    /// link is dropped.
    pub linked_entity_max_distance: f64,
    /// Entity stacking settings.
    pub entities: ClassConfig,
    /// Item stacking settings.
    pub items: ClassConfig,
    /// Spawner stacking settings.
    pub spawners: ClassConfig,
    /// Barrel stacking settings.
    pub barrels: ClassConfig,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ticks: 100,
            linked_entity_max_distance: 10.0,
            entities: ClassConfig::default(),
            items: ClassConfig::default(),
            spawners: ClassConfig {
                // Spawners merge block-to-block; a tighter default radius
                // matches placements next to each other.
                default_merge_radius: 4,
                ..ClassConfig::default()
            },
            barrels: ClassConfig {
                default_merge_radius: 4,
                ..ClassConfig::default()
            },
        }
    }
}

impl StackingConfig {
    /// Settings for the given object class.
    pub fn class(&self, class: ObjectClass) -> &ClassConfig {
        match class {
            ObjectClass::Entity => &self.entities,
            ObjectClass::Item => &self.items,
            ObjectClass::Spawner => &self.spawners,
            ObjectClass::Barrel => &self.barrels,
        }
    }

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file is missing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config {}", path.display()))
    }
}
