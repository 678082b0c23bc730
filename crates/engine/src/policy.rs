//! Stack policy: per-kind configuration lookups.
//!
//! Every answer is derived fresh from the live configuration, so a config
//! reload takes effect on the very next query. Unknown kinds fail open for
//! limits and radii (no accidental object loss) and fail closed for
//! blacklist checks.

use crate::config::StackingConfig;
use stackforge_core::{ObjectClass, StackKind};
use std::sync::{Arc, RwLock};

/// Sentinel meaning "no stack limit".
pub const UNBOUNDED: u32 = u32::MAX;

/// Pure read-side view over the shared stacking configuration.
#[derive(Clone)]
pub struct StackPolicy {
    config: Arc<RwLock<StackingConfig>>,
}

impl StackPolicy {
    /// Wrap a shared configuration.
    pub fn new(config: Arc<RwLock<StackingConfig>>) -> Self {
        Self { config }
    }

    /// Replace the configuration in place (hot reload).
    pub fn replace(&self, new_config: StackingConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = new_config;
    }

    fn read<R>(&self, f: impl FnOnce(&StackingConfig) -> R) -> R {
        f(&self.config.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Stack limit for a kind. Returns [`UNBOUNDED`] when no limit applies;
    /// configured values below 1 also mean unbounded.
    pub fn stack_limit(&self, kind: StackKind) -> u32 {
        self.read(|c| {
            let cc = c.class(kind.class());
            let limit = cc
                .limits
                .get(kind.config_key())
                .copied()
                .unwrap_or(cc.default_limit);
            if limit < 1 {
                UNBOUNDED
            } else {
                limit
            }
        })
    }

    /// Merge radius for a kind; 0 disables radius-based merging.
    pub fn merge_radius(&self, kind: StackKind) -> i32 {
        self.read(|c| {
            let cc = c.class(kind.class());
            let radius = cc
                .merge_radius
                .get(kind.config_key())
                .copied()
                .unwrap_or(cc.default_merge_radius);
            radius.max(0)
        })
    }

    /// Whether merge candidates are drawn from the whole chunk instead of
    /// a radius box.
    pub fn chunk_merge(&self, class: ObjectClass) -> bool {
        self.read(|c| c.class(class).chunk_merge)
    }

    /// Whether the kind is blacklisted.
    pub fn is_blacklisted(&self, kind: StackKind) -> bool {
        self.read(|c| c.class(kind.class()).blacklist.contains(kind.config_key()))
    }

    /// Whether the kind passes the whitelist. An empty whitelist allows all.
    pub fn is_whitelisted(&self, kind: StackKind) -> bool {
        self.read(|c| {
            let wl = &c.class(kind.class()).whitelist;
            wl.is_empty() || wl.contains(kind.config_key())
        })
    }

    /// Whether stacking of this class is disabled in the named world.
    pub fn is_world_disabled(&self, class: ObjectClass, world_name: &str) -> bool {
        self.read(|c| c.class(class).disabled_worlds.contains(world_name))
    }

    /// Global per-class kill switch.
    pub fn stacking_enabled(&self, class: ObjectClass) -> bool {
        self.read(|c| c.class(class).enabled)
    }

    /// Whether a successful merge of this class spawns feedback particles.
    pub fn particles_enabled(&self, class: ObjectClass) -> bool {
        self.read(|c| c.class(class).particles)
    }

    /// Display decoration format for the class; empty disables it.
    pub fn display_format(&self, class: ObjectClass) -> String {
        self.read(|c| c.class(class).display_format.clone())
    }

    /// Ticks between periodic merge sweeps; 0 disables the sweep.
    pub fn sweep_interval(&self) -> u64 {
        self.read(|c| c.sweep_interval_ticks)
    }

    /// Maximum distance a spawner's linked entity may wander.
    pub fn linked_entity_max_distance(&self) -> f64 {
        self.read(|c| c.linked_entity_max_distance)
    }
}
