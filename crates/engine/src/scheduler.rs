//! Merge candidate search and sweep cadence.
//!
//! Candidate search strategy follows policy: chunk-wide merging trades
//! precision for O(chunk-population) cost with no geometry math; radius
//! mode runs a cheap inclusive axis-aligned box prefilter before any
//! distance comparison, because most candidates are rejected by kind and
//! limit checks before geometry ever matters.

use crate::engine::StackEngine;
use crate::object::StackRef;
use stackforge_core::StackCheckResult;

/// Find the geometrically closest merge-compatible neighbor of `object`.
///
/// Ties on exact distance resolve to the first candidate in registry
/// iteration order, which is spatial-key order and therefore stable.
pub fn closest_candidate(engine: &StackEngine, object: &StackRef) -> Option<StackRef> {
    let kind = object.kind();
    let class = kind.class();
    let key = object.key();
    let origin = engine.position_of(key)?;

    let candidates: Vec<StackRef> = if engine.policy().chunk_merge(class) {
        let chunk = engine.current_chunk(key)?;
        engine
            .registry()
            .all_in_chunk(chunk)
            .into_iter()
            .filter(|candidate| candidate.kind().class() == class)
            .collect()
    } else {
        let radius = engine.policy().merge_radius(kind);
        if radius <= 0 {
            return None;
        }
        let origin_block = origin.block();
        engine
            .registry()
            .all_of_class(class)
            .into_iter()
            .filter(|candidate| {
                let Some(pos) = engine.position_of(candidate.key()) else {
                    return false;
                };
                let block = pos.block();
                (block.x - origin_block.x).abs() <= radius
                    && (block.y - origin_block.y).abs() <= radius
                    && (block.z - origin_block.z).abs() <= radius
            })
            .collect()
    };

    let mut best: Option<(StackRef, f64)> = None;
    for candidate in candidates {
        if engine.run_stack_check(object, &candidate) != StackCheckResult::Success {
            continue;
        }
        let Some(pos) = engine.position_of(candidate.key()) else {
            continue;
        };
        let dist = origin.distance_sq(pos);
        // Strict comparison keeps the first candidate on exact ties.
        if best.as_ref().map_or(true, |(_, best_dist)| dist < *best_dist) {
            best = Some((candidate, dist));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Tick-driven cadence for periodic merge sweeps.
#[derive(Debug, Default)]
pub struct SweepClock {
    last_sweep: Option<u64>,
}

impl SweepClock {
    /// Create a clock that has never swept.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a sweep is due at `tick` given the configured interval.
    /// An interval of 0 disables sweeping.
    pub fn due(&mut self, tick: u64, interval: u64) -> bool {
        if interval == 0 {
            return false;
        }
        match self.last_sweep {
            Some(last) if tick < last + interval => false,
            _ => {
                self.last_sweep = Some(tick);
                true
            }
        }
    }
}
