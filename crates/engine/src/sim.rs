//! In-memory simulation adapter.
//!
//! A minimal stand-in for a real game host, used by the demo driver and
//! the test suite. Live objects are rows in a map; persisted fields are a
//! JSON tag bag per object, which lets tests prime malformed values to
//! exercise the corrupt-record path.

use crate::adapter::{EndOfCycleTask, NativeAdapter};
use serde_json::Value;
use stackforge_core::{
    AuxState, EntityId, SpatialKey, SpawnCause, StackError, StackKind, WorldId, WorldPos,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct LiveObject {
    kind: StackKind,
    pos: WorldPos,
}

#[derive(Default)]
struct SimState {
    worlds: HashMap<WorldId, String>,
    live: HashMap<SpatialKey, LiveObject>,
    amount_tags: HashMap<SpatialKey, Value>,
    aux_tags: HashMap<SpatialKey, AuxState>,
    displays: HashMap<SpatialKey, String>,
    end_of_cycle: Vec<EndOfCycleTask>,
}

/// In-memory world host implementing [`NativeAdapter`].
#[derive(Default)]
pub struct SimAdapter {
    state: Mutex<SimState>,
    next_entity: AtomicU64,
    despawned: AtomicUsize,
    particles: AtomicUsize,
}

impl SimAdapter {
    /// Create an empty simulation with one default world.
    pub fn new() -> Self {
        let sim = Self::default();
        sim.add_world(WorldId(0), "world");
        sim
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a world under a name.
    pub fn add_world(&self, world: WorldId, name: &str) {
        self.state().worlds.insert(world, name.to_string());
    }

    /// Place a live object in the world.
    pub fn spawn_live(&self, key: SpatialKey, kind: StackKind, pos: WorldPos) {
        self.state().live.insert(key, LiveObject { kind, pos });
    }

    /// Allocate a fresh entity id.
    pub fn allocate_entity(&self) -> EntityId {
        EntityId(self.next_entity.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Move a live object.
    pub fn set_position(&self, key: SpatialKey, pos: WorldPos) {
        if let Some(live) = self.state().live.get_mut(&key) {
            live.pos = pos;
        }
    }

    /// Prime the persisted amount tag, e.g. with garbage for corruption
    /// tests.
    pub fn set_amount_tag(&self, key: SpatialKey, value: Value) {
        self.state().amount_tags.insert(key, value);
    }

    /// Prime persisted auxiliary fields.
    pub fn set_aux_tag(&self, key: SpatialKey, aux: AuxState) {
        self.state().aux_tags.insert(key, aux);
    }

    /// Whether a live object exists.
    pub fn exists(&self, key: SpatialKey) -> bool {
        self.state().live.contains_key(&key)
    }

    /// Current display decoration text, if any.
    pub fn display_of(&self, key: SpatialKey) -> Option<String> {
        self.state().displays.get(&key).cloned()
    }

    /// How many live objects were despawned (merge donors folded in).
    pub fn despawn_count(&self) -> usize {
        self.despawned.load(Ordering::SeqCst)
    }

    /// How many merge particle bursts were spawned.
    pub fn particle_count(&self) -> usize {
        self.particles.load(Ordering::SeqCst)
    }

    /// Number of live objects in the world.
    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    /// Run every task deferred to the end of the cycle. Called by the
    /// driver once per tick, after the mutation executor drained.
    pub fn run_end_of_cycle(&self) -> usize {
        let tasks: Vec<EndOfCycleTask> = std::mem::take(&mut self.state().end_of_cycle);
        let ran = tasks.len();
        for task in tasks {
            task();
        }
        ran
    }
}

impl NativeAdapter for SimAdapter {
    fn world_name(&self, world: WorldId) -> String {
        self.state()
            .worlds
            .get(&world)
            .cloned()
            .unwrap_or_else(|| format!("world-{}", world.0))
    }

    fn position(&self, key: SpatialKey) -> Option<WorldPos> {
        self.state().live.get(&key).map(|live| live.pos)
    }

    fn load_amount(&self, key: SpatialKey) -> Result<Option<u32>, StackError> {
        match self.state().amount_tags.get(&key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match value.as_u64() {
                Some(amount) => Ok(Some(amount.min(u32::MAX as u64) as u32)),
                None => Err(StackError::CorruptRecord {
                    key,
                    reason: format!("amount tag is not an integer: {value}"),
                }),
            },
        }
    }

    fn load_aux(&self, key: SpatialKey) -> Result<Option<AuxState>, StackError> {
        Ok(self.state().aux_tags.get(&key).copied())
    }

    fn save_aux(&self, key: SpatialKey, aux: &AuxState) {
        self.state().aux_tags.insert(key, *aux);
    }

    fn despawn(&self, key: SpatialKey) {
        let mut state = self.state();
        if state.live.remove(&key).is_some() {
            self.despawned.fetch_add(1, Ordering::SeqCst);
        }
        state.amount_tags.remove(&key);
        state.aux_tags.remove(&key);
    }

    fn spawn_unstacked(
        &self,
        kind: StackKind,
        pos: WorldPos,
        _cause: SpawnCause,
    ) -> Option<SpatialKey> {
        let key = match kind {
            StackKind::Mob(_) | StackKind::Item(_) => SpatialKey::Entity {
                world: WorldId(0),
                id: self.allocate_entity(),
            },
            // Block-anchored kinds are not spawned by the simulation.
            StackKind::Spawner(_) | StackKind::Barrel(_) => return None,
        };
        self.spawn_live(key, kind, pos);
        Some(key)
    }

    fn update_display(&self, key: SpatialKey, text: &str) {
        self.state().displays.insert(key, text.to_string());
    }

    fn clear_display(&self, key: SpatialKey) {
        self.state().displays.remove(&key);
    }

    fn spawn_merge_particles(&self, _pos: WorldPos) {
        self.particles.fetch_add(1, Ordering::SeqCst);
    }

    fn schedule_end_of_cycle(&self, task: EndOfCycleTask) {
        self.state().end_of_cycle.push(task);
    }
}
