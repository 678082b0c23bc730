//! The native adapter boundary.
//!
//! Everything platform- or host-specific sits behind this trait: reading
//! and writing per-object persisted fields on live objects, spawning and
//! despawning, display decorations, particles, end-of-tick deferral.
//! The engine never touches the simulated world directly.

use stackforge_core::{
    AuxState, SpatialKey, SpawnCause, StackError, StackKind, WorldId, WorldPos,
};

/// Deferred side-effect work scheduled to a safe point in the tick.
pub type EndOfCycleTask = Box<dyn FnOnce() + Send + 'static>;

/// Host-side access to live simulated objects.
pub trait NativeAdapter: Send + Sync {
    /// Display name of a world, used for per-world policy checks.
    fn world_name(&self, world: WorldId) -> String;

    /// Current position of the live object, or `None` when it no longer
    /// exists. Mobile objects' positions change every tick; the registry
    /// re-derives them here on demand.
    fn position(&self, key: SpatialKey) -> Option<WorldPos>;

    /// Whether the live object still exists in the world.
    fn is_valid(&self, key: SpatialKey) -> bool {
        self.position(key).is_some()
    }

    /// Read the persisted stack amount off the live object. `Ok(None)`
    /// means no amount was ever persisted (fresh object); an `Err` marks a
    /// malformed record, which the engine degrades to the default amount.
    fn load_amount(&self, key: SpatialKey) -> Result<Option<u32>, StackError>;

    /// Read persisted auxiliary fields off the live object.
    fn load_aux(&self, key: SpatialKey) -> Result<Option<AuxState>, StackError>;

    /// Write auxiliary fields back onto the live object.
    fn save_aux(&self, key: SpatialKey, aux: &AuxState);

    /// Remove the live object from the world. Called for merge donors,
    /// whose count has been folded into the survivor.
    fn despawn(&self, key: SpatialKey);

    /// Spawn a single un-stacked live object, e.g. the instance split off
    /// by an unstack. Returns the new object's key when the host spawned
    /// one.
    fn spawn_unstacked(
        &self,
        kind: StackKind,
        pos: WorldPos,
        cause: SpawnCause,
    ) -> Option<SpatialKey>;

    /// Refresh the stack-count decoration above the object.
    fn update_display(&self, key: SpatialKey, text: &str);

    /// Remove the stack-count decoration.
    fn clear_display(&self, key: SpatialKey);

    /// Spawn merge feedback particles at a position.
    fn spawn_merge_particles(&self, pos: WorldPos);

    /// Defer work to the end of the current simulation cycle.
    fn schedule_end_of_cycle(&self, task: EndOfCycleTask);
}
