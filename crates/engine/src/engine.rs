//! The stacking engine facade.
//!
//! Owns the spatial registry, policy, event bus and persistence queue, and
//! implements the merge/split/remove state machine. The engine is an
//! explicitly constructed, explicitly shut down service injected into its
//! collaborators; it is cheap to clone and safe to share across threads,
//! but every mutating operation carries the thread-affinity contract of
//! the single mutation thread.

use crate::adapter::NativeAdapter;
use crate::events::{EventBus, EventOutcome, MergeEvent, UnstackEvent};
use crate::exec::ExecHandle;
use crate::object::{LifeState, StackRef, StackedObject};
use crate::persist::PersistQueue;
use crate::policy::{StackPolicy, UNBOUNDED};
use crate::registry::StackRegistry;
use crate::scheduler;
use crate::store::{PersistOp, StackRecord, StackStore};
use serde::Serialize;
use stackforge_core::{
    AuxState, BlockPos, ChunkKey, EntityAux, EntityId, ItemType, MobType, ObjectClass,
    SpatialKey, SpawnCause, SpawnerAux, StackCheckResult, StackError, StackKind, StackResult,
    UnstackResult, WorldId, WorldPos,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct EngineInner {
    registry: StackRegistry,
    policy: StackPolicy,
    events: EventBus,
    persist: PersistQueue,
    store: Arc<dyn StackStore>,
    adapter: Arc<dyn NativeAdapter>,
    exec: ExecHandle,
}

/// Shared handle to the stacking engine.
#[derive(Clone)]
pub struct StackEngine {
    inner: Arc<EngineInner>,
}

impl StackEngine {
    /// Build an engine over the given collaborators. Must be called on the
    /// thread that owns the [`Executor`](crate::exec::Executor) behind
    /// `exec`, i.e. the simulation thread.
    pub fn new(
        policy: StackPolicy,
        adapter: Arc<dyn NativeAdapter>,
        store: Arc<dyn StackStore>,
        exec: ExecHandle,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry: StackRegistry::new(),
                policy,
                events: EventBus::new(),
                persist: PersistQueue::new(store.clone()),
                store,
                adapter,
                exec,
            }),
        }
    }

    /// The stack policy view.
    pub fn policy(&self) -> &StackPolicy {
        &self.inner.policy
    }

    /// The spatial registry.
    pub fn registry(&self) -> &StackRegistry {
        &self.inner.registry
    }

    /// The cancellable-event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Handle to the mutation executor.
    pub fn exec(&self) -> &ExecHandle {
        &self.inner.exec
    }

    // ---- Position and chunk resolution -------------------------------

    /// Current position of the object behind a key. Mobile objects are
    /// asked through the adapter; block-anchored objects fall back to
    /// their anchoring block center when the adapter no longer knows them.
    pub fn position_of(&self, key: SpatialKey) -> Option<WorldPos> {
        self.inner
            .adapter
            .position(key)
            .or_else(|| key.block_pos().map(BlockPos::center))
    }

    /// Chunk the object currently occupies. Fixed for block keys, derived
    /// from the live position for mobile keys.
    pub fn current_chunk(&self, key: SpatialKey) -> Option<ChunkKey> {
        key.fixed_chunk().or_else(|| {
            self.inner
                .adapter
                .position(key)
                .map(|pos| ChunkKey::new(key.world(), pos.block().chunk()))
        })
    }

    /// Re-bucket a mobile object after it crossed a chunk border.
    pub fn notify_moved(&self, key: SpatialKey) {
        if let Some(chunk) = self.current_chunk(key) {
            self.inner.registry.reindex(key, chunk);
        }
    }

    // ---- Accessors (lazy materialization) ----------------------------

    /// Cached entry for a key, if any. Safe from any thread.
    pub fn get(&self, key: SpatialKey) -> Option<StackRef> {
        self.inner.registry.get(key)
    }

    /// Whether the key has a cached wrapper.
    pub fn is_stacked(&self, key: SpatialKey) -> bool {
        self.inner.registry.contains(key)
    }

    /// Whether the object's class has stacking enabled AND the object is
    /// actually tracked: distinguishes "exists but stacking turned off"
    /// from "tracked".
    pub fn is_cached(&self, object: &StackRef) -> bool {
        let (key, class) = {
            let guard = object.lock();
            (guard.key(), guard.class())
        };
        self.inner.policy.stacking_enabled(class) && self.inner.registry.contains(key)
    }

    /// Stacked wrapper of a living entity.
    pub fn stacked_entity(&self, world: WorldId, id: EntityId, mob: MobType) -> Option<StackRef> {
        self.get_or_materialize(SpatialKey::Entity { world, id }, StackKind::Mob(mob))
    }

    /// Stacked wrapper of a dropped item.
    pub fn stacked_item(&self, world: WorldId, id: EntityId, item: ItemType) -> Option<StackRef> {
        self.get_or_materialize(SpatialKey::Entity { world, id }, StackKind::Item(item))
    }

    /// Stacked wrapper of a spawner block.
    pub fn stacked_spawner(
        &self,
        world: WorldId,
        pos: BlockPos,
        mob: MobType,
    ) -> Option<StackRef> {
        self.get_or_materialize(SpatialKey::Block { world, pos }, StackKind::Spawner(mob))
    }

    /// Stacked wrapper of a barrel block.
    pub fn stacked_barrel(
        &self,
        world: WorldId,
        pos: BlockPos,
        item: ItemType,
    ) -> Option<StackRef> {
        self.get_or_materialize(SpatialKey::Block { world, pos }, StackKind::Barrel(item))
    }

    fn get_or_materialize(&self, key: SpatialKey, kind: StackKind) -> Option<StackRef> {
        if let Some(existing) = self.inner.registry.get(key) {
            return Some(existing);
        }
        if !self.inner.exec.is_primary() {
            warn!("cache miss for {key} off the mutation thread; not materializing");
            return None;
        }
        if !self.inner.adapter.is_valid(key) {
            return None;
        }

        let amount = match self.inner.adapter.load_amount(key) {
            Ok(Some(amount)) => amount.max(1),
            Ok(None) => 1,
            Err(err) => {
                warn!("{err}; defaulting amount to 1");
                1
            }
        };
        let aux = match self.inner.adapter.load_aux(key) {
            Ok(Some(aux)) => aux,
            Ok(None) => default_aux(kind),
            Err(err) => {
                warn!("{err}; using default auxiliary state");
                default_aux(kind)
            }
        };
        let chunk = self.current_chunk(key)?;

        let object = StackRef::new(StackedObject::new(key, kind, amount, aux));
        self.inner.registry.insert(object.clone(), chunk);
        debug!("materialized {key} as {kind:?} x{amount}");
        if amount > 1 {
            self.refresh_display(key, kind, amount);
        }

        // Opportunistic merge attempt on first observation, deferred so the
        // caller's tick step finishes first.
        let engine = self.clone();
        let fresh = object.clone();
        self.inner.exec.post(Box::new(move || {
            engine.run_auto_stack(&fresh);
        }));

        Some(object)
    }

    // ---- State machine -----------------------------------------------

    /// Pure merge-compatibility check. No mutation, callable anywhere.
    pub fn run_stack_check(&self, a: &StackRef, b: &StackRef) -> StackCheckResult {
        let (a_key, a_kind, a_amount, a_state) = {
            let guard = a.lock();
            (guard.key(), guard.kind(), guard.amount(), guard.state())
        };
        let (b_key, b_kind, b_amount, b_state) = {
            let guard = b.lock();
            (guard.key(), guard.kind(), guard.amount(), guard.state())
        };

        let policy = &self.inner.policy;
        let class = a_kind.class();
        if !policy.stacking_enabled(class) {
            return StackCheckResult::NotEnabled;
        }
        if a_key == b_key || a.same_object(b) {
            return StackCheckResult::NotSimilar;
        }
        if a_state == LifeState::Removed || b_state == LifeState::Removed {
            return StackCheckResult::NotSimilar;
        }
        for key in [a_key, b_key] {
            let world_name = self.inner.adapter.world_name(key.world());
            if policy.is_world_disabled(class, &world_name) {
                return StackCheckResult::WorldDisabled;
            }
        }
        if a_key.world() != b_key.world() {
            return StackCheckResult::DifferentWorld;
        }
        if policy.is_blacklisted(a_kind) || policy.is_blacklisted(b_kind) {
            return StackCheckResult::Blacklisted;
        }
        if !policy.is_whitelisted(a_kind) || !policy.is_whitelisted(b_kind) {
            return StackCheckResult::Blacklisted;
        }
        if !a_kind.is_similar(b_kind) {
            return StackCheckResult::NotSimilar;
        }
        let limit = policy.stack_limit(a_kind);
        if limit != UNBOUNDED && a_amount.saturating_add(b_amount) > limit {
            return StackCheckResult::LimitExceeded;
        }
        StackCheckResult::Success
    }

    /// Merge `donor` into `target`. The donor's count is folded into the
    /// target and the donor leaves the registry and the world.
    ///
    /// The limit only gates automatic candidate search; a direct call may
    /// grow the target beyond it.
    pub fn run_stack(&self, donor: &StackRef, target: &StackRef) -> StackResult {
        if !self.inner.exec.is_primary() {
            warn!("merge attempted off the mutation thread");
            return StackResult::ThreadCatcher;
        }
        match self.run_stack_check(donor, target) {
            StackCheckResult::Success | StackCheckResult::LimitExceeded => {}
            _ => return StackResult::NotSimilar,
        }

        let (donor_key, kind, donor_amount) = {
            let guard = donor.lock();
            (guard.key(), guard.kind(), guard.amount())
        };
        let (target_key, target_amount) = {
            let guard = target.lock();
            (guard.key(), guard.amount())
        };
        let new_amount = target_amount.saturating_add(donor_amount);

        let event = MergeEvent {
            donor: donor_key,
            target: target_key,
            kind,
            donor_amount,
            target_amount,
            new_amount,
        };
        if self.inner.events.fire_merge(&event) == EventOutcome::Veto {
            return StackResult::EventCancelled;
        }

        debug!("merging {donor_key} into {target_key}: {donor_amount}+{target_amount}");
        self.set_stack_amount(target, new_amount, true);

        let donor_pos = self.position_of(donor_key);
        self.remove_internal(donor, true);

        if self.inner.policy.particles_enabled(kind.class()) {
            if let Some(pos) = donor_pos {
                let adapter = self.inner.adapter.clone();
                self.inner.adapter.schedule_end_of_cycle(Box::new(move || {
                    adapter.spawn_merge_particles(pos);
                }));
            }
        }

        StackResult::Success
    }

    /// Automatic merge: find the closest compatible neighbor and fold this
    /// object into it. Returns the survivor's key on success.
    pub fn run_auto_stack(&self, object: &StackRef) -> Option<SpatialKey> {
        let (key, kind) = {
            let guard = object.lock();
            (guard.key(), guard.kind())
        };
        if self.inner.policy.stack_limit(kind) <= 1 {
            return None;
        }
        if !self.inner.registry.contains(key) {
            return None;
        }
        let target = scheduler::closest_candidate(self, object)?;
        match self.run_stack(object, &target) {
            StackResult::Success => Some(target.key()),
            _ => None,
        }
    }

    /// Split `amount` off the object. The veto check runs synchronously on
    /// the calling thread, strictly before any mutation; the mutation
    /// itself is reposted when called off the mutation thread.
    pub fn run_unstack(
        &self,
        object: &StackRef,
        amount: u32,
        actor: Option<EntityId>,
    ) -> UnstackResult {
        let (key, kind) = {
            let guard = object.lock();
            (guard.key(), guard.kind())
        };
        let event = UnstackEvent {
            key,
            kind,
            amount,
            actor,
        };
        if self.inner.events.fire_unstack(&event) == EventOutcome::Veto {
            return UnstackResult::EventCancelled;
        }

        if self.inner.exec.is_primary() {
            self.apply_unstack(object, amount);
        } else {
            let engine = self.clone();
            let object = object.clone();
            self.inner.exec.post(Box::new(move || {
                engine.apply_unstack(&object, amount);
            }));
        }
        UnstackResult::Success
    }

    fn apply_unstack(&self, object: &StackRef, amount: u32) {
        let remaining = object.lock().amount().saturating_sub(amount);
        // Any result below 1 removes the object. Items and entities keep
        // their live object in the world as the single un-stacked
        // instance; spawners and barrels just vanish from the cache.
        self.set_stack_amount(object, remaining, true);
    }

    /// Set the stack amount, enqueue the durable write and refresh the
    /// display. Off the mutation thread this reposts itself and returns
    /// immediately. Amounts below 1 remove the object.
    pub fn set_stack_amount(&self, object: &StackRef, amount: u32, update_display: bool) {
        if !self.inner.exec.is_primary() {
            let engine = self.clone();
            let object = object.clone();
            self.inner.exec.post(Box::new(move || {
                engine.set_stack_amount(&object, amount, update_display);
            }));
            return;
        }

        let (key, kind) = {
            let mut guard = object.lock();
            if guard.state() == LifeState::Removed {
                return;
            }
            guard.set_amount(amount);
            (guard.key(), guard.kind())
        };
        if amount < 1 {
            self.remove_internal(object, false);
            return;
        }
        self.enqueue_upsert(object);
        if update_display {
            self.refresh_display(key, kind, amount);
        }
    }

    /// Remove the object from cache, durable storage and decorations.
    /// Idempotent; off the mutation thread it reposts itself
    /// fire-and-forget. The live object stays in the world.
    pub fn remove_stack_object(&self, object: &StackRef) {
        if !self.inner.exec.is_primary() {
            let engine = self.clone();
            let object = object.clone();
            self.inner.exec.post(Box::new(move || {
                engine.remove_stack_object(&object);
            }));
            return;
        }
        self.remove_internal(object, false);
    }

    fn remove_internal(&self, object: &StackRef, despawn_live: bool) {
        let key = {
            let mut guard = object.lock();
            if guard.state() == LifeState::Removed {
                return;
            }
            guard.mark_removed();
            guard.key()
        };
        self.inner.registry.remove(key);
        self.inner.persist.enqueue(key, PersistOp::Delete);
        self.inner.adapter.clear_display(key);
        if despawn_live {
            self.inner.adapter.despawn(key);
        }
        debug!("removed stacked object {key}");
    }

    fn enqueue_upsert(&self, object: &StackRef) {
        let record = {
            let guard = object.lock();
            let key = guard.key();
            let chunk = self
                .inner
                .registry
                .chunk_of(key)
                .or_else(|| self.current_chunk(key));
            let Some(chunk) = chunk else {
                warn!("no chunk for {key}; skipping persistence");
                return;
            };
            StackRecord {
                key,
                chunk,
                kind: guard.kind(),
                amount: guard.amount(),
                aux: *guard.aux(),
            }
        };
        object.lock().clear_dirty();
        self.inner
            .persist
            .enqueue(record.key, PersistOp::Upsert(record));
    }

    fn refresh_display(&self, key: SpatialKey, kind: StackKind, amount: u32) {
        let format = self.inner.policy.display_format(kind.class());
        if format.is_empty() {
            return;
        }
        let adapter = self.inner.adapter.clone();
        let engine = self.clone();
        // Display work is visual side effect; defer it to a safe point in
        // the tick rather than mutating decorations mid-step. The object
        // may have merged away by then, so re-check before decorating.
        self.inner.adapter.schedule_end_of_cycle(Box::new(move || {
            if amount <= 1 || !engine.is_stacked(key) {
                adapter.clear_display(key);
            } else {
                let text = format
                    .replace("{amount}", &amount.to_string())
                    .replace("{kind}", kind.config_key());
                adapter.update_display(key, &text);
            }
        }));
    }

    // ---- Bulk operations and queries ---------------------------------

    /// Attempt an automatic merge for every cached object. Returns how
    /// many merges happened. Mutation thread only.
    pub fn run_sweep(&self) -> usize {
        if !self.inner.exec.is_primary() {
            warn!("merge sweep attempted off the mutation thread");
            return 0;
        }
        let mut merged = 0;
        for object in self.inner.registry.all() {
            if !self.inner.registry.contains(object.key()) {
                // Folded into a survivor earlier in this sweep.
                continue;
            }
            if self.run_auto_stack(&object).is_some() {
                merged += 1;
            }
        }
        if merged > 0 {
            debug!("sweep merged {merged} object(s)");
        }
        merged
    }

    /// All stacked spawners, optionally restricted to one chunk.
    pub fn stacked_spawners(&self, chunk: Option<ChunkKey>) -> Vec<StackRef> {
        match chunk {
            Some(chunk) => self
                .inner
                .registry
                .all_in_chunk(chunk)
                .into_iter()
                .filter(|object| object.kind().class() == ObjectClass::Spawner)
                .collect(),
            None => self.inner.registry.all_of_class(ObjectClass::Spawner),
        }
    }

    /// Neighboring spawners that are compatible with this one or
    /// compatible-but-full (limit exceeded), for UI and diagnostics.
    pub fn nearby_spawners(&self, spawner: &StackRef) -> Vec<StackRef> {
        let kind = spawner.kind();
        let radius = self.inner.policy.merge_radius(kind).max(0);
        let Some(origin) = self.position_of(spawner.key()) else {
            return Vec::new();
        };
        let origin_block = origin.block();

        let candidates = if self.inner.policy.chunk_merge(ObjectClass::Spawner) {
            match self.current_chunk(spawner.key()) {
                Some(chunk) => self.stacked_spawners(Some(chunk)),
                None => Vec::new(),
            }
        } else {
            self.stacked_spawners(None)
                .into_iter()
                .filter(|candidate| {
                    let Some(pos) = candidate.key().block_pos() else {
                        return false;
                    };
                    (pos.x - origin_block.x).abs() <= radius
                        && (pos.y - origin_block.y).abs() <= radius
                        && (pos.z - origin_block.z).abs() <= radius
                })
                .collect()
        };

        candidates
            .into_iter()
            .filter(|candidate| {
                matches!(
                    self.run_stack_check(spawner, candidate),
                    StackCheckResult::Success | StackCheckResult::LimitExceeded
                )
            })
            .collect()
    }

    /// Entity a spawner is linked to, dropping stale links (dead entity or
    /// wandered beyond the configured distance).
    pub fn linked_entity(&self, spawner: &StackRef) -> Option<EntityId> {
        let (key, link) = {
            let guard = spawner.lock();
            (
                guard.key(),
                guard.aux().as_spawner().and_then(|aux| aux.linked_entity),
            )
        };
        let link = link?;
        let entity_key = SpatialKey::Entity {
            world: key.world(),
            id: link,
        };
        let max = self.inner.policy.linked_entity_max_distance();
        let still_linked = match (self.position_of(key), self.inner.adapter.position(entity_key))
        {
            (Some(a), Some(b)) => a.distance_sq(b) <= max * max,
            _ => false,
        };
        if !still_linked {
            if let AuxState::Spawner(aux) = spawner.lock().aux_mut() {
                aux.linked_entity = None;
            }
            return None;
        }
        Some(link)
    }

    /// Link a spawner to an entity (or clear the link).
    pub fn set_linked_entity(&self, spawner: &StackRef, entity: Option<EntityId>) {
        let key = {
            let mut guard = spawner.lock();
            if let AuxState::Spawner(aux) = guard.aux_mut() {
                aux.linked_entity = entity;
            }
            guard.key()
        };
        self.inner.adapter.save_aux(key, spawner.lock().aux());
    }

    /// Rebind every spawner linked to `old` onto `new`, e.g. after the
    /// host replaced the live entity.
    pub fn update_linked_entity(&self, old: EntityId, new: EntityId) {
        for spawner in self.inner.registry.all_of_class(ObjectClass::Spawner) {
            let linked = spawner
                .lock()
                .aux()
                .as_spawner()
                .and_then(|aux| aux.linked_entity);
            if linked == Some(old) {
                self.set_linked_entity(&spawner, Some(new));
            }
        }
    }

    /// Remove every stacked entity and despawn its live object.
    pub fn perform_kill_all(&self) {
        if !self.inner.exec.is_primary() {
            let engine = self.clone();
            self.inner.exec.post(Box::new(move || {
                engine.perform_kill_all();
            }));
            return;
        }
        let entities = self.inner.registry.all_of_class(ObjectClass::Entity);
        info!("kill-all removing {} stacked entit(ies)", entities.len());
        for entity in entities {
            self.remove_internal(&entity, true);
        }
    }

    /// Flush every entry from memory without durable deletion. Used on
    /// world/session shutdown. Mutation thread only (sequenced after any
    /// in-flight merges by construction); pending writes are flushed first
    /// so nothing queued is lost.
    pub fn perform_cache_clear(&self) {
        if !self.inner.exec.is_primary() {
            let engine = self.clone();
            self.inner.exec.post(Box::new(move || {
                engine.perform_cache_clear();
            }));
            return;
        }
        self.inner.persist.flush();
        let drained = self.inner.registry.clear();
        info!("cache clear dropped {} entr(ies)", drained.len());
        for object in drained {
            let key = {
                let mut guard = object.lock();
                guard.mark_removed();
                guard.key()
            };
            self.inner.adapter.clear_display(key);
        }
    }

    /// Push every dirty entry to the persistence queue and drain it,
    /// keeping all entries in memory.
    pub fn perform_cache_save(&self) {
        let mut saved = 0;
        for object in self.inner.registry.all() {
            if object.lock().is_dirty() {
                self.enqueue_upsert(&object);
                saved += 1;
            }
        }
        self.inner.persist.flush();
        debug!("cache save wrote {saved} dirty entr(ies)");
    }

    /// Spawn a live object that bypasses stacking entirely.
    pub fn spawn_without_stacking(
        &self,
        kind: StackKind,
        pos: WorldPos,
        cause: SpawnCause,
    ) -> Option<SpatialKey> {
        self.inner.adapter.spawn_unstacked(kind, pos, cause)
    }

    /// Point-in-time view of one chunk's stacked objects.
    pub fn stacked_snapshot(&self, chunk: ChunkKey) -> StackedSnapshot {
        let entries = self
            .inner
            .registry
            .all_in_chunk(chunk)
            .into_iter()
            .map(|object| {
                let guard = object.lock();
                SnapshotEntry {
                    key: guard.key(),
                    kind: guard.kind(),
                    amount: guard.amount(),
                }
            })
            .collect();
        StackedSnapshot { chunk, entries }
    }

    // ---- Load from durable storage -----------------------------------

    /// Populate the registry from one chunk's saved records. Returns how
    /// many entries were installed.
    pub fn load_chunk(&self, chunk: ChunkKey) -> Result<usize, StackError> {
        let records = self.inner.store.load_chunk(chunk)?;
        self.install_records(records)
    }

    /// Populate the registry from the whole store.
    pub fn load_all(&self) -> Result<usize, StackError> {
        let records = self.inner.store.load_all()?;
        self.install_records(records)
    }

    fn install_records(&self, records: Vec<StackRecord>) -> Result<usize, StackError> {
        if !self.inner.exec.is_primary() {
            return Err(StackError::OffThread);
        }
        let mut installed = 0;
        for record in records {
            if self.inner.registry.contains(record.key) {
                continue;
            }
            if record.amount < 1 {
                warn!(
                    "record for {} has amount {}; defaulting to 1",
                    record.key, record.amount
                );
            }
            let amount = record.amount.max(1);
            let object = StackRef::new(StackedObject::new(
                record.key,
                record.kind,
                amount,
                record.aux,
            ));
            self.inner.registry.insert(object, record.chunk);
            if amount > 1 {
                self.refresh_display(record.key, record.kind, amount);
            }
            installed += 1;
        }
        Ok(installed)
    }

    /// Flush outstanding writes and stop the persistence worker.
    pub fn shutdown(&self) {
        self.perform_cache_save();
        self.inner.persist.shutdown();
    }
}

fn default_aux(kind: StackKind) -> AuxState {
    match kind.class() {
        ObjectClass::Entity => AuxState::Entity(EntityAux::default()),
        ObjectClass::Spawner => AuxState::Spawner(SpawnerAux::default()),
        ObjectClass::Item | ObjectClass::Barrel => AuxState::None,
    }
}

/// One row of a chunk snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    /// Canonical identity.
    pub key: SpatialKey,
    /// Kind discriminator.
    pub kind: StackKind,
    /// Stack amount at snapshot time.
    pub amount: u32,
}

/// Point-in-time, JSON-exportable view of a chunk's stacked objects.
#[derive(Debug, Clone, Serialize)]
pub struct StackedSnapshot {
    /// Chunk the snapshot covers.
    pub chunk: ChunkKey,
    /// Snapshot rows in key order.
    pub entries: Vec<SnapshotEntry>,
}
