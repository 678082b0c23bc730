//! End-to-end stacking scenarios over the simulated world host.

use serde_json::Value;
use stackforge_core::{
    BlockPos, ChunkKey, EntityId, ItemType, MobType, SpatialKey, SpawnCause, StackCheckResult,
    StackKind, StackResult, UnstackResult, WorldId,
};
use stackforge_engine::{
    EventOutcome, Executor, MemoryStore, SimAdapter, StackEngine, StackPolicy, StackRef,
    StackingConfig,
};
use std::sync::{Arc, RwLock};
use std::thread;

struct Harness {
    executor: Executor,
    engine: StackEngine,
    sim: Arc<SimAdapter>,
    store: Arc<MemoryStore>,
}

fn harness(mutate: impl FnOnce(&mut StackingConfig)) -> Harness {
    let mut config = StackingConfig::default();
    mutate(&mut config);
    let policy = StackPolicy::new(Arc::new(RwLock::new(config)));
    let store = Arc::new(MemoryStore::new());
    let sim = Arc::new(SimAdapter::new());
    let executor = Executor::new();
    let engine = StackEngine::new(policy, sim.clone(), store.clone(), executor.handle());
    Harness {
        executor,
        engine,
        sim,
        store,
    }
}

fn spawner_key(x: i32) -> SpatialKey {
    SpatialKey::Block {
        world: WorldId(0),
        pos: BlockPos::new(x, 64, 0),
    }
}

/// Place a live pig spawner and materialize its stacked wrapper.
fn pig_spawner(h: &Harness, x: i32, amount: u32) -> StackRef {
    let pos = BlockPos::new(x, 64, 0);
    let key = SpatialKey::Block {
        world: WorldId(0),
        pos,
    };
    h.sim
        .spawn_live(key, StackKind::Spawner(MobType::Pig), pos.center());
    if amount > 1 {
        h.sim.set_amount_tag(key, Value::from(amount));
    }
    h.engine
        .stacked_spawner(WorldId(0), pos, MobType::Pig)
        .expect("spawner should materialize")
}

/// Place a live mob and materialize its stacked wrapper.
fn live_mob(h: &Harness, x: f64, species: MobType, amount: u32) -> (EntityId, StackRef) {
    let id = h.sim.allocate_entity();
    let key = SpatialKey::Entity {
        world: WorldId(0),
        id,
    };
    h.sim.spawn_live(
        key,
        StackKind::Mob(species),
        stackforge_core::WorldPos::new(x, 64.0, 0.0),
    );
    if amount > 1 {
        h.sim.set_amount_tag(key, Value::from(amount));
    }
    let object = h
        .engine
        .stacked_entity(WorldId(0), id, species)
        .expect("mob should materialize");
    (id, object)
}

#[test]
fn merge_folds_donor_into_closest_target() {
    let h = harness(|_| {});
    let donor = pig_spawner(&h, 0, 3);
    let target = pig_spawner(&h, 2, 4);
    let far = pig_spawner(&h, 3, 1);

    let survivor = h.engine.run_auto_stack(&donor);
    assert_eq!(survivor, Some(target.key()));
    assert_eq!(target.amount(), 7);
    assert_eq!(far.amount(), 1);

    // Donor is gone from the registry and the world.
    assert!(!h.engine.is_stacked(donor.key()));
    assert!(!h.sim.exists(donor.key()));
    assert_eq!(h.sim.despawn_count(), 1);
}

#[test]
fn merge_updates_display_and_particles_at_end_of_cycle() {
    let h = harness(|_| {});
    let donor = pig_spawner(&h, 0, 3);
    let target = pig_spawner(&h, 2, 4);

    assert_eq!(h.engine.run_stack(&donor, &target), StackResult::Success);
    // Visual side effects are deferred within the cycle.
    assert_eq!(h.sim.display_of(target.key()), None);
    h.sim.run_end_of_cycle();

    assert_eq!(h.sim.display_of(target.key()), Some("x7 pig".to_string()));
    assert_eq!(h.sim.display_of(donor.key()), None);
    assert_eq!(h.sim.particle_count(), 1);
}

#[test]
fn limit_gates_automatic_merging_but_not_direct_calls() {
    let h = harness(|c| {
        c.spawners.limits.insert("pig".into(), 10);
    });
    let a = pig_spawner(&h, 0, 6);
    let b = pig_spawner(&h, 2, 6);

    assert_eq!(
        h.engine.run_stack_check(&a, &b),
        StackCheckResult::LimitExceeded
    );
    assert_eq!(h.engine.run_auto_stack(&a), None);
    assert_eq!(a.amount(), 6);
    assert_eq!(b.amount(), 6);

    // An explicit merge may exceed the limit.
    assert_eq!(h.engine.run_stack(&a, &b), StackResult::Success);
    assert_eq!(b.amount(), 12);
}

#[test]
fn blacklisted_kind_never_merges() {
    let h = harness(|c| {
        c.spawners.blacklist.insert("pig".into());
    });
    let a = pig_spawner(&h, 0, 2);
    let b = pig_spawner(&h, 2, 2);

    assert_eq!(
        h.engine.run_stack_check(&a, &b),
        StackCheckResult::Blacklisted
    );
    assert_eq!(h.engine.run_auto_stack(&a), None);
    assert_eq!(h.engine.run_stack(&a, &b), StackResult::NotSimilar);
    assert_eq!(a.amount(), 2);
    assert_eq!(b.amount(), 2);
}

#[test]
fn whitelist_excludes_unlisted_kinds() {
    let h = harness(|c| {
        c.spawners.whitelist.insert("cow".into());
    });
    let a = pig_spawner(&h, 0, 2);
    let b = pig_spawner(&h, 2, 2);
    assert_eq!(
        h.engine.run_stack_check(&a, &b),
        StackCheckResult::Blacklisted
    );
}

#[test]
fn disabled_world_blocks_merging() {
    let h = harness(|c| {
        c.spawners.disabled_worlds.insert("world".into());
    });
    let a = pig_spawner(&h, 0, 2);
    let b = pig_spawner(&h, 2, 2);
    assert_eq!(
        h.engine.run_stack_check(&a, &b),
        StackCheckResult::WorldDisabled
    );
}

#[test]
fn different_kinds_are_not_similar() {
    let h = harness(|_| {});
    let pig = pig_spawner(&h, 0, 2);

    let pos = BlockPos::new(2, 64, 0);
    let key = SpatialKey::Block {
        world: WorldId(0),
        pos,
    };
    h.sim
        .spawn_live(key, StackKind::Spawner(MobType::Cow), pos.center());
    let cow = h
        .engine
        .stacked_spawner(WorldId(0), pos, MobType::Cow)
        .unwrap();

    assert_eq!(
        h.engine.run_stack_check(&pig, &cow),
        StackCheckResult::NotSimilar
    );
    assert_eq!(h.engine.run_auto_stack(&pig), None);
}

#[test]
fn merge_veto_leaves_both_stacks_untouched() {
    let h = harness(|_| {});
    h.engine.events().on_merge(|_| EventOutcome::Veto);
    let donor = pig_spawner(&h, 0, 3);
    let target = pig_spawner(&h, 2, 4);

    assert_eq!(
        h.engine.run_stack(&donor, &target),
        StackResult::EventCancelled
    );
    assert_eq!(donor.amount(), 3);
    assert_eq!(target.amount(), 4);
    assert!(h.engine.is_stacked(donor.key()));
    assert!(h.sim.exists(donor.key()));
}

#[test]
fn unstack_reduces_amount_and_removes_at_zero() {
    let h = harness(|_| {});
    let (id, mob) = live_mob(&h, 0.0, MobType::Zombie, 5);
    let key = SpatialKey::Entity {
        world: WorldId(0),
        id,
    };

    assert_eq!(h.engine.run_unstack(&mob, 2, None), UnstackResult::Success);
    assert_eq!(mob.amount(), 3);
    assert!(h.engine.is_stacked(key));

    assert_eq!(h.engine.run_unstack(&mob, 3, None), UnstackResult::Success);
    assert!(!h.engine.is_stacked(key));
    // The live object stays; it is the single remaining instance.
    assert!(h.sim.exists(key));
    assert_eq!(h.sim.despawn_count(), 0);
}

#[test]
fn unstack_veto_happens_before_any_mutation() {
    let h = harness(|_| {});
    h.engine.events().on_unstack(|_| EventOutcome::Veto);
    let (_, mob) = live_mob(&h, 0.0, MobType::Zombie, 5);

    assert_eq!(
        h.engine.run_unstack(&mob, 2, None),
        UnstackResult::EventCancelled
    );
    assert_eq!(mob.amount(), 5);
}

#[test]
fn off_thread_merge_is_caught_without_mutation() {
    let h = harness(|_| {});
    let donor = pig_spawner(&h, 0, 3);
    let target = pig_spawner(&h, 2, 4);

    let engine = h.engine.clone();
    let (d, t) = (donor.clone(), target.clone());
    let result = thread::spawn(move || engine.run_stack(&d, &t))
        .join()
        .unwrap();

    assert_eq!(result, StackResult::ThreadCatcher);
    assert_eq!(donor.amount(), 3);
    assert_eq!(target.amount(), 4);
}

#[test]
fn off_thread_remove_defers_to_the_mutation_thread() {
    let h = harness(|_| {});
    let spawner = pig_spawner(&h, 0, 3);
    let key = spawner.key();

    let engine = h.engine.clone();
    let object = spawner.clone();
    thread::spawn(move || engine.remove_stack_object(&object))
        .join()
        .unwrap();

    // Nothing happened yet; the removal is queued.
    assert!(h.engine.is_stacked(key));
    h.executor.run_pending();
    assert!(!h.engine.is_stacked(key));
    // Removal drops tracking, not the live object.
    assert!(h.sim.exists(key));
}

#[test]
fn off_thread_unstack_defers_the_mutation() {
    let h = harness(|_| {});
    let (_, mob) = live_mob(&h, 0.0, MobType::Zombie, 5);

    let engine = h.engine.clone();
    let object = mob.clone();
    let result = thread::spawn(move || engine.run_unstack(&object, 2, None))
        .join()
        .unwrap();

    // The verdict comes back immediately; the decrement waits for the
    // mutation thread.
    assert_eq!(result, UnstackResult::Success);
    assert_eq!(mob.amount(), 5);
    h.executor.run_pending();
    assert_eq!(mob.amount(), 3);
}

#[test]
fn off_thread_set_amount_defers_until_the_next_tick() {
    let h = harness(|_| {});
    let spawner = pig_spawner(&h, 0, 3);

    let engine = h.engine.clone();
    let object = spawner.clone();
    thread::spawn(move || engine.set_stack_amount(&object, 9, false))
        .join()
        .unwrap();

    assert_eq!(spawner.amount(), 3);
    h.executor.run_pending();
    assert_eq!(spawner.amount(), 9);

    h.engine.perform_cache_save();
    assert_eq!(h.store.get(spawner.key()).map(|r| r.amount), Some(9));
}

#[test]
fn is_cached_requires_the_class_kill_switch() {
    let h = harness(|_| {});
    let spawner = pig_spawner(&h, 0, 3);
    assert!(h.engine.is_cached(&spawner));

    let mut disabled = StackingConfig::default();
    disabled.spawners.enabled = false;
    h.engine.policy().replace(disabled);

    // Still registered, but the class kill switch hides it.
    assert!(h.engine.is_stacked(spawner.key()));
    assert!(!h.engine.is_cached(&spawner));
}

#[test]
fn unstack_split_spawns_an_untracked_instance() {
    let h = harness(|_| {});
    let (_, mob) = live_mob(&h, 0.0, MobType::Zombie, 5);
    assert_eq!(h.engine.run_unstack(&mob, 1, None), UnstackResult::Success);
    assert_eq!(mob.amount(), 4);

    // The split-off instance enters the world outside the stacking system.
    let split = h
        .engine
        .spawn_without_stacking(
            StackKind::Mob(MobType::Zombie),
            stackforge_core::WorldPos::new(1.0, 64.0, 0.0),
            SpawnCause::Unstack,
        )
        .expect("the simulation spawns mobs");
    assert!(h.sim.exists(split));
    assert!(!h.engine.is_stacked(split));
    assert_eq!(h.engine.registry().len(), 1);
}

#[test]
fn remove_is_idempotent() {
    let h = harness(|_| {});
    let spawner = pig_spawner(&h, 0, 3);
    h.engine.remove_stack_object(&spawner);
    h.engine.remove_stack_object(&spawner);
    assert!(!h.engine.is_stacked(spawner.key()));
    assert_eq!(h.engine.registry().len(), 0);
}

#[test]
fn off_thread_cache_miss_does_not_materialize() {
    let h = harness(|_| {});
    let cached = pig_spawner(&h, 0, 3);

    let pos = BlockPos::new(8, 64, 0);
    let key = SpatialKey::Block {
        world: WorldId(0),
        pos,
    };
    h.sim
        .spawn_live(key, StackKind::Spawner(MobType::Pig), pos.center());

    let engine = h.engine.clone();
    let (hit, miss) = thread::spawn(move || {
        let hit = engine.stacked_spawner(WorldId(0), BlockPos::new(0, 64, 0), MobType::Pig);
        let miss = engine.stacked_spawner(WorldId(0), pos, MobType::Pig);
        (hit, miss)
    })
    .join()
    .unwrap();

    // Cached entries resolve anywhere; misses only materialize on the
    // mutation thread.
    assert!(hit.is_some_and(|object| object.same_object(&cached)));
    assert!(miss.is_none());
    assert!(!h.engine.is_stacked(key));
}

#[test]
fn sweep_collapses_a_chunk_into_one_stack() {
    let h = harness(|c| {
        c.spawners.chunk_merge = true;
    });
    for x in 0..5 {
        pig_spawner(&h, x * 3, 2);
    }
    assert_eq!(h.engine.registry().len(), 5);

    let merged = h.engine.run_sweep();
    assert_eq!(merged, 4);
    assert_eq!(h.engine.registry().len(), 1);
    let survivor = h.engine.registry().all().remove(0);
    assert_eq!(survivor.amount(), 10);
}

#[test]
fn corrupt_amount_tag_defaults_to_one() {
    let h = harness(|_| {});
    let pos = BlockPos::new(0, 64, 0);
    let key = SpatialKey::Block {
        world: WorldId(0),
        pos,
    };
    h.sim
        .spawn_live(key, StackKind::Spawner(MobType::Pig), pos.center());
    h.sim.set_amount_tag(key, Value::String("three".into()));

    let spawner = h
        .engine
        .stacked_spawner(WorldId(0), pos, MobType::Pig)
        .unwrap();
    assert_eq!(spawner.amount(), 1);
}

#[test]
fn cache_save_then_load_restores_the_registry() {
    let h = harness(|_| {});
    let spawner = pig_spawner(&h, 0, 1);
    h.engine.set_stack_amount(&spawner, 9, false);
    h.engine.perform_cache_save();
    assert_eq!(h.store.len(), 1);

    // A fresh engine over the same store sees the record.
    let executor = Executor::new();
    let engine = StackEngine::new(
        StackPolicy::new(Arc::new(RwLock::new(StackingConfig::default()))),
        h.sim.clone(),
        h.store.clone(),
        executor.handle(),
    );
    assert_eq!(engine.load_all().unwrap(), 1);
    let restored = engine.get(spawner.key()).unwrap();
    assert_eq!(restored.amount(), 9);
    assert_eq!(restored.kind(), StackKind::Spawner(MobType::Pig));
}

#[test]
fn cache_clear_flushes_pending_writes_first() {
    let h = harness(|_| {});
    let spawner = pig_spawner(&h, 0, 1);
    h.engine.set_stack_amount(&spawner, 4, false);

    h.engine.perform_cache_clear();
    assert_eq!(h.engine.registry().len(), 0);
    assert_eq!(h.store.get(spawner.key()).map(|r| r.amount), Some(4));
    // Live objects are untouched by a cache clear.
    assert!(h.sim.exists(spawner.key()));
}

#[test]
fn removal_deletes_the_persisted_record() {
    let h = harness(|_| {});
    let spawner = pig_spawner(&h, 0, 1);
    h.engine.set_stack_amount(&spawner, 4, false);
    h.engine.perform_cache_save();
    assert!(h.store.get(spawner.key()).is_some());

    h.engine.remove_stack_object(&spawner);
    h.engine.perform_cache_save();
    assert!(h.store.get(spawner.key()).is_none());
}

#[test]
fn kill_all_despawns_stacked_entities_only() {
    let h = harness(|_| {});
    let (mob_id, _) = live_mob(&h, 0.0, MobType::Zombie, 4);
    live_mob(&h, 5.0, MobType::Skeleton, 2);
    let spawner = pig_spawner(&h, 0, 3);

    h.engine.perform_kill_all();
    assert_eq!(h.engine.registry().len(), 1);
    assert!(h.engine.is_stacked(spawner.key()));
    assert!(!h.sim.exists(SpatialKey::Entity {
        world: WorldId(0),
        id: mob_id,
    }));
    assert_eq!(h.sim.despawn_count(), 2);
}

#[test]
fn linked_entity_drops_when_it_wanders_off() {
    let h = harness(|_| {});
    let spawner = pig_spawner(&h, 0, 1);
    let (mob_id, _) = live_mob(&h, 2.0, MobType::Pig, 1);
    let mob_key = SpatialKey::Entity {
        world: WorldId(0),
        id: mob_id,
    };

    h.engine.set_linked_entity(&spawner, Some(mob_id));
    assert_eq!(h.engine.linked_entity(&spawner), Some(mob_id));

    // Default max distance is 10; move the mob well past it.
    h.sim
        .set_position(mob_key, stackforge_core::WorldPos::new(50.0, 64.0, 0.0));
    assert_eq!(h.engine.linked_entity(&spawner), None);
    // The stale link is cleared, not just hidden.
    assert_eq!(h.engine.linked_entity(&spawner), None);
}

#[test]
fn update_linked_entity_rebinds_spawners() {
    let h = harness(|_| {});
    let spawner = pig_spawner(&h, 0, 1);
    let (old_id, _) = live_mob(&h, 2.0, MobType::Pig, 1);
    let (new_id, _) = live_mob(&h, 3.0, MobType::Pig, 1);

    h.engine.set_linked_entity(&spawner, Some(old_id));
    h.engine.update_linked_entity(old_id, new_id);
    assert_eq!(h.engine.linked_entity(&spawner), Some(new_id));
}

#[test]
fn nearby_spawners_includes_full_but_compatible_stacks() {
    let h = harness(|c| {
        c.spawners.limits.insert("pig".into(), 10);
    });
    let origin = pig_spawner(&h, 0, 6);
    let full = pig_spawner(&h, 2, 6);
    let small = pig_spawner(&h, 3, 1);

    let pos = BlockPos::new(1, 64, 0);
    let key = SpatialKey::Block {
        world: WorldId(0),
        pos,
    };
    h.sim
        .spawn_live(key, StackKind::Spawner(MobType::Cow), pos.center());
    h.engine
        .stacked_spawner(WorldId(0), pos, MobType::Cow)
        .unwrap();

    let nearby = h.engine.nearby_spawners(&origin);
    let keys: Vec<SpatialKey> = nearby.iter().map(StackRef::key).collect();
    assert!(keys.contains(&full.key()));
    assert!(keys.contains(&small.key()));
    assert!(!keys.contains(&key));
}

#[test]
fn snapshot_serializes_chunk_contents() {
    let h = harness(|_| {});
    pig_spawner(&h, 0, 3);
    pig_spawner(&h, 2, 4);

    let chunk = ChunkKey::new(WorldId(0), BlockPos::new(0, 64, 0).chunk());
    let snapshot = h.engine.stacked_snapshot(chunk);
    assert_eq!(snapshot.entries.len(), 2);

    let json = serde_json::to_value(&snapshot).unwrap();
    let amounts: Vec<u64> = json["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["amount"].as_u64().unwrap())
        .collect();
    assert_eq!(amounts, vec![3, 4]);
}

#[test]
fn items_merge_within_radius() {
    let h = harness(|_| {});
    let make_item = |x: f64, amount: u32| {
        let id = h.sim.allocate_entity();
        let key = SpatialKey::Entity {
            world: WorldId(0),
            id,
        };
        h.sim.spawn_live(
            key,
            StackKind::Item(ItemType::Stone),
            stackforge_core::WorldPos::new(x, 64.0, 0.0),
        );
        if amount > 1 {
            h.sim.set_amount_tag(key, Value::from(amount));
        }
        h.engine
            .stacked_item(WorldId(0), id, ItemType::Stone)
            .unwrap()
    };
    let a = make_item(0.0, 30);
    let b = make_item(3.0, 34);

    assert!(h.engine.run_auto_stack(&a).is_some());
    assert_eq!(b.amount(), 64);
    assert!(!h.engine.is_stacked(a.key()));
}

#[test]
fn materialization_schedules_a_deferred_auto_stack() {
    let h = harness(|_| {});
    let a = pig_spawner(&h, 0, 3);
    let b = pig_spawner(&h, 2, 4);
    assert_eq!(h.engine.registry().len(), 2);

    // The queued first-observation merge attempts run on the next tick.
    h.executor.drain();
    assert_eq!(h.engine.registry().len(), 1);
    let total = a.amount().max(b.amount());
    assert_eq!(total, 7);
}
