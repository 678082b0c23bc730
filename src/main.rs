//! stackforge - headless stacking engine driver
//!
//! Seeds a simulated world with spawners, mobs and dropped items, runs the
//! tick loop with periodic merge sweeps, and dumps a JSON snapshot of the
//! surviving stacks at the end.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stackforge_core::{
    BlockPos, ChunkKey, ItemType, MobType, SpatialKey, StackKind, WorldId, WorldPos,
};
use stackforge_engine::{
    Executor, FileStore, MemoryStore, NativeAdapter, SimAdapter, StackEngine, StackPolicy,
    StackStore, StackingConfig, SweepClock,
};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::{env, process};
use tracing::info;

struct CliOptions {
    config: PathBuf,
    data_dir: Option<PathBuf>,
    ticks: u64,
    seed: u64,
    spawners: usize,
    mobs: usize,
    items: usize,
    snapshot: bool,
}

impl CliOptions {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut options = Self {
            config: PathBuf::from("stackforge.toml"),
            data_dir: None,
            ticks: 400,
            seed: 42,
            spawners: 24,
            mobs: 32,
            items: 16,
            snapshot: false,
        };
        let mut args = args;
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| format!("{flag} requires a value"))
            };
            match arg.as_str() {
                "--config" => options.config = PathBuf::from(value("--config")?),
                "--data-dir" => options.data_dir = Some(PathBuf::from(value("--data-dir")?)),
                "--ticks" => {
                    options.ticks = value("--ticks")?
                        .parse()
                        .map_err(|_| "--ticks expects an integer".to_string())?;
                }
                "--seed" => {
                    options.seed = value("--seed")?
                        .parse()
                        .map_err(|_| "--seed expects an integer".to_string())?;
                }
                "--spawners" => {
                    options.spawners = value("--spawners")?
                        .parse()
                        .map_err(|_| "--spawners expects an integer".to_string())?;
                }
                "--mobs" => {
                    options.mobs = value("--mobs")?
                        .parse()
                        .map_err(|_| "--mobs expects an integer".to_string())?;
                }
                "--items" => {
                    options.items = value("--items")?
                        .parse()
                        .map_err(|_| "--items expects an integer".to_string())?;
                }
                "--snapshot" => options.snapshot = true,
                "--help" | "-h" => {
                    println!(
                        "usage: stackforge [--config PATH] [--data-dir PATH] [--ticks N] \
                         [--seed N] [--spawners N] [--mobs N] [--items N] [--snapshot]"
                    );
                    process::exit(0);
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        Ok(options)
    }
}

const MOBS: [MobType; 4] = [MobType::Pig, MobType::Cow, MobType::Zombie, MobType::Skeleton];
const ITEMS: [ItemType; 4] = [
    ItemType::Stone,
    ItemType::RawPork,
    ItemType::Leather,
    ItemType::Feather,
];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting stackforge v{}", env!("CARGO_PKG_VERSION"));

    let cli = match CliOptions::parse(env::args().skip(1)) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{message}");
            process::exit(2);
        }
    };

    let config = StackingConfig::load(&cli.config)?;
    let policy = StackPolicy::new(Arc::new(RwLock::new(config)));

    let store: Arc<dyn StackStore> = match &cli.data_dir {
        Some(dir) => Arc::new(FileStore::new(dir)?),
        None => Arc::new(MemoryStore::new()),
    };
    let sim = Arc::new(SimAdapter::new());

    // The executor binds the mutation thread to this one.
    let executor = Executor::new();
    let engine = StackEngine::new(policy, sim.clone(), store, executor.handle());

    let restored = engine.load_all()?;
    if restored > 0 {
        info!("restored {restored} stacked object(s) from storage");
    }

    seed_world(&engine, &sim, &cli);
    info!(
        "seeded world: {} spawners, {} mobs, {} items",
        cli.spawners, cli.mobs, cli.items
    );

    let mut clock = SweepClock::new();
    for tick in 0..cli.ticks {
        executor.run_pending();
        if clock.due(tick, engine.policy().sweep_interval()) {
            let merged = engine.run_sweep();
            if merged > 0 {
                info!("tick {tick}: sweep merged {merged} stack(s)");
            }
        }
        sim.run_end_of_cycle();
    }
    executor.run_pending();
    sim.run_end_of_cycle();

    report(&engine, &sim, cli.snapshot)?;

    engine.shutdown();
    info!("shutdown complete");
    Ok(())
}

/// Scatter demo objects over a few chunks around the origin.
fn seed_world(engine: &StackEngine, sim: &Arc<SimAdapter>, cli: &CliOptions) {
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let world = WorldId(0);

    for _ in 0..cli.spawners {
        let pos = BlockPos::new(rng.gen_range(-24..24), 64, rng.gen_range(-24..24));
        let mob = MOBS[rng.gen_range(0..MOBS.len())];
        let key = SpatialKey::Block { world, pos };
        if sim.is_valid(key) {
            continue;
        }
        sim.spawn_live(key, StackKind::Spawner(mob), pos.center());
        let _ = engine.stacked_spawner(world, pos, mob);
    }

    for _ in 0..cli.mobs {
        let pos = WorldPos::new(
            rng.gen_range(-24.0..24.0),
            64.0,
            rng.gen_range(-24.0..24.0),
        );
        let mob = MOBS[rng.gen_range(0..MOBS.len())];
        let id = sim.allocate_entity();
        let key = SpatialKey::Entity { world, id };
        sim.spawn_live(key, StackKind::Mob(mob), pos);
        let _ = engine.stacked_entity(world, id, mob);
    }

    for _ in 0..cli.items {
        let pos = WorldPos::new(
            rng.gen_range(-24.0..24.0),
            64.0,
            rng.gen_range(-24.0..24.0),
        );
        let item = ITEMS[rng.gen_range(0..ITEMS.len())];
        let id = sim.allocate_entity();
        let key = SpatialKey::Entity { world, id };
        sim.spawn_live(key, StackKind::Item(item), pos);
        let _ = engine.stacked_item(world, id, item);
    }
}

fn report(engine: &StackEngine, sim: &Arc<SimAdapter>, snapshot: bool) -> Result<()> {
    info!(
        "final state: {} tracked stacks, {} live objects, {} despawned by merges",
        engine.registry().len(),
        sim.live_count(),
        sim.despawn_count()
    );

    if snapshot {
        let mut chunks: Vec<ChunkKey> = engine
            .registry()
            .all()
            .into_iter()
            .filter_map(|object| engine.current_chunk(object.key()))
            .collect();
        chunks.sort();
        chunks.dedup();
        let snapshots: Vec<_> = chunks
            .into_iter()
            .map(|chunk| engine.stacked_snapshot(chunk))
            .collect();
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
    }
    Ok(())
}
