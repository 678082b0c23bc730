//! Stacking engine: merge/split state machine, spatial registry,
//! persistence queue and host adapter boundary.
//!
//! The [`engine::StackEngine`] facade ties the pieces together; the
//! modules underneath are usable on their own (the registry and the store
//! have no dependency on the engine).

pub mod adapter;
pub mod config;
pub mod engine;
pub mod events;
pub mod exec;
pub mod object;
pub mod persist;
pub mod policy;
pub mod registry;
pub mod scheduler;
pub mod sim;
pub mod store;

pub use adapter::NativeAdapter;
pub use config::StackingConfig;
pub use engine::{SnapshotEntry, StackEngine, StackedSnapshot};
pub use events::{EventBus, EventOutcome, MergeEvent, UnstackEvent};
pub use exec::{ExecHandle, Executor};
pub use object::{LifeState, StackRef, StackedObject};
pub use persist::PersistQueue;
pub use policy::{StackPolicy, UNBOUNDED};
pub use registry::StackRegistry;
pub use scheduler::SweepClock;
pub use sim::SimAdapter;
pub use store::{FileStore, MemoryStore, PersistOp, StackRecord, StackStore};
