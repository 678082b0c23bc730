#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod aux;
pub mod kind;
pub mod result;
pub mod spatial;

use thiserror::Error;

// Re-export commonly used types
pub use aux::{AuxState, EntityAux, SpawnerAux};
pub use kind::{ItemType, MobType, ObjectClass, SpawnCause, StackKind};
pub use result::{StackCheckResult, StackResult, UnstackResult};
pub use spatial::{BlockPos, ChunkKey, ChunkPos, EntityId, SpatialKey, WorldId, WorldPos};

/// Errors surfaced by the engine, adapter and durable store.
///
/// Policy rejections (not similar, limit exceeded, blacklisted, ...) are
/// *not* errors; they are returned as [`StackCheckResult`] /
/// [`StackResult`] / [`UnstackResult`] variants and callers branch on them.
#[derive(Debug, Error)]
pub enum StackError {
    /// A mutating operation was attempted off the designated mutation thread.
    #[error("operation requires the mutation thread")]
    OffThread,

    /// A persisted record could not be decoded. Degrades the one object to
    /// defaults; never fatal to a load.
    #[error("corrupt persisted record for {key}: {reason}")]
    CorruptRecord {
        /// Spatial key of the offending record.
        key: SpatialKey,
        /// Human-readable decode failure.
        reason: String,
    },

    /// Underlying file I/O failure in the durable store.
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload (de)serialization failure in the durable store.
    #[error("store codec error: {0}")]
    Codec(String),
}
