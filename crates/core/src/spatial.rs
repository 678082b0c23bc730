//! Spatial identity: worlds, positions, chunks and the canonical key used
//! to index stacked objects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a simulated world.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WorldId(pub u32);

/// Identifier of a live simulated entity (mob or dropped item).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityId(pub u64);

/// Block coordinate of a block-anchored object (spawner, barrel).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// World X coordinate.
    pub x: i32,
    /// World Y coordinate.
    pub y: i32,
    /// World Z coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Create a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing this block (16x16 columns).
    pub const fn chunk(self) -> ChunkPos {
        ChunkPos::new(self.x >> 4, self.z >> 4)
    }

    /// Center of the block as a floating-point world position.
    pub fn center(self) -> WorldPos {
        WorldPos {
            x: self.x as f64 + 0.5,
            y: self.y as f64 + 0.5,
            z: self.z as f64 + 0.5,
        }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Chunk coordinate (X,Z) in chunk space.
/// Implements Ord for deterministic iteration in BTreeMap/BTreeSet (sorts by x, then z).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkPos {
    /// Chunk X coordinate.
    pub x: i32,
    /// Chunk Z coordinate.
    pub z: i32,
}

impl ChunkPos {
    /// Create a chunk position.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// World-qualified chunk coordinate, used as the registry's bucket key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkKey {
    /// World the chunk belongs to.
    pub world: WorldId,
    /// Chunk position inside that world.
    pub pos: ChunkPos,
}

impl ChunkKey {
    /// Create a world-qualified chunk key.
    pub const fn new(world: WorldId, pos: ChunkPos) -> Self {
        Self { world, pos }
    }
}

/// Floating-point position of a live object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldPos {
    /// World X coordinate.
    pub x: f64,
    /// World Y coordinate.
    pub y: f64,
    /// World Z coordinate.
    pub z: f64,
}

impl WorldPos {
    /// Create a floating-point world position.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared distance to another position. Used for closest-candidate
    /// selection; avoids the sqrt since only ordering matters.
    pub fn distance_sq(self, other: WorldPos) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Containing block position (floor on each axis).
    pub fn block(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

/// Canonical identity of a stackable object.
///
/// Block-anchored objects (spawners, barrels) are keyed by their block
/// position; mobile objects (mobs, dropped items) by their entity id. The
/// key is immutable for the lifetime of the object; a mobile object's
/// *current* position is re-derived from the live object on demand and is
/// never part of equality or hashing.
///
/// Implements Ord so registries iterate deterministically and exact-distance
/// ties in candidate searches resolve to the smallest key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SpatialKey {
    /// Block-anchored key (spawners, barrels).
    Block {
        /// World the block lives in.
        world: WorldId,
        /// Anchoring block position.
        pos: BlockPos,
    },
    /// Mobile-object key (mobs, dropped items).
    Entity {
        /// World the entity lives in.
        world: WorldId,
        /// Live entity id.
        id: EntityId,
    },
}

impl SpatialKey {
    /// World this key belongs to.
    pub const fn world(&self) -> WorldId {
        match self {
            SpatialKey::Block { world, .. } | SpatialKey::Entity { world, .. } => *world,
        }
    }

    /// Chunk bucket for block-anchored keys. Mobile keys have no fixed
    /// chunk; their bucket follows the live position via the adapter.
    pub const fn fixed_chunk(&self) -> Option<ChunkKey> {
        match self {
            SpatialKey::Block { world, pos } => Some(ChunkKey::new(*world, pos.chunk())),
            SpatialKey::Entity { .. } => None,
        }
    }

    /// Anchoring block position for block keys.
    pub const fn block_pos(&self) -> Option<BlockPos> {
        match self {
            SpatialKey::Block { pos, .. } => Some(*pos),
            SpatialKey::Entity { .. } => None,
        }
    }
}

impl fmt::Display for SpatialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialKey::Block { world, pos } => write!(f, "block[w{}:{}]", world.0, pos),
            SpatialKey::Entity { world, id } => write!(f, "entity[w{}:{}]", world.0, id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_chunk_derivation() {
        assert_eq!(BlockPos::new(0, 64, 0).chunk(), ChunkPos::new(0, 0));
        assert_eq!(BlockPos::new(15, 64, 15).chunk(), ChunkPos::new(0, 0));
        assert_eq!(BlockPos::new(16, 64, 16).chunk(), ChunkPos::new(1, 1));
        assert_eq!(BlockPos::new(-1, 64, -1).chunk(), ChunkPos::new(-1, -1));
        assert_eq!(BlockPos::new(-16, 64, -16).chunk(), ChunkPos::new(-1, -1));
        assert_eq!(BlockPos::new(-17, 64, -17).chunk(), ChunkPos::new(-2, -2));
    }

    #[test]
    fn spatial_key_equality_ignores_nothing_but_identity() {
        let w = WorldId(0);
        let a = SpatialKey::Block {
            world: w,
            pos: BlockPos::new(1, 2, 3),
        };
        let b = SpatialKey::Block {
            world: w,
            pos: BlockPos::new(1, 2, 3),
        };
        let c = SpatialKey::Entity {
            world: w,
            id: EntityId(7),
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn spatial_key_ordering_is_total_and_stable() {
        let w = WorldId(0);
        let mut keys = vec![
            SpatialKey::Entity {
                world: w,
                id: EntityId(9),
            },
            SpatialKey::Block {
                world: w,
                pos: BlockPos::new(5, 0, 0),
            },
            SpatialKey::Block {
                world: w,
                pos: BlockPos::new(1, 0, 0),
            },
        ];
        keys.sort();
        let again = {
            let mut k = keys.clone();
            k.sort();
            k
        };
        assert_eq!(keys, again);
    }

    #[test]
    fn world_pos_distance() {
        let a = WorldPos::new(0.0, 0.0, 0.0);
        let b = WorldPos::new(3.0, 4.0, 0.0);
        assert_eq!(a.distance_sq(b), 25.0);
    }
}
