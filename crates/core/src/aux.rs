//! Kind-specific auxiliary state carried by stacked objects and persisted
//! alongside the amount.

use crate::kind::SpawnCause;
use crate::spatial::EntityId;
use serde::{Deserialize, Serialize};

/// Auxiliary fields of a stacked entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAux {
    /// The entity was name-tagged by a player; name-tagged entities keep
    /// their tag through merges.
    pub name_tag: bool,
    /// Applied upgrade tier, 0 when none.
    pub upgrade_id: u8,
    /// How the entity entered the world.
    pub spawn_cause: SpawnCause,
}

/// Auxiliary fields of a stacked spawner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnerAux {
    /// Entity this spawner is linked to for breeding-style mechanics.
    /// Dropped when the entity dies or wanders too far.
    pub linked_entity: Option<EntityId>,
}

/// Per-class auxiliary state. Items and barrels carry none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuxState {
    /// No auxiliary state.
    #[default]
    None,
    /// Entity auxiliary fields.
    Entity(EntityAux),
    /// Spawner auxiliary fields.
    Spawner(SpawnerAux),
}

impl AuxState {
    /// Spawner aux fields, if this is spawner state.
    pub fn as_spawner(&self) -> Option<&SpawnerAux> {
        match self {
            AuxState::Spawner(aux) => Some(aux),
            _ => None,
        }
    }

    /// Entity aux fields, if this is entity state.
    pub fn as_entity(&self) -> Option<&EntityAux> {
        match self {
            AuxState::Entity(aux) => Some(aux),
            _ => None,
        }
    }
}
