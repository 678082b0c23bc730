//! Object classes and kind discriminators.
//!
//! A stacked object belongs to one of four classes (entity, item, spawner,
//! barrel) and carries a kind discriminator inside the class: the mob
//! species for entities and spawners, the item material for items and
//! barrels. Policy lookups are keyed by the kind's canonical string.

use serde::{Deserialize, Serialize};

/// The four stackable object classes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ObjectClass {
    /// Living creatures.
    Entity,
    /// Dropped item stacks.
    Item,
    /// Mob spawner blocks.
    Spawner,
    /// Storage barrel blocks.
    Barrel,
}

impl ObjectClass {
    /// Canonical lowercase string key for configs/logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectClass::Entity => "entity",
            ObjectClass::Item => "item",
            ObjectClass::Spawner => "spawner",
            ObjectClass::Barrel => "barrel",
        }
    }
}

/// Mob species that can be stacked or spawned by stacked spawners.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum MobType {
    /// Pig - passive.
    Pig,
    /// Cow - passive.
    Cow,
    /// Sheep - passive.
    Sheep,
    /// Chicken - passive.
    Chicken,
    /// Zombie - hostile.
    Zombie,
    /// Skeleton - hostile.
    Skeleton,
    /// Spider - hostile.
    Spider,
    /// Creeper - hostile.
    Creeper,
}

impl MobType {
    /// Canonical lowercase string key for configs/logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            MobType::Pig => "pig",
            MobType::Cow => "cow",
            MobType::Sheep => "sheep",
            MobType::Chicken => "chicken",
            MobType::Zombie => "zombie",
            MobType::Skeleton => "skeleton",
            MobType::Spider => "spider",
            MobType::Creeper => "creeper",
        }
    }

    /// Parse a mob type from a string key (case-insensitive).
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "pig" => Some(MobType::Pig),
            "cow" => Some(MobType::Cow),
            "sheep" => Some(MobType::Sheep),
            "chicken" => Some(MobType::Chicken),
            "zombie" => Some(MobType::Zombie),
            "skeleton" => Some(MobType::Skeleton),
            "spider" => Some(MobType::Spider),
            "creeper" => Some(MobType::Creeper),
            _ => None,
        }
    }
}

/// Item materials for dropped items and barrel contents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ItemType {
    /// Stone block item.
    Stone,
    /// Dirt block item.
    Dirt,
    /// Sand block item.
    Sand,
    /// Wood log item.
    Wood,
    /// Raw porkchop.
    RawPork,
    /// Raw beef.
    RawBeef,
    /// Leather.
    Leather,
    /// Feather.
    Feather,
}

impl ItemType {
    /// Canonical lowercase string key for configs/logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            ItemType::Stone => "stone",
            ItemType::Dirt => "dirt",
            ItemType::Sand => "sand",
            ItemType::Wood => "wood",
            ItemType::RawPork => "raw_pork",
            ItemType::RawBeef => "raw_beef",
            ItemType::Leather => "leather",
            ItemType::Feather => "feather",
        }
    }

    /// Parse an item type from a string key (case-insensitive).
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "stone" => Some(ItemType::Stone),
            "dirt" => Some(ItemType::Dirt),
            "sand" => Some(ItemType::Sand),
            "wood" => Some(ItemType::Wood),
            "raw_pork" | "rawpork" => Some(ItemType::RawPork),
            "raw_beef" | "rawbeef" => Some(ItemType::RawBeef),
            "leather" => Some(ItemType::Leather),
            "feather" => Some(ItemType::Feather),
            _ => None,
        }
    }
}

/// Class + kind discriminator of a stacked object.
///
/// Two objects are of comparable kind only when both class and inner
/// discriminator match; a pig spawner never merges with a pig mob.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum StackKind {
    /// A living creature of the given species.
    Mob(MobType),
    /// A dropped item stack of the given material.
    Item(ItemType),
    /// A spawner producing the given species.
    Spawner(MobType),
    /// A barrel storing the given material.
    Barrel(ItemType),
}

impl StackKind {
    /// Object class this kind belongs to.
    pub const fn class(self) -> ObjectClass {
        match self {
            StackKind::Mob(_) => ObjectClass::Entity,
            StackKind::Item(_) => ObjectClass::Item,
            StackKind::Spawner(_) => ObjectClass::Spawner,
            StackKind::Barrel(_) => ObjectClass::Barrel,
        }
    }

    /// Canonical string key used for policy lookups (limits, radii,
    /// blacklist/whitelist entries).
    pub const fn config_key(self) -> &'static str {
        match self {
            StackKind::Mob(mob) | StackKind::Spawner(mob) => mob.as_str(),
            StackKind::Item(item) | StackKind::Barrel(item) => item.as_str(),
        }
    }

    /// Whether two kinds are comparable for merging.
    pub fn is_similar(self, other: StackKind) -> bool {
        self == other
    }
}

/// Why a stacked entity entered the world. Persisted so loot and upgrade
/// rules can discriminate on it after a reload.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum SpawnCause {
    /// Natural world spawning.
    #[default]
    Natural,
    /// Produced by a spawner block.
    Spawner,
    /// Produced by breeding.
    Breeding,
    /// Spawned from a spawn egg.
    SpawnerEgg,
    /// Spawned by an operator command.
    Command,
    /// Split off an existing stack by an unstack.
    Unstack,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mob_type_roundtrip() {
        for mob in [
            MobType::Pig,
            MobType::Cow,
            MobType::Sheep,
            MobType::Chicken,
            MobType::Zombie,
            MobType::Skeleton,
            MobType::Spider,
            MobType::Creeper,
        ] {
            assert_eq!(MobType::parse(mob.as_str()), Some(mob));
        }
        assert_eq!(MobType::parse("PIG"), Some(MobType::Pig));
        assert_eq!(MobType::parse("dragon"), None);
    }

    #[test]
    fn kind_similarity_requires_class_and_discriminator() {
        assert!(StackKind::Spawner(MobType::Pig).is_similar(StackKind::Spawner(MobType::Pig)));
        assert!(!StackKind::Spawner(MobType::Pig).is_similar(StackKind::Spawner(MobType::Cow)));
        assert!(!StackKind::Spawner(MobType::Pig).is_similar(StackKind::Mob(MobType::Pig)));
        assert!(!StackKind::Item(ItemType::Stone).is_similar(StackKind::Barrel(ItemType::Stone)));
    }

    #[test]
    fn config_keys_are_stable() {
        assert_eq!(StackKind::Spawner(MobType::Creeper).config_key(), "creeper");
        assert_eq!(StackKind::Barrel(ItemType::RawBeef).config_key(), "raw_beef");
    }
}
