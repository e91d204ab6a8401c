use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Point;

/// Stable handle for every entity in the world.
///
/// Handles are never reused, so a handle held by a brain or a timer after the
/// entity has left the world simply fails to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Generate a new random entity ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Identifier of a spatial partition of the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RegionId(pub u16);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allegiance of an entity. Members of the same faction never aggro each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Faction(pub u8);

/// Whether an entity is controlled by a client or by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A client-controlled character.
    Player,
    /// A server-controlled creature, including pets.
    Npc,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => write!(f, "player"),
            Self::Npc => write!(f, "npc"),
        }
    }
}

/// Lifecycle state of an entity inside its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    /// In the world and visible.
    #[default]
    Active,
    /// Temporarily out of the world (e.g. waiting to respawn).
    Inactive,
    /// Removed for good.
    Deleted,
}

/// Whether a spell hurts its target or helps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellKind {
    /// Cast on enemies.
    Offensive,
    /// Cast on self or friends.
    Defensive,
}

/// A spell an entity knows. Effect formulas live behind the combat rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spell {
    /// Display name.
    pub name: String,
    /// Offensive or defensive.
    pub kind: SpellKind,
    /// Maximum cast distance.
    pub range: u32,
    /// Time from cast start to effect, in milliseconds.
    pub cast_time_ms: u64,
    /// Base strength handed to the combat rules.
    pub power: u32,
}

impl Spell {
    /// Create an offensive spell.
    pub fn offensive(name: impl Into<String>, range: u32, cast_time_ms: u64, power: u32) -> Self {
        Self {
            name: name.into(),
            kind: SpellKind::Offensive,
            range,
            cast_time_ms,
            power,
        }
    }

    /// Create a defensive spell.
    pub fn defensive(name: impl Into<String>, range: u32, cast_time_ms: u64, power: u32) -> Self {
        Self {
            name: name.into(),
            kind: SpellKind::Defensive,
            range,
            cast_time_ms,
            power,
        }
    }
}

/// Movement intent. Pathing is external; the region only interpolates
/// straight lines toward the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    /// Standing still.
    #[default]
    Idle,
    /// Walking to a fixed point.
    WalkTo(Point),
    /// Keeping between `min` and `max` units of another entity.
    Follow {
        /// Entity being followed.
        target: EntityId,
        /// Distance at which the follower stops closing in.
        min: u32,
        /// Distance beyond which the follow is abandoned.
        max: u32,
    },
}

/// A living world object: player, creature or pet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Stable handle.
    pub id: EntityId,
    /// Player or NPC.
    pub kind: EntityKind,
    /// Display name. Not unique: many creatures share a name.
    pub name: String,
    /// Character level.
    pub level: u8,
    /// Allegiance.
    pub faction: Faction,
    /// Region the entity lives in.
    pub region: RegionId,
    /// Current position.
    pub position: Point,
    /// Where the entity spawned; creatures return here when idle.
    pub spawn_point: Point,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Walking speed in units per second.
    pub speed: u32,
    /// Delay between melee swings.
    pub attack_speed_ms: u64,
    /// Reach of a melee swing.
    pub melee_range: u32,
    /// How far a creature wanders from its spawn point while idle.
    pub roam_range: u32,
    /// Lifecycle state.
    pub state: ObjectState,
    /// Hidden from perception.
    pub stealthed: bool,
    /// Under a crowd-control effect (mesmerize, fear).
    pub crowd_controlled: bool,
    /// Controlling player for pets.
    pub owner: Option<EntityId>,
    /// Player group membership.
    pub group: Option<u32>,
    /// Current melee target.
    pub attack_target: Option<EntityId>,
    /// Current movement intent.
    pub movement: Movement,
    /// Name of the spell being cast, if any.
    pub casting: Option<String>,
    /// Known spells.
    pub spells: Vec<Spell>,
    /// Timestamp when the entity was created.
    pub created_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new entity with a random ID.
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::with_id(EntityId::new(), kind, name)
    }

    /// Create an entity with a pre-assigned ID.
    pub fn with_id(id: EntityId, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            level: 1,
            faction: Faction::default(),
            region: RegionId::default(),
            position: Point::default(),
            spawn_point: Point::default(),
            health: 100,
            max_health: 100,
            speed: 200,
            attack_speed_ms: 3000,
            melee_range: 200,
            roam_range: 0,
            state: ObjectState::Active,
            stealthed: false,
            crowd_controlled: false,
            owner: None,
            group: None,
            attack_target: None,
            movement: Movement::Idle,
            casting: None,
            spells: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// A player of the given level.
    pub fn player(name: impl Into<String>, level: u8) -> Self {
        Self::new(EntityKind::Player, name).with_level(level)
    }

    /// A creature of the given level.
    pub fn npc(name: impl Into<String>, level: u8) -> Self {
        Self::new(EntityKind::Npc, name).with_level(level)
    }

    /// Set the level.
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Place the entity; also becomes its spawn point.
    pub fn at(mut self, position: Point) -> Self {
        self.position = position;
        self.spawn_point = position;
        self
    }

    /// Set the faction.
    pub fn with_faction(mut self, faction: Faction) -> Self {
        self.faction = faction;
        self
    }

    /// Set the region.
    pub fn in_region(mut self, region: RegionId) -> Self {
        self.region = region;
        self
    }

    /// Make the entity a pet of `owner`.
    pub fn owned_by(mut self, owner: EntityId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Put the entity in a player group.
    pub fn in_group(mut self, group: u32) -> Self {
        self.group = Some(group);
        self
    }

    /// Set current and maximum health.
    pub fn with_health(mut self, health: u32) -> Self {
        self.health = health;
        self.max_health = health;
        self
    }

    /// Set the melee swing delay.
    pub fn with_attack_speed(mut self, ms: u64) -> Self {
        self.attack_speed_ms = ms.max(1);
        self
    }

    /// Set the walking speed.
    pub fn with_speed(mut self, speed: u32) -> Self {
        self.speed = speed;
        self
    }

    /// Set the idle wander radius.
    pub fn with_roam_range(mut self, range: u32) -> Self {
        self.roam_range = range;
        self
    }

    /// Teach a spell.
    pub fn with_spell(mut self, spell: Spell) -> Self {
        self.spells.push(spell);
        self
    }

    /// Health above zero.
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// In the world, alive, and not removed.
    pub fn is_active(&self) -> bool {
        self.state == ObjectState::Active && self.is_alive()
    }

    /// Controlled by another entity.
    pub fn is_pet(&self) -> bool {
        self.owner.is_some()
    }

    /// Level used for threat and con calculations.
    pub fn effective_level(&self) -> u8 {
        self.level
    }

    /// Apply damage. Returns true if this hit killed the entity.
    pub fn take_damage(&mut self, amount: u32) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.health = self.health.saturating_sub(amount);
        self.health == 0
    }

    /// Restore health up to the maximum. Returns the amount actually healed.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if !self.is_alive() {
            return 0;
        }
        let before = self.health;
        self.health = self.health.saturating_add(amount).min(self.max_health);
        self.health - before
    }

    /// Current health as a percentage of maximum.
    pub fn health_percent(&self) -> u8 {
        if self.max_health == 0 {
            return 0;
        }
        ((u64::from(self.health) * 100) / u64::from(self.max_health)).min(100) as u8
    }

    /// Known spells of the given kind, in learn order.
    pub fn spells_of(&self, kind: SpellKind) -> impl Iterator<Item = &Spell> {
        self.spells.iter().filter(move |s| s.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_display_shows_short_form() {
        let id = EntityId(Uuid::parse_str("a3f2b1c8-1234-5678-9abc-def012345678").unwrap());
        assert_eq!(id.to_string(), "a3f2b1c8");
    }

    #[test]
    fn builder_sets_spawn_point() {
        let e = Entity::npc("Goblin", 12).at(Point::flat(10, 20));
        assert_eq!(e.position, Point::flat(10, 20));
        assert_eq!(e.spawn_point, e.position);
        assert_eq!(e.level, 12);
        assert_eq!(e.kind, EntityKind::Npc);
    }

    #[test]
    fn take_damage_reports_death_once() {
        let mut e = Entity::player("Aldric", 10).with_health(50);
        assert!(!e.take_damage(20));
        assert!(e.take_damage(40));
        assert_eq!(e.health, 0);
        assert!(!e.take_damage(10));
        assert!(!e.is_active());
    }

    #[test]
    fn heal_caps_at_maximum_and_skips_dead() {
        let mut e = Entity::player("Aldric", 10).with_health(50);
        e.take_damage(10);
        assert_eq!(e.heal(25), 10);
        assert_eq!(e.health, 50);
        e.take_damage(50);
        assert_eq!(e.heal(25), 0);
    }

    #[test]
    fn health_percent_clamps_overheal() {
        let mut e = Entity::npc("Boar", 4).with_health(200);
        assert_eq!(e.health_percent(), 100);
        e.health = 50;
        assert_eq!(e.health_percent(), 25);
        e.health = 600;
        assert_eq!(e.health_percent(), 100);
        e.max_health = 0;
        assert_eq!(e.health_percent(), 0);
    }

    #[test]
    fn inactive_entity_is_not_active() {
        let mut e = Entity::npc("Wisp", 3);
        assert!(e.is_active());
        e.state = ObjectState::Inactive;
        assert!(!e.is_active());
    }

    #[test]
    fn spells_of_filters_by_kind() {
        let e = Entity::npc("Shaman", 20)
            .with_spell(Spell::offensive("Bolt", 1500, 2500, 40))
            .with_spell(Spell::defensive("Mend", 1000, 2000, 30));
        let names: Vec<_> = e.spells_of(SpellKind::Offensive).map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Bolt"]);
    }

    #[test]
    fn entity_serializes_to_json() {
        let pet = Entity::npc("Wolf", 15).owned_by(EntityId::new());
        let json = serde_json::to_string(&pet).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, pet.id);
        assert_eq!(back.owner, pet.owner);
        assert_eq!(back.movement, Movement::Idle);
    }
}
