//! Scripted scenarios: a region's bodies, their brains, and timed orders.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vigil_ai::{
    AggressionState, AiRegion, AiResult, AmbientBehaviour, AmbientTrigger, Brain, CasterBrain, ControlledBrain,
    CrowdControl, FollowBrain, PetCommand, StandardBrain,
};
use vigil_core::{Entity, EntityId, EntityKind, Faction, Point, RegionId, Spell, World, WorldMeta};

/// A region to load and what happens in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    #[serde(default = "default_region")]
    pub region: u16,
    pub bodies: Vec<BodySpec>,
    #[serde(default)]
    pub ambient: Vec<AmbientBehaviour>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

fn default_region() -> u16 {
    1
}

/// One body to spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BodySpec {
    pub name: String,
    #[serde(default)]
    pub player: bool,
    pub level: u8,
    #[serde(default)]
    pub faction: u8,
    #[serde(default)]
    pub at: [i32; 2],
    #[serde(default)]
    pub health: Option<u32>,
    /// Name of the owning body.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<u32>,
    #[serde(default)]
    pub roam_range: u32,
    #[serde(default)]
    pub spells: Vec<Spell>,
    #[serde(default)]
    pub brain: Option<BrainSpec>,
}

/// Brain attached at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BrainSpec {
    Standard {
        aggro_range: u32,
        aggro_level: u8,
        #[serde(default)]
        leash: Option<u32>,
    },
    Pet {
        #[serde(default)]
        aggression: AggressionState,
    },
    Follow,
    Caster {
        #[serde(default)]
        aggression: AggressionState,
    },
}

/// Something done to a body at a fixed time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Virtual time in milliseconds.
    pub at: u64,
    pub body: String,
    #[serde(flatten)]
    pub action: OrderAction,
}

/// What an order does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "order", rename_all = "kebab-case")]
pub enum OrderAction {
    Attack { target: String },
    Follow { target: String },
    Stay,
    ComeHere,
    Goto { to: [i32; 2] },
    Aggression { state: AggressionState },
    Fear { source: String, duration_ms: u64 },
    Mesmerize { duration_ms: u64 },
    Release,
    Damage { source: String, amount: u32 },
}

/// A built world plus the handles a scenario needs to drive it.
#[derive(Debug)]
pub struct Staged {
    pub world: World,
    pub names: Names,
    pub brains: Vec<(EntityId, BrainSpec)>,
}

/// Case-insensitive body name lookup.
#[derive(Debug, Default)]
pub struct Names(HashMap<String, EntityId>);

impl Names {
    pub fn resolve(&self, name: &str) -> Result<EntityId, String> {
        self.0
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| format!("no body named '{name}'"))
    }
}

impl Scenario {
    /// Read a scenario from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let json = std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        serde_json::from_str(&json).map_err(|e| format!("invalid scenario {}: {e}", path.display()))
    }

    /// Two players with their pets raiding a goblin camp. The brute gets
    /// feared midway.
    pub fn demo() -> Self {
        let body = |name: &str, level: u8, faction: u8, at: [i32; 2]| BodySpec {
            name: name.into(),
            player: false,
            level,
            faction,
            at,
            health: None,
            owner: None,
            group: None,
            roam_range: 0,
            spells: Vec::new(),
            brain: None,
        };
        let goblin = |name: &str, at: [i32; 2]| BodySpec {
            roam_range: 200,
            brain: Some(BrainSpec::Standard {
                aggro_range: 450,
                aggro_level: 100,
                leash: Some(2500),
            }),
            ..body(name, 12, 3, at)
        };
        Self {
            name: "Thornwatch".into(),
            region: 1,
            bodies: vec![
                BodySpec {
                    player: true,
                    health: Some(400),
                    ..body("Aldric", 14, 0, [0, 0])
                },
                BodySpec {
                    owner: Some("Aldric".into()),
                    health: Some(250),
                    brain: Some(BrainSpec::Pet {
                        aggression: AggressionState::Defensive,
                    }),
                    ..body("Brindle", 12, 0, [60, 0])
                },
                BodySpec {
                    player: true,
                    ..body("Wren", 13, 0, [-80, 40])
                },
                BodySpec {
                    owner: Some("Wren".into()),
                    spells: vec![Spell::offensive("Thorn Lash", 600, 1500, 12)],
                    brain: Some(BrainSpec::Caster {
                        aggression: AggressionState::Defensive,
                    }),
                    ..body("Moss Sprite", 11, 0, [-120, 40])
                },
                goblin("Goblin Cutter", [900, 0]),
                goblin("Goblin Sneak", [950, 120]),
                BodySpec {
                    health: Some(300),
                    ..goblin("Goblin Brute", [1000, -80])
                },
            ],
            ambient: vec![
                AmbientBehaviour::new("Goblin Cutter", AmbientTrigger::Aggroing, "Fresh meat, {targetname}!")
                    .with_voice("yell"),
                AmbientBehaviour::new("Goblin Brute", AmbientTrigger::Dying, "{sourcename} falls with a groan."),
            ],
            orders: vec![
                Order {
                    at: 3_000,
                    body: "Brindle".into(),
                    action: OrderAction::Goto { to: [800, 0] },
                },
                Order {
                    at: 6_000,
                    body: "Brindle".into(),
                    action: OrderAction::Attack {
                        target: "Goblin Cutter".into(),
                    },
                },
                Order {
                    at: 6_000,
                    body: "Moss Sprite".into(),
                    action: OrderAction::Attack {
                        target: "Goblin Cutter".into(),
                    },
                },
                Order {
                    at: 9_000,
                    body: "Goblin Brute".into(),
                    action: OrderAction::Fear {
                        source: "Wren".into(),
                        duration_ms: 4_000,
                    },
                },
                Order {
                    at: 14_000,
                    body: "Brindle".into(),
                    action: OrderAction::ComeHere,
                },
            ],
        }
    }

    /// Build the world. Owners are resolved by name, so a pet may be listed
    /// before its owner.
    pub fn stage(&self) -> Result<Staged, String> {
        let mut names = Names::default();
        let mut entities = Vec::with_capacity(self.bodies.len());
        for spec in &self.bodies {
            let kind = if spec.player { EntityKind::Player } else { EntityKind::Npc };
            let mut entity = Entity::new(kind, spec.name.clone())
                .with_level(spec.level)
                .with_faction(Faction(spec.faction))
                .with_roam_range(spec.roam_range)
                .at(Point::flat(spec.at[0], spec.at[1]));
            if let Some(health) = spec.health {
                entity = entity.with_health(health);
            }
            if let Some(group) = spec.group {
                entity = entity.in_group(group);
            }
            for spell in &spec.spells {
                entity = entity.with_spell(spell.clone());
            }
            if names.0.insert(spec.name.to_lowercase(), entity.id).is_some() {
                return Err(format!("duplicate body name '{}'", spec.name));
            }
            entities.push(entity);
        }

        let mut brains = Vec::new();
        for (spec, entity) in self.bodies.iter().zip(&mut entities) {
            if let Some(owner) = &spec.owner {
                let owner = names.resolve(owner)?;
                if owner == entity.id {
                    return Err(format!("'{}' cannot own itself", spec.name));
                }
                entity.owner = Some(owner);
            }
            if let Some(brain) = spec.brain {
                let needs_owner = !matches!(brain, BrainSpec::Standard { .. });
                if needs_owner && entity.owner.is_none() {
                    return Err(format!("'{}' has a pet brain but no owner", spec.name));
                }
                brains.push((entity.id, brain));
            }
        }

        let mut world = World::new(WorldMeta::new(self.name.clone(), RegionId(self.region)));
        for entity in entities {
            world.spawn(entity).map_err(|e| e.to_string())?;
        }
        Ok(Staged { world, names, brains })
    }
}

impl BrainSpec {
    /// The brain for `body`, whose owner is already set in `world`.
    pub fn build(self, world: &World, body: EntityId) -> Result<Box<dyn Brain>, String> {
        let owner = || {
            world
                .get_entity(body)
                .and_then(|e| e.owner)
                .ok_or_else(|| format!("'{}' has no owner", world.entity_name(body)))
        };
        Ok(match self {
            Self::Standard {
                aggro_range,
                aggro_level,
                leash,
            } => {
                let brain = StandardBrain::new(aggro_range, aggro_level);
                match leash {
                    Some(distance) => Box::new(brain.with_leash(distance)),
                    None => Box::new(brain),
                }
            }
            Self::Pet { aggression } => Box::new(ControlledBrain::new(owner()?).with_aggression(aggression)),
            Self::Follow => Box::new(FollowBrain::new(owner()?)),
            Self::Caster { aggression } => Box::new(CasterBrain::new(owner()?).with_aggression(aggression)),
        })
    }
}

/// An order with every name resolved.
#[derive(Debug, Clone, Copy)]
enum Step {
    Command(PetCommand),
    CrowdControl(CrowdControl, u64),
    Release,
    Damage { source: EntityId, amount: u32 },
}

impl Order {
    /// Carry out the order on `region`.
    pub fn apply(&self, region: &mut AiRegion, names: &Names) -> Result<(), String> {
        let body = names.resolve(&self.body)?;
        let step = match &self.action {
            OrderAction::Attack { target } => Step::Command(PetCommand::Attack(names.resolve(target)?)),
            OrderAction::Follow { target } => Step::Command(PetCommand::Follow(names.resolve(target)?)),
            OrderAction::Stay => Step::Command(PetCommand::Stay),
            OrderAction::ComeHere => Step::Command(PetCommand::ComeHere),
            OrderAction::Goto { to } => Step::Command(PetCommand::Goto(Point::flat(to[0], to[1]))),
            OrderAction::Aggression { state } => Step::Command(PetCommand::SetAggression(*state)),
            OrderAction::Fear { source, duration_ms } => Step::CrowdControl(
                CrowdControl::Fear {
                    source: names.resolve(source)?,
                },
                *duration_ms,
            ),
            OrderAction::Mesmerize { duration_ms } => Step::CrowdControl(CrowdControl::Mesmerize, *duration_ms),
            OrderAction::Release => Step::Release,
            OrderAction::Damage { source, amount } => Step::Damage {
                source: names.resolve(source)?,
                amount: *amount,
            },
        };

        region
            .with_scheduler(|state, timers| -> AiResult<()> {
                match step {
                    Step::Command(command) => state.command_pet(timers, body, command),
                    Step::CrowdControl(effect, duration) => state.apply_crowd_control(timers, body, effect, duration),
                    Step::Release => state.release_pet(timers, body),
                    Step::Damage { source, amount } => {
                        state.deal_damage(timers, source, body, amount);
                        Ok(())
                    }
                }
            })
            .map_err(|e| format!("order at {} ms for '{}': {e}", self.at, self.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_stages() {
        let staged = Scenario::demo().stage().unwrap();
        assert_eq!(staged.world.entity_count(), 7);
        assert_eq!(staged.brains.len(), 5);
        let dog = staged.names.resolve("brindle").unwrap();
        let owner = staged.names.resolve("ALDRIC").unwrap();
        assert_eq!(staged.world.get_entity(dog).unwrap().owner, Some(owner));
    }

    #[test]
    fn pet_brain_needs_owner() {
        let json = r#"{
            "name": "Pen",
            "bodies": [{ "name": "Stray", "level": 3, "brain": { "kind": "pet" } }]
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        let err = scenario.stage().unwrap_err();
        assert!(err.contains("no owner"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let json = r#"{
            "name": "Pen",
            "bodies": [
                { "name": "Rat", "level": 1 },
                { "name": "rat", "level": 2 }
            ]
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert!(scenario.stage().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn orders_parse_flat() {
        let json = r#"{ "at": 500, "body": "Brindle", "order": "goto", "to": [10, 20] }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.at, 500);
        assert!(matches!(order.action, OrderAction::Goto { to: [10, 20] }));
    }
}
