//! Brains: the decision loops attached to creatures and pets.
//!
//! A body owns at most one brain at a time through the
//! [`BrainRegistry`](crate::registry::BrainRegistry). The registry ticks it
//! with a repeating scheduled action at the brain's own interval and hands it
//! push notifications in between.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_core::{Entity, EntityId, EntityKind, Point, SpellKind};

use crate::aggro::AggroTable;
use crate::ambient::AmbientTrigger;
use crate::combat::CastOutcome;
use crate::config::AiConfig;
use crate::context::BrainContext;
use crate::error::AiResult;
use crate::event::RegionEventKind;
use crate::notify::Notification;

/// Caster pet variant.
pub mod caster;
/// Owner-commanded pet variant.
pub mod controlled;
/// Fear and mesmerize substitute.
pub mod crowd;
/// Passive follow-only pet variant.
pub mod follow;
/// Independent hostile creature.
pub mod standard;

pub use caster::CasterBrain;
pub use controlled::ControlledBrain;
pub use crowd::{CrowdControl, CrowdControlBrain};
pub use follow::FollowBrain;
pub use standard::StandardBrain;

/// Which brain variant is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrainKind {
    /// Independent hostile creature.
    Standard,
    /// Pet taking owner commands.
    ControlledPet,
    /// Pet that only follows its owner.
    FollowOnly,
    /// Pet preferring spells.
    CasterPet,
    /// Temporary fear or mesmerize.
    CrowdControl,
}

impl fmt::Display for BrainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standard => "standard",
            Self::ControlledPet => "pet",
            Self::FollowOnly => "follow",
            Self::CasterPet => "caster",
            Self::CrowdControl => "crowd-control",
        };
        f.write_str(name)
    }
}

/// How readily a brain fights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggressionState {
    /// Attacks anything hostile it notices.
    Aggressive,
    /// Fights back, and defends its owner.
    #[default]
    Defensive,
    /// Never fights.
    Passive,
}

impl fmt::Display for AggressionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggressive => f.write_str("aggressive"),
            Self::Defensive => f.write_str("defensive"),
            Self::Passive => f.write_str("passive"),
        }
    }
}

/// Movement policy of a pet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalkState {
    /// Keep between the follow distances of the owner.
    #[default]
    Follow,
    /// Hold position.
    Stay,
    /// Walk to the owner once.
    ComeHere,
    /// Walk to a given point.
    GoTo,
}

impl fmt::Display for WalkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Follow => f.write_str("follow"),
            Self::Stay => f.write_str("stay"),
            Self::ComeHere => f.write_str("come-here"),
            Self::GoTo => f.write_str("goto"),
        }
    }
}

/// An order from a pet's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetCommand {
    /// Attack this target.
    Attack(EntityId),
    /// Follow this entity.
    Follow(EntityId),
    /// Hold the current position.
    Stay,
    /// Walk to the owner.
    ComeHere,
    /// Walk to a point.
    Goto(Point),
    /// Change the aggression state.
    SetAggression(AggressionState),
}

/// Order surface of pet brains, used by player command handlers.
pub trait PetCommands {
    /// The controlling entity.
    fn owner(&self) -> EntityId;

    /// Carry out `command`.
    fn command(&mut self, ctx: &mut BrainContext<'_>, command: PetCommand) -> AiResult<()>;
}

/// How a brain turns a chosen target into action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttackPolicy {
    /// Always melee.
    #[default]
    Melee,
    /// Cast an offensive spell with this percent chance, otherwise melee.
    Mixed(u8),
    /// Cast whenever out of melee reach and a spell reaches; melee otherwise.
    SpellsPreferred,
}

/// The decision loop of a body.
///
/// `think` runs every [`think_interval`](Brain::think_interval) while the
/// brain is attached; `notify` runs whenever something happens to the body.
/// Both get a [`BrainContext`] with the region state and a scheduler.
pub trait Brain: fmt::Debug + Send {
    /// Variant tag.
    fn kind(&self) -> BrainKind;

    /// Delay between think ticks.
    fn think_interval(&self, config: &AiConfig) -> u64;

    /// One think tick.
    fn think(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()>;

    /// React to a push event.
    fn notify(&mut self, _ctx: &mut BrainContext<'_>, _note: &Notification) -> AiResult<()> {
        Ok(())
    }

    /// Current aggression.
    fn aggression_state(&self) -> AggressionState;

    /// Current movement policy; `None` for brains that do not take orders.
    fn walk_state(&self) -> Option<WalkState> {
        None
    }

    /// Threat table, if the brain keeps one.
    fn aggro(&self) -> Option<&AggroTable>;

    /// Mutable threat table, if the brain keeps one.
    fn aggro_mut(&mut self) -> Option<&mut AggroTable>;

    /// Called right before the first think is scheduled.
    fn on_attach(&mut self, _ctx: &mut BrainContext<'_>) -> AiResult<()> {
        Ok(())
    }

    /// Called right after the last think was cancelled.
    fn on_detach(&mut self, _ctx: &mut BrainContext<'_>) {}

    /// Order surface, for brains that take owner commands.
    fn as_pet(&mut self) -> Option<&mut dyn PetCommands> {
        None
    }

    /// The brain this one temporarily replaces, handed back when it ends.
    fn into_prior(self: Box<Self>) -> Option<Box<dyn Brain>> {
        None
    }

    /// Support downcasting to concrete types.
    fn as_any(&self) -> &dyn Any;

    /// Support downcasting to concrete types.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ---------------------------------------------------------------------------
// Shared behaviour
// ---------------------------------------------------------------------------

/// Threat a perceived target starts with.
pub fn perception_threat(target: &Entity) -> i64 {
    match target.kind {
        EntityKind::Player => i64::from(target.effective_level()) * 2,
        EntityKind::Npc => (i64::from(target.level) + 1) * 2,
    }
}

/// Add threat for `target`, pulling in its group and announcing the first
/// entry. Ignored while the body is dead.
pub fn add_threat(ctx: &mut BrainContext<'_>, table: &mut AggroTable, target: EntityId, amount: i64) {
    if !ctx.is_alive() || target == ctx.body {
        return;
    }
    let was_empty = table.is_empty();

    let group = ctx
        .entity(target)
        .filter(|t| t.kind == EntityKind::Player && amount > 0)
        .and_then(|t| t.group);
    if let Some(group) = group {
        for member in ctx.state.world.group_members(group) {
            if member != target && !table.contains(member) {
                table.add(member, 1);
                announce(ctx, member, 1);
            }
        }
    }

    if table.add(target, amount) {
        let threat = table.threat(target).unwrap_or(0);
        announce(ctx, target, threat);
    }

    if was_empty && !table.is_empty() {
        ctx.fire_ambient(AmbientTrigger::Aggroing, Some(target));
    }
}

fn announce(ctx: &mut BrainContext<'_>, target: EntityId, threat: u64) {
    let description = format!(
        "{} notices {} (threat {threat})",
        ctx.state.name_of(ctx.body),
        ctx.state.name_of(target)
    );
    ctx.emit(
        RegionEventKind::AggroGained {
            body: ctx.body,
            target,
            threat,
        },
        description,
    );
}

/// Who a perception scan should consider and at what odds.
#[derive(Debug, Clone, Copy)]
pub struct Perception {
    /// Scan radius around the body.
    pub range: u32,
    /// Percent odds of aggroing on an eligible target.
    pub aggro_level: u8,
    /// Controlling owner, for pets: never a target, and the reference for
    /// grey checks.
    pub owner: Option<EntityId>,
}

/// Odds of aggroing on `target`: zero for friends and grey targets,
/// otherwise the aggro level capped at 100.
pub fn aggro_chance(
    ctx: &BrainContext<'_>,
    me: &Entity,
    grey_reference: &Entity,
    target: &Entity,
    aggro_level: u8,
) -> u8 {
    let rules = &ctx.state.context().rules;
    if !rules.is_hostile(me, target) || rules.is_grey(grey_reference, target) {
        return 0;
    }
    aggro_level.min(100)
}

/// Scan for new targets and add them to `table`.
pub fn perceive(ctx: &mut BrainContext<'_>, table: &mut AggroTable, perception: Perception) {
    if perception.aggro_level == 0 || perception.range == 0 {
        return;
    }
    let candidates: Vec<(EntityId, i64, u8)> = {
        let view: &BrainContext<'_> = ctx;
        let Some(me) = view.me() else { return };
        if !me.is_alive() {
            return;
        }
        let reference = perception
            .owner
            .and_then(|owner| view.entity(owner))
            .unwrap_or(me);
        view.state
            .world
            .living_in_radius(me.position, perception.range, None)
            .into_iter()
            .filter_map(|id| view.entity(id))
            .filter(|t| {
                t.id != me.id
                    && Some(t.id) != perception.owner
                    && t.owner != Some(me.id)
                    && !t.stealthed
                    && !table.contains(t.id)
            })
            .filter_map(|t| {
                let chance = aggro_chance(view, me, reference, t, perception.aggro_level);
                (chance > 0).then(|| (t.id, perception_threat(t), chance))
            })
            .collect()
    };

    for (target, threat, chance) in candidates {
        if ctx.roll(chance) {
            add_threat(ctx, table, target, threat);
        }
    }
}

/// Drop entries whose target died, left the region, or wandered beyond the
/// table's reach.
pub fn prune_aggro(ctx: &BrainContext<'_>, table: &mut AggroTable) {
    let Some(me) = ctx.me() else { return };
    let reach = ctx.state.config().max_aggro_list_distance;
    table.prune(|target| {
        ctx.entity(target).is_some_and(|t| {
            t.is_alive() && ctx.state.world.is_present(target) && me.position.is_within(t.position, reach)
        })
    });
}

/// True if `target` can be picked: alive, in the world, visible, and within
/// `range` of the body.
pub fn target_valid(ctx: &BrainContext<'_>, target: EntityId, range: u32) -> bool {
    let (Some(me), Some(t)) = (ctx.me(), ctx.entity(target)) else {
        return false;
    };
    t.is_active() && !t.stealthed && me.position.is_within(t.position, range)
}

/// The best valid target in `table`, skipping `avoid`.
pub fn select_target(
    ctx: &BrainContext<'_>,
    table: &AggroTable,
    range: u32,
    avoid: Option<EntityId>,
) -> Option<EntityId> {
    table.most_wanted_by(|id| Some(id) != avoid && target_valid(ctx, id, range))
}

/// Turn `target` into action under `policy`. Leaves an in-progress cast
/// alone and does not restart a live swing on the same target.
pub fn engage(ctx: &mut BrainContext<'_>, target: EntityId, policy: AttackPolicy) -> AiResult<()> {
    let Some(me) = ctx.me() else { return Ok(()) };
    if me.casting.is_some() {
        return Ok(());
    }
    let distance = ctx.distance_to(target).unwrap_or(u32::MAX);
    let in_reach = distance <= me.melee_range;
    let spell = me
        .spells_of(SpellKind::Offensive)
        .find(|s| s.range >= distance)
        .map(|s| s.name.clone());

    let try_spell = match (policy, &spell) {
        (_, None) => false,
        (AttackPolicy::Melee, _) => false,
        (AttackPolicy::Mixed(chance), Some(_)) => ctx.roll(chance),
        (AttackPolicy::SpellsPreferred, Some(_)) => !in_reach,
    };
    if try_spell && let Some(spell) = spell {
        match ctx.cast(target, &spell)? {
            CastOutcome::Started => {
                ctx.stop_attack();
                return Ok(());
            }
            CastOutcome::AlreadyCasting => return Ok(()),
            CastOutcome::OutOfRange | CastOutcome::UnknownSpell | CastOutcome::InvalidTarget => {}
        }
    }

    if ctx.attacking() == Some(target) {
        return Ok(());
    }
    ctx.start_attack(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perception_threat_by_kind() {
        assert_eq!(perception_threat(&Entity::player("Aldric", 12)), 24);
        assert_eq!(perception_threat(&Entity::npc("Rat", 3)), 8);
    }

    #[test]
    fn kind_names() {
        assert_eq!(BrainKind::CrowdControl.to_string(), "crowd-control");
        assert_eq!(AggressionState::default(), AggressionState::Defensive);
        assert_eq!(WalkState::default().to_string(), "follow");
    }
}
