use std::any::Any;

use rand::Rng;
use tracing::debug;
use vigil_core::{EntityId, EntityKind, Movement, Point};

use super::{
    AggressionState, AttackPolicy, Brain, BrainKind, Perception, add_threat, engage, perceive, prune_aggro,
    select_target,
};
use crate::aggro::AggroTable;
use crate::ambient::AmbientTrigger;
use crate::config::AiConfig;
use crate::context::BrainContext;
use crate::error::AiResult;
use crate::notify::Notification;

/// Brain of an independent hostile creature.
///
/// Scans for hostile targets within its aggro range, fights the most wanted
/// one, calls nearby kin when first attacked, and otherwise roams around its
/// spawn point.
#[derive(Debug, Clone)]
pub struct StandardBrain {
    aggro: AggroTable,
    aggro_range: u32,
    aggro_level: u8,
    leash: Option<u32>,
    returning: bool,
}

impl StandardBrain {
    /// A brain scanning `aggro_range` units with `aggro_level` percent odds.
    pub fn new(aggro_range: u32, aggro_level: u8) -> Self {
        Self {
            aggro: AggroTable::new(),
            aggro_range,
            aggro_level: aggro_level.min(100),
            leash: None,
            returning: false,
        }
    }

    /// Give up and walk home when dragged farther than `distance` from the
    /// spawn point.
    pub fn with_leash(mut self, distance: u32) -> Self {
        self.leash = Some(distance);
        self
    }

    /// Scan radius.
    pub fn aggro_range(&self) -> u32 {
        self.aggro_range
    }

    /// Odds of aggroing on an eligible target, in percent.
    pub fn aggro_level(&self) -> u8 {
        self.aggro_level
    }

    /// True while walking home after a leash reset.
    pub fn is_returning(&self) -> bool {
        self.returning
    }

    fn fight(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<bool> {
        let range = ctx.state.config().max_aggro_distance;
        let spell_chance = ctx.state.config().spell_chance;
        match select_target(ctx, &self.aggro, range, None) {
            Some(target) => {
                engage(ctx, target, AttackPolicy::Mixed(spell_chance))?;
                Ok(true)
            }
            None => {
                // Threat is kept for when the target comes back.
                ctx.stop_attack();
                Ok(false)
            }
        }
    }

    fn call_for_help(&self, ctx: &mut BrainContext<'_>, attacker: EntityId) {
        let friends: Vec<EntityId> = {
            let view: &BrainContext<'_> = ctx;
            let Some(me) = view.me() else { return };
            let range = view.state.config().friend_call_range;
            view.state
                .world
                .living_in_radius(me.position, range, Some(EntityKind::Npc))
                .into_iter()
                .filter(|&id| id != view.body && id != attacker)
                .filter(|&id| view.state.brains.kind_of(id) == Some(BrainKind::Standard))
                .filter(|&id| {
                    view.entity(id).is_some_and(|friend| {
                        friend.faction == me.faction && friend.owner.is_none() && friend.attack_target.is_none()
                    })
                })
                .collect()
        };
        for friend in friends {
            debug!(region = %ctx.state.region(), body = %ctx.body, friend = %friend, "friend_called");
            ctx.deliver(friend, Notification::CalledForHelp { attacker });
        }
    }

    fn wander(&self, ctx: &mut BrainContext<'_>, spawn: Point, position: Point, roam_range: u32) {
        let moving = ctx.me().is_some_and(|me| me.movement != Movement::Idle);
        if moving {
            return;
        }
        if !position.is_within(spawn, roam_range.max(1)) {
            ctx.walk_to(spawn);
            return;
        }
        let roam_chance = ctx.state.config().roam_chance;
        if roam_range == 0 || !ctx.roll(roam_chance) {
            return;
        }
        let r = i32::try_from(roam_range).unwrap_or(i32::MAX);
        let dx = ctx.state.rng.random_range(-r..=r);
        let dy = ctx.state.rng.random_range(-r..=r);
        let point = Point::new(
            spawn.x.saturating_add(dx),
            spawn.y.saturating_add(dy),
            spawn.z,
        );
        ctx.walk_to(point);
        ctx.fire_ambient(AmbientTrigger::Roaming, None);
    }
}

impl Brain for StandardBrain {
    fn kind(&self) -> BrainKind {
        BrainKind::Standard
    }

    fn think_interval(&self, _config: &AiConfig) -> u64 {
        10_000u64
            .saturating_sub(u64::from(self.aggro_level) * 100)
            .max(1500)
    }

    fn think(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        let Some(me) = ctx.me() else { return Ok(()) };
        if me.crowd_controlled {
            return Ok(());
        }
        let (position, spawn, roam_range) = (me.position, me.spawn_point, me.roam_range);

        if self.returning {
            if position == spawn {
                self.returning = false;
            } else {
                ctx.walk_to(spawn);
                return Ok(());
            }
        }

        if let Some(leash) = self.leash
            && !position.is_within(spawn, leash)
            && (!self.aggro.is_empty() || ctx.attacking().is_some())
        {
            debug!(region = %ctx.state.region(), body = %ctx.body, "leash_reset");
            self.aggro.clear();
            ctx.stop_attack();
            ctx.walk_to(spawn);
            self.returning = true;
            return Ok(());
        }

        prune_aggro(ctx, &mut self.aggro);
        if ctx.attacking().is_none() {
            let perception = Perception {
                range: self.aggro_range,
                aggro_level: self.aggro_level,
                owner: None,
            };
            perceive(ctx, &mut self.aggro, perception);
        }

        if self.fight(ctx)? {
            return Ok(());
        }
        if self.aggro.is_empty() {
            self.wander(ctx, spawn, position, roam_range);
        }
        Ok(())
    }

    fn notify(&mut self, ctx: &mut BrainContext<'_>, note: &Notification) -> AiResult<()> {
        match *note {
            Notification::Attacked { attacker, damage } => {
                let first = self.aggro.is_empty();
                let threat = i64::from(damage.max(1));
                let owner = ctx
                    .entity(attacker)
                    .and_then(|a| a.owner)
                    .filter(|&owner| ctx.state.world.is_present(owner));
                match owner {
                    Some(owner) => {
                        add_threat(ctx, &mut self.aggro, attacker, (threat * 3 / 4).max(1));
                        add_threat(ctx, &mut self.aggro, owner, (threat / 4).max(1));
                    }
                    None => add_threat(ctx, &mut self.aggro, attacker, threat),
                }
                if ctx.attacking().is_none() {
                    self.fight(ctx)?;
                }
                if first {
                    self.call_for_help(ctx, attacker);
                }
            }
            Notification::CalledForHelp { attacker } => {
                if !self.aggro.contains(attacker) {
                    add_threat(ctx, &mut self.aggro, attacker, 1);
                }
                if ctx.attacking().is_none() {
                    self.fight(ctx)?;
                }
            }
            Notification::EnemyHealed { healer, target, amount } => {
                if self.aggro.contains(target) {
                    add_threat(ctx, &mut self.aggro, healer, i64::from(amount.max(1)));
                }
            }
            Notification::EnemyKilled { target } => {
                let moved = self.aggro.remove(target);
                let owner = ctx.entity(target).and_then(|t| t.owner);
                if let (Some(threat), Some(owner)) = (moved, owner) {
                    add_threat(ctx, &mut self.aggro, owner, i64::try_from(threat).unwrap_or(i64::MAX));
                }
                self.fight(ctx)?;
            }
            Notification::Dying { .. } => {
                self.aggro.clear();
                self.returning = false;
                ctx.stop_attack();
            }
            Notification::FollowLostTarget { .. } => {
                if !self.fight(ctx)? {
                    let spawn = ctx.me().map(|me| me.spawn_point);
                    if let Some(spawn) = spawn {
                        ctx.walk_to(spawn);
                    }
                }
            }
            Notification::OwnerAttacked { .. } | Notification::CastFailed { .. } => {}
        }
        Ok(())
    }

    fn aggression_state(&self) -> AggressionState {
        AggressionState::Aggressive
    }

    fn aggro(&self) -> Option<&AggroTable> {
        Some(&self.aggro)
    }

    fn aggro_mut(&mut self) -> Option<&mut AggroTable> {
        Some(&mut self.aggro)
    }

    fn on_detach(&mut self, ctx: &mut BrainContext<'_>) {
        ctx.stop_attack();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
