//! Combat commands: melee swings, spell casts, damage, and movement intents.
//!
//! Brains only ever ask for these; damage numbers come from the region's
//! [`CombatRules`](crate::rules::CombatRules).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use vigil_core::{EntityId, Movement, Point, Spell, SpellKind};
use vigil_sched::{ActionHandle, ActionResult, EntityTimer};

use crate::ambient::AmbientTrigger;
use crate::error::{AiError, AiResult};
use crate::event::RegionEventKind;
use crate::notify::{CastFailure, Notification};
use crate::state::{AiFire, AiScheduler, RegionWorld};

/// Live swing and cast actions, one of each per body at most.
#[derive(Debug, Default)]
pub struct CombatBook {
    swings: HashMap<EntityId, ActionHandle>,
    casts: HashMap<EntityId, ActionHandle>,
}

impl CombatBook {
    /// True while `body` has a swing action running.
    pub fn is_swinging(&self, body: EntityId) -> bool {
        self.swings.get(&body).is_some_and(ActionHandle::is_running)
    }

    /// True while `body` has a cast pending.
    pub fn is_casting(&self, body: EntityId) -> bool {
        self.casts.get(&body).is_some_and(ActionHandle::is_running)
    }
}

/// Result of asking a body to cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    /// The cast is under way.
    Started,
    /// The target is beyond the spell's range.
    OutOfRange,
    /// The caster does not know the spell.
    UnknownSpell,
    /// The caster is already casting.
    AlreadyCasting,
    /// The target cannot receive this spell.
    InvalidTarget,
}

impl fmt::Display for CastOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::OutOfRange => f.write_str("out of range"),
            Self::UnknownSpell => f.write_str("unknown spell"),
            Self::AlreadyCasting => f.write_str("already casting"),
            Self::InvalidTarget => f.write_str("invalid target"),
        }
    }
}

impl RegionWorld {
    /// Make `attacker` chase and swing at `target` at its attack speed.
    pub fn start_attack(
        &mut self,
        timers: &mut AiScheduler<'_>,
        attacker: EntityId,
        target: EntityId,
    ) -> AiResult<()> {
        let target_active = self
            .world
            .get_entity(target)
            .ok_or(AiError::BodyNotFound(target))?
            .is_active();
        let config = self.config().clone();
        let me = self
            .world
            .get_entity_mut(attacker)
            .ok_or(AiError::BodyNotFound(attacker))?;
        if !me.is_alive() || !target_active || attacker == target {
            return Ok(());
        }

        let max = if me.is_pet() {
            config.max_enemy_follow_distance
        } else {
            config.max_aggro_distance
        };
        me.attack_target = Some(target);
        me.movement = Movement::Follow {
            target,
            min: config.min_enemy_follow_distance,
            max,
        };
        let attack_speed = me.attack_speed_ms.max(1);

        if let Some(old) = self.combat.swings.remove(&attacker) {
            old.stop();
        }
        let action = EntityTimer::new(attacker, "swing")
            .every(move |fire: &mut AiFire<'_>, attacker| swing(fire, attacker, target));
        let handle = timers.start(action, 1)?;
        self.combat.swings.insert(attacker, handle);

        let description = format!("{} attacks {}", self.name_of(attacker), self.name_of(target));
        self.emit(timers.now(), RegionEventKind::AttackStarted { attacker, target }, description);
        debug!(region = %self.region(), attacker = %attacker, target = %target, attack_speed, "attack_started");
        Ok(())
    }

    /// Stop `attacker`'s swings. Returns true if it was attacking.
    pub fn stop_attack(&mut self, now: u64, attacker: EntityId) -> bool {
        if let Some(handle) = self.combat.swings.remove(&attacker) {
            handle.stop();
        }
        let Some(me) = self.world.get_entity_mut(attacker) else {
            return false;
        };
        let Some(target) = me.attack_target.take() else {
            return false;
        };
        if matches!(me.movement, Movement::Follow { target: t, .. } if t == target) {
            me.movement = Movement::Idle;
        }
        let description = format!("{} stops attacking", self.name_of(attacker));
        self.emit(now, RegionEventKind::AttackStopped { attacker }, description);
        true
    }

    /// Apply `amount` damage from `source` to `target` and tell everyone who
    /// cares. Returns true if the hit killed.
    pub fn deal_damage(
        &mut self,
        timers: &mut AiScheduler<'_>,
        source: EntityId,
        target: EntityId,
        amount: u32,
    ) -> bool {
        let now = timers.now();
        let Some(victim) = self.world.get_entity_mut(target) else {
            return false;
        };
        if !victim.is_alive() {
            return false;
        }
        let died = victim.take_damage(amount);

        let description = format!(
            "{} hits {} for {amount}",
            self.name_of(source),
            self.name_of(target)
        );
        self.emit(
            now,
            RegionEventKind::Hit {
                attacker: source,
                target,
                damage: amount,
            },
            description,
        );

        for pet in self.world.pets_of(target) {
            self.deliver(
                timers,
                pet,
                Notification::OwnerAttacked {
                    attacker: source,
                    damage: amount,
                },
            );
        }
        if !died {
            self.deliver(
                timers,
                target,
                Notification::Attacked {
                    attacker: source,
                    damage: amount,
                },
            );
            return false;
        }

        let description = format!("{} kills {}", self.name_of(source), self.name_of(target));
        self.emit(
            now,
            RegionEventKind::Killed {
                killer: source,
                victim: target,
            },
            description,
        );
        debug!(region = %self.region(), killer = %source, victim = %target, "body_killed");

        self.stop_attack(now, target);
        self.interrupt_cast(target);
        self.stop_moving(target);
        self.fire_ambient(now, target, AmbientTrigger::Dying, Some(source));
        self.deliver(timers, target, Notification::Dying { killer: Some(source) });
        self.fire_ambient(now, source, AmbientTrigger::Killing, Some(target));
        self.deliver(timers, source, Notification::EnemyKilled { target });
        true
    }

    /// Begin casting `spell` from `caster` at `target`.
    pub fn cast_spell(
        &mut self,
        timers: &mut AiScheduler<'_>,
        caster: EntityId,
        target: EntityId,
        spell: &str,
    ) -> AiResult<CastOutcome> {
        let context = Arc::clone(self.context());
        let me = self.world.get_entity(caster).ok_or(AiError::BodyNotFound(caster))?;
        let Some(spell) = me.spells.iter().find(|s| s.name == spell).cloned() else {
            return Ok(CastOutcome::UnknownSpell);
        };
        if !me.is_alive() || me.casting.is_some() {
            return Ok(CastOutcome::AlreadyCasting);
        }
        let Some(them) = self.world.get_entity(target).filter(|t| t.is_active()) else {
            return Ok(CastOutcome::InvalidTarget);
        };
        let hostile = context.rules.is_hostile(me, them);
        let fits = match spell.kind {
            SpellKind::Offensive => hostile,
            SpellKind::Defensive => !hostile,
        };
        if !fits {
            return Ok(CastOutcome::InvalidTarget);
        }
        if !me.position.is_within(them.position, spell.range) {
            return Ok(CastOutcome::OutOfRange);
        }

        let cast_time = spell.cast_time_ms.max(1);
        let name = spell.name.clone();
        let action = EntityTimer::new(caster, "cast").once_with(
            (target, spell),
            |fire: &mut AiFire<'_>, caster, (target, spell): (EntityId, Spell)| {
                complete_cast(fire, caster, target, &spell);
                Ok(())
            },
        );
        let handle = timers.start(action, cast_time)?;
        self.combat.casts.insert(caster, handle);
        if let Some(me) = self.world.get_entity_mut(caster) {
            me.casting = Some(name.clone());
        }

        let description = format!(
            "{} begins casting {name} on {}",
            self.name_of(caster),
            self.name_of(target)
        );
        self.emit(
            timers.now(),
            RegionEventKind::SpellCast {
                caster,
                target,
                spell: name,
            },
            description,
        );
        Ok(CastOutcome::Started)
    }

    /// Abandon `body`'s pending cast. Returns true if there was one.
    pub fn interrupt_cast(&mut self, body: EntityId) -> bool {
        if let Some(handle) = self.combat.casts.remove(&body) {
            handle.stop();
        }
        self.world
            .get_entity_mut(body)
            .and_then(|me| me.casting.take())
            .is_some()
    }

    /// Walk `body` to `point`.
    pub fn walk_to(&mut self, body: EntityId, point: Point) {
        if let Some(me) = self.world.get_entity_mut(body) {
            me.movement = Movement::WalkTo(point);
        }
    }

    /// Keep `body` between `min` and `max` of `target`.
    pub fn follow(&mut self, body: EntityId, target: EntityId, min: u32, max: u32) {
        if body == target {
            return;
        }
        if let Some(me) = self.world.get_entity_mut(body) {
            me.movement = Movement::Follow { target, min, max };
        }
    }

    /// Stop `body` where it stands.
    pub fn stop_moving(&mut self, body: EntityId) {
        if let Some(me) = self.world.get_entity_mut(body) {
            me.movement = Movement::Idle;
        }
    }
}

fn swing(fire: &mut AiFire<'_>, attacker: EntityId, target: EntityId) -> ActionResult<i64> {
    let now = fire.now();
    let state = &mut *fire.state;
    let Some(me) = state.world.get_entity(attacker) else {
        return Ok(0);
    };
    if !me.is_alive() || me.attack_target != Some(target) {
        return Ok(0);
    }
    if !me.is_active() {
        state.stop_attack(now, attacker);
        return Ok(0);
    }
    let next = i64::try_from(me.attack_speed_ms.max(1)).unwrap_or(i64::MAX);
    let Some(them) = state.world.get_entity(target).filter(|t| t.is_active()) else {
        state.stop_attack(now, attacker);
        return Ok(0);
    };
    if !me.position.is_within(them.position, me.melee_range) {
        return Ok(next);
    }

    let context = Arc::clone(state.context());
    let damage = context.rules.melee_damage(me, them, &mut state.rng);
    let killed = state.deal_damage(&mut fire.timers, attacker, target, damage);
    if !killed {
        state.fire_ambient(now, attacker, AmbientTrigger::Fighting, Some(target));
    }
    Ok(next)
}

fn complete_cast(fire: &mut AiFire<'_>, caster: EntityId, target: EntityId, spell: &Spell) {
    let now = fire.now();
    let state = &mut *fire.state;
    state.combat.casts.remove(&caster);
    let Some(me) = state.world.get_entity_mut(caster) else {
        return;
    };
    if me.casting.as_deref() != Some(spell.name.as_str()) {
        return;
    }
    me.casting = None;
    if !me.is_active() {
        return;
    }

    let context = Arc::clone(state.context());
    let (Some(me), them) = (
        state.world.get_entity(caster),
        state.world.get_entity(target).filter(|t| t.is_active()),
    ) else {
        return;
    };
    let failure = match them {
        None => Some(CastFailure::TargetGone),
        Some(them) if !me.position.is_within(them.position, spell.range) => Some(CastFailure::OutOfRange),
        Some(_) => None,
    };
    if let Some(reason) = failure {
        let description = format!("{}'s {} fails: {reason}", state.name_of(caster), spell.name);
        state.emit(
            now,
            RegionEventKind::CastFailed {
                caster,
                target,
                reason: reason.to_string(),
            },
            description,
        );
        state.deliver(&mut fire.timers, caster, Notification::CastFailed { target, reason });
        return;
    }

    match spell.kind {
        SpellKind::Offensive => {
            let damage = match (state.world.get_entity(caster), state.world.get_entity(target)) {
                (Some(me), Some(them)) => context.rules.spell_damage(me, them, spell, &mut state.rng),
                _ => return,
            };
            state.deal_damage(&mut fire.timers, caster, target, damage);
        }
        SpellKind::Defensive => {
            let amount = match (state.world.get_entity(caster), state.world.get_entity(target)) {
                (Some(me), Some(them)) => context.rules.heal_amount(me, them, spell),
                _ => return,
            };
            let healed = state
                .world
                .get_entity_mut(target)
                .map_or(0, |them| them.heal(amount));
            let description = format!(
                "{} heals {} for {healed}",
                state.name_of(caster),
                state.name_of(target)
            );
            state.emit(
                now,
                RegionEventKind::Healed {
                    healer: caster,
                    target,
                    amount: healed,
                },
                description,
            );
            for body in state.brains.bodies_with_threat_on(target) {
                state.deliver(
                    &mut fire.timers,
                    body,
                    Notification::EnemyHealed {
                        healer: caster,
                        target,
                        amount: healed,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AiRegion, WorldContext};
    use vigil_core::{Entity, Faction, RegionId, World, WorldMeta};
    use vigil_sched::SchedConfig;

    struct Arena {
        region: AiRegion,
        ogre: EntityId,
        hero: EntityId,
    }

    fn arena(gap: i32) -> Arena {
        let mut world = World::new(WorldMeta::new("Arena", RegionId(3)));
        let ogre = world
            .spawn(
                Entity::npc("Ogre", 10)
                    .with_faction(Faction(2))
                    .with_attack_speed(1000)
                    .with_spell(Spell::offensive("Boulder", 1500, 500, 30))
                    .with_spell(Spell::defensive("Grunt", 1500, 500, 20))
                    .at(Point::flat(0, 0)),
            )
            .unwrap();
        let hero = world
            .spawn(Entity::player("Aldric", 10).with_health(500).at(Point::flat(gap, 0)))
            .unwrap();
        let state = RegionWorld::new(world, Arc::new(WorldContext::default()));
        Arena {
            region: AiRegion::new(RegionId(3), state, SchedConfig::default()).unwrap(),
            ogre,
            hero,
        }
    }

    fn hits(region: &AiRegion) -> usize {
        region
            .state()
            .events
            .filter(|k| matches!(k, RegionEventKind::Hit { .. }))
            .len()
    }

    #[test]
    fn swings_at_attack_speed() {
        let Arena {
            mut region,
            ogre,
            hero,
        } = arena(100);
        region.with_scheduler(|state, timers| state.start_attack(timers, ogre, hero).unwrap());
        region.advance_by(50);
        assert_eq!(hits(&region), 1);
        region.advance_by(1000);
        assert_eq!(hits(&region), 2);
        let hp = region.state().world.get_entity(hero).unwrap().health;
        assert!(hp < 500);
    }

    #[test]
    fn out_of_reach_swings_skip() {
        let Arena {
            mut region,
            ogre,
            hero,
        } = arena(1000);
        region.with_scheduler(|state, timers| state.start_attack(timers, ogre, hero).unwrap());
        region.advance_by(3000);
        assert_eq!(hits(&region), 0);
        assert!(region.state().combat.is_swinging(ogre));
    }

    #[test]
    fn stop_attack_cancels_swing() {
        let Arena {
            mut region,
            ogre,
            hero,
        } = arena(100);
        region.with_scheduler(|state, timers| state.start_attack(timers, ogre, hero).unwrap());
        let now = region.now();
        assert!(region.state_mut().stop_attack(now, ogre));
        region.advance_by(3000);
        assert_eq!(hits(&region), 0);
        let ogre = region.state().world.get_entity(ogre).unwrap();
        assert_eq!(ogre.attack_target, None);
        assert_eq!(ogre.movement, Movement::Idle);
    }

    #[test]
    fn lethal_damage_kills_once() {
        let Arena {
            mut region,
            ogre,
            hero,
        } = arena(100);
        let killed = region.with_scheduler(|state, timers| {
            let first = state.deal_damage(timers, ogre, hero, 10_000);
            let second = state.deal_damage(timers, ogre, hero, 10);
            (first, second)
        });
        assert_eq!(killed, (true, false));
        let deaths = region
            .state()
            .events
            .filter(|k| matches!(k, RegionEventKind::Killed { .. }));
        assert_eq!(deaths.len(), 1);
    }

    #[test]
    fn cast_lands_after_cast_time() {
        let Arena {
            mut region,
            ogre,
            hero,
        } = arena(800);
        let outcome = region
            .with_scheduler(|state, timers| state.cast_spell(timers, ogre, hero, "Boulder"))
            .unwrap();
        assert_eq!(outcome, CastOutcome::Started);
        assert_eq!(
            region.state().world.get_entity(ogre).unwrap().casting.as_deref(),
            Some("Boulder")
        );
        region.advance_by(400);
        assert_eq!(hits(&region), 0);
        region.advance_by(200);
        assert_eq!(hits(&region), 1);
        assert!(region.state().world.get_entity(ogre).unwrap().casting.is_none());
    }

    #[test]
    fn cast_checks() {
        let Arena {
            mut region,
            ogre,
            hero,
        } = arena(2000);
        region.with_scheduler(|state, timers| {
            assert_eq!(
                state.cast_spell(timers, ogre, hero, "Boulder").unwrap(),
                CastOutcome::OutOfRange
            );
            assert_eq!(
                state.cast_spell(timers, ogre, hero, "Meteor").unwrap(),
                CastOutcome::UnknownSpell
            );
            assert_eq!(
                state.cast_spell(timers, ogre, hero, "Grunt").unwrap(),
                CastOutcome::InvalidTarget
            );
            assert_eq!(
                state.cast_spell(timers, ogre, ogre, "Grunt").unwrap(),
                CastOutcome::Started
            );
            assert_eq!(
                state.cast_spell(timers, ogre, ogre, "Grunt").unwrap(),
                CastOutcome::AlreadyCasting
            );
        });
    }

    #[test]
    fn target_leaving_range_fails_cast() {
        let Arena {
            mut region,
            ogre,
            hero,
        } = arena(800);
        region
            .with_scheduler(|state, timers| state.cast_spell(timers, ogre, hero, "Boulder"))
            .unwrap();
        region.state_mut().world.get_entity_mut(hero).unwrap().position = Point::flat(5000, 0);
        region.advance_by(600);
        assert_eq!(hits(&region), 0);
        let failed = region
            .state()
            .events
            .filter(|k| matches!(k, RegionEventKind::CastFailed { .. }));
        assert_eq!(failed.len(), 1);
    }
}
