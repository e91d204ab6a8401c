use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_core::EntityId;
use vigil_sched::{ActionHandle, EntityTimer};

use super::{AggressionState, Brain, BrainKind, add_threat};
use crate::aggro::AggroTable;
use crate::config::AiConfig;
use crate::context::{BrainContext, BrainRequest};
use crate::error::{AiError, AiResult};
use crate::event::RegionEventKind;
use crate::notify::Notification;
use crate::state::AiFire;

/// A crowd-control effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrowdControl {
    /// Run away from `source`.
    Fear {
        /// Who caused the fear.
        source: EntityId,
    },
    /// Stand still until hit or expired.
    Mesmerize,
}

impl fmt::Display for CrowdControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fear { .. } => f.write_str("fear"),
            Self::Mesmerize => f.write_str("mesmerize"),
        }
    }
}

/// Temporary stand-in brain for a feared or mesmerized body.
///
/// It owns the brain it replaced and hands it back when the effect ends,
/// either on expiry or, for mesmerize, on the first hit. Threat gained
/// meanwhile goes to the prior brain's table.
#[derive(Debug)]
pub struct CrowdControlBrain {
    effect: CrowdControl,
    duration_ms: u64,
    prior: Option<Box<dyn Brain>>,
    expiry: Option<ActionHandle>,
}

impl CrowdControlBrain {
    /// An effect lasting `duration_ms`, replacing `prior`.
    pub fn new(effect: CrowdControl, duration_ms: u64, prior: Option<Box<dyn Brain>>) -> Self {
        Self {
            effect,
            duration_ms: duration_ms.max(1),
            prior,
            expiry: None,
        }
    }

    /// The active effect.
    pub fn effect(&self) -> CrowdControl {
        self.effect
    }

    /// Variant of the replaced brain.
    pub fn prior_kind(&self) -> Option<BrainKind> {
        self.prior.as_ref().map(|prior| prior.kind())
    }

    /// Replace the effect and restart its timer at `duration_ms`.
    pub fn extend(&mut self, ctx: &mut BrainContext<'_>, effect: CrowdControl, duration_ms: u64) -> AiResult<()> {
        self.effect = effect;
        self.duration_ms = duration_ms.max(1);
        self.arm(ctx)?;
        let description = format!("{}'s {effect} is renewed", ctx.state.name_of(ctx.body));
        ctx.emit(
            RegionEventKind::CrowdControlStarted {
                body: ctx.body,
                effect: effect.to_string(),
            },
            description,
        );
        Ok(())
    }

    fn arm(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        if let Some(old) = self.expiry.take() {
            old.stop();
        }
        let action = EntityTimer::new(ctx.body, "crowd-control").once(|fire: &mut AiFire<'_>, body| {
            match fire.state.end_crowd_control(&mut fire.timers, body) {
                Ok(()) | Err(AiError::NotCrowdControlled(_)) => Ok(()),
                Err(err) => Err(err.into()),
            }
        });
        self.expiry = Some(ctx.timers.start(action, self.duration_ms)?);
        Ok(())
    }

    fn act(&self, ctx: &mut BrainContext<'_>) {
        match self.effect {
            CrowdControl::Fear { source } => {
                let flee = ctx.state.config().flee_distance;
                let from = ctx.entity(source).map(|s| s.position);
                let here = ctx.me().map(|me| me.position);
                if let (Some(from), Some(here)) = (from, here) {
                    ctx.walk_to(here.away_from(from, flee));
                }
            }
            CrowdControl::Mesmerize => ctx.stop_moving(),
        }
    }
}

impl Brain for CrowdControlBrain {
    fn kind(&self) -> BrainKind {
        BrainKind::CrowdControl
    }

    fn think_interval(&self, config: &AiConfig) -> u64 {
        config.crowd_control_think_ms
    }

    fn think(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        self.act(ctx);
        Ok(())
    }

    fn notify(&mut self, ctx: &mut BrainContext<'_>, note: &Notification) -> AiResult<()> {
        if let Notification::Attacked { attacker, damage } = *note {
            if let Some(table) = self.prior.as_mut().and_then(|prior| prior.aggro_mut()) {
                add_threat(ctx, table, attacker, i64::from(damage.max(1)));
            }
            if self.effect == CrowdControl::Mesmerize && damage > 0 {
                debug!(region = %ctx.state.region(), body = %ctx.body, "mesmerize_broken");
                ctx.request(BrainRequest::EndCrowdControl);
            }
        }
        Ok(())
    }

    fn aggression_state(&self) -> AggressionState {
        AggressionState::Passive
    }

    fn aggro(&self) -> Option<&AggroTable> {
        self.prior.as_ref().and_then(|prior| prior.aggro())
    }

    fn aggro_mut(&mut self) -> Option<&mut AggroTable> {
        self.prior.as_mut().and_then(|prior| prior.aggro_mut())
    }

    fn on_attach(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        if let Some(me) = ctx.me_mut() {
            me.crowd_controlled = true;
        }
        ctx.stop_attack();
        ctx.state.interrupt_cast(ctx.body);
        self.arm(ctx)?;
        let description = format!("{} is affected by {}", ctx.state.name_of(ctx.body), self.effect);
        ctx.emit(
            RegionEventKind::CrowdControlStarted {
                body: ctx.body,
                effect: self.effect.to_string(),
            },
            description,
        );
        self.act(ctx);
        Ok(())
    }

    fn on_detach(&mut self, ctx: &mut BrainContext<'_>) {
        if let Some(expiry) = self.expiry.take() {
            expiry.stop();
        }
        if let Some(me) = ctx.me_mut() {
            me.crowd_controlled = false;
        }
        ctx.stop_moving();
        let description = format!("{} recovers from {}", ctx.state.name_of(ctx.body), self.effect);
        ctx.emit(RegionEventKind::CrowdControlEnded { body: ctx.body }, description);
    }

    fn into_prior(self: Box<Self>) -> Option<Box<dyn Brain>> {
        self.prior
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::StandardBrain;
    use crate::state::{AiRegion, RegionWorld, WorldContext};
    use std::sync::Arc;
    use vigil_core::{Entity, Faction, Movement, Point, RegionId, World, WorldMeta};
    use vigil_sched::SchedConfig;

    fn bog() -> (AiRegion, EntityId, EntityId) {
        let mut world = World::new(WorldMeta::new("Bog", RegionId(9)));
        let troll = world
            .spawn(Entity::npc("Troll", 20).with_faction(Faction(5)).with_health(2000))
            .unwrap();
        let hero = world
            .spawn(Entity::player("Aldric", 20).at(Point::flat(100, 0)))
            .unwrap();
        let state = RegionWorld::new(world, Arc::new(WorldContext::default()));
        let mut region = AiRegion::new(RegionId(9), state, SchedConfig::default()).unwrap();
        region.with_scheduler(|state, timers| {
            state
                .attach_brain(timers, troll, Box::new(StandardBrain::new(0, 0)))
                .unwrap();
        });
        (region, troll, hero)
    }

    #[test]
    fn fear_flees_then_prior_returns() {
        let (mut region, troll, hero) = bog();
        region
            .with_scheduler(|state, timers| {
                state.apply_crowd_control(timers, troll, CrowdControl::Fear { source: hero }, 4000)
            })
            .unwrap();
        let state = region.state();
        assert_eq!(state.brains.kind_of(troll), Some(BrainKind::CrowdControl));
        let body = state.world.get_entity(troll).unwrap();
        assert!(body.crowd_controlled);
        assert_eq!(body.movement, Movement::WalkTo(Point::flat(-300, 0)));

        region.advance_by(4000);
        let state = region.state();
        assert_eq!(state.brains.kind_of(troll), Some(BrainKind::Standard));
        assert!(!state.world.get_entity(troll).unwrap().crowd_controlled);
    }

    #[test]
    fn mesmerize_breaks_on_damage_and_keeps_threat() {
        let (mut region, troll, hero) = bog();
        region.with_scheduler(|state, timers| {
            state
                .apply_crowd_control(timers, troll, CrowdControl::Mesmerize, 10_000)
                .unwrap();
            state.deal_damage(timers, hero, troll, 30);
        });
        let state = region.state();
        assert_eq!(state.brains.kind_of(troll), Some(BrainKind::Standard));
        assert_eq!(state.aggro_of(troll).unwrap().threat(hero), Some(30));
    }

    #[test]
    fn reapplying_extends() {
        let (mut region, troll, hero) = bog();
        region
            .with_scheduler(|state, timers| {
                state.apply_crowd_control(timers, troll, CrowdControl::Mesmerize, 2000)
            })
            .unwrap();
        region.advance_by(1500);
        region
            .with_scheduler(|state, timers| {
                state.apply_crowd_control(timers, troll, CrowdControl::Fear { source: hero }, 2000)
            })
            .unwrap();
        region.advance_by(1000);
        let state = region.state();
        assert_eq!(state.brains.kind_of(troll), Some(BrainKind::CrowdControl));
        let brain = state.brains.get(troll).unwrap();
        let cc = brain.as_any().downcast_ref::<CrowdControlBrain>().unwrap();
        assert_eq!(cc.effect(), CrowdControl::Fear { source: hero });
        assert_eq!(cc.prior_kind(), Some(BrainKind::Standard));
        region.advance_by(1500);
        assert_eq!(region.state().brains.kind_of(troll), Some(BrainKind::Standard));
    }
}
