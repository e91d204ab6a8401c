use std::any::Any;

use tracing::debug;
use vigil_core::EntityId;

use super::{AggressionState, Brain, BrainKind, ControlledBrain, PetCommand, PetCommands, WalkState};
use crate::aggro::AggroTable;
use crate::config::AiConfig;
use crate::context::BrainContext;
use crate::error::AiResult;
use crate::notify::Notification;

/// Brain of a pet that only ever trails its owner. It never fights and
/// shrugs off commands.
#[derive(Debug, Clone)]
pub struct FollowBrain {
    inner: ControlledBrain,
}

impl FollowBrain {
    /// A follower of `owner`.
    pub fn new(owner: EntityId) -> Self {
        let mut inner = ControlledBrain::new(owner);
        inner.force_passive_follow();
        Self { inner }
    }
}

impl PetCommands for FollowBrain {
    fn owner(&self) -> EntityId {
        self.inner.owner()
    }

    fn command(&mut self, ctx: &mut BrainContext<'_>, command: PetCommand) -> AiResult<()> {
        debug!(region = %ctx.state.region(), pet = %ctx.body, ?command, "pet_command_ignored");
        Ok(())
    }
}

impl Brain for FollowBrain {
    fn kind(&self) -> BrainKind {
        BrainKind::FollowOnly
    }

    fn think_interval(&self, config: &AiConfig) -> u64 {
        self.inner.think_interval(config)
    }

    fn think(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        self.inner.force_passive_follow();
        self.inner.think(ctx)
    }

    fn notify(&mut self, ctx: &mut BrainContext<'_>, note: &Notification) -> AiResult<()> {
        match note {
            Notification::FollowLostTarget { .. } | Notification::Dying { .. } => self.inner.notify(ctx, note),
            _ => Ok(()),
        }
    }

    fn aggression_state(&self) -> AggressionState {
        AggressionState::Passive
    }

    fn walk_state(&self) -> Option<WalkState> {
        Some(WalkState::Follow)
    }

    fn aggro(&self) -> Option<&AggroTable> {
        self.inner.aggro()
    }

    fn aggro_mut(&mut self) -> Option<&mut AggroTable> {
        self.inner.aggro_mut()
    }

    fn on_attach(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        self.inner.on_attach(ctx)
    }

    fn on_detach(&mut self, ctx: &mut BrainContext<'_>) {
        self.inner.on_detach(ctx);
    }

    fn as_pet(&mut self) -> Option<&mut dyn PetCommands> {
        Some(self)
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
    use crate::state::{AiRegion, RegionWorld, WorldContext};
    use std::sync::Arc;
    use vigil_core::{Entity, Faction, Movement, Point, RegionId, World, WorldMeta};
    use vigil_sched::SchedConfig;

    #[test]
    fn ignores_orders_and_attacks() {
        let mut world = World::new(WorldMeta::new("Lane", RegionId(7)));
        let owner = world.spawn(Entity::player("Mira", 20)).unwrap();
        let pet = world
            .spawn(Entity::npc("Lamb", 5).owned_by(owner).at(Point::flat(60, 0)))
            .unwrap();
        let fox = world
            .spawn(Entity::npc("Fox", 20).with_faction(Faction(2)).at(Point::flat(120, 0)))
            .unwrap();
        let state = RegionWorld::new(world, Arc::new(WorldContext::default()));
        let mut region = AiRegion::new(RegionId(7), state, SchedConfig::default()).unwrap();

        region.with_scheduler(|state, timers| {
            state
                .attach_brain(timers, pet, Box::new(FollowBrain::new(owner)))
                .unwrap();
            state.command_pet(timers, pet, PetCommand::Attack(fox)).unwrap();
            state.command_pet(timers, pet, PetCommand::Stay).unwrap();
            state.deal_damage(timers, fox, pet, 5);
        });
        region.advance_by(1500);

        let state = region.state();
        let lamb = state.world.get_entity(pet).unwrap();
        assert_eq!(lamb.attack_target, None);
        assert!(matches!(lamb.movement, Movement::Follow { target, .. } if target == owner));
        assert!(state.aggro_of(pet).unwrap().is_empty());
        assert_eq!(
            state.brains.get(pet).unwrap().aggression_state(),
            AggressionState::Passive
        );
    }
}
