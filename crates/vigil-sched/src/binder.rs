use std::borrow::Cow;

use vigil_core::EntityId;

use crate::action::{ActionHandle, ScheduledAction};
use crate::error::{ActionResult, SchedResult};
use crate::timer::{Fire, Scheduler};

/// Binds a scheduled action to one owning entity.
///
/// Callbacks receive the owner's handle alongside the tick, so effects,
/// combat swings, and ambient behaviour need no timer type of their own. The
/// owner is checked for presence before every tick.
///
/// ```ignore
/// let action = EntityTimer::new(goblin, "regen").every(|fire, goblin| {
///     heal(fire.state, goblin);
///     Ok(6_000)
/// });
/// ```
#[derive(Debug, Clone)]
pub struct EntityTimer {
    owner: EntityId,
    label: Cow<'static, str>,
}

impl EntityTimer {
    /// A binder for `owner`, labelled for logs.
    pub fn new(owner: EntityId, label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            owner,
            label: label.into(),
        }
    }

    /// The bound owner.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// A fire-once action calling `f` with the owner.
    pub fn once<S, F>(self, f: F) -> ScheduledAction<S>
    where
        S: 'static,
        F: FnOnce(&mut Fire<'_, S>, EntityId) -> ActionResult<()> + Send + 'static,
    {
        let owner = self.owner;
        ScheduledAction::new(Some(owner), self.label).once(move |fire| f(fire, owner))
    }

    /// A fire-once action carrying a fixed payload.
    pub fn once_with<S, T, F>(self, payload: T, f: F) -> ScheduledAction<S>
    where
        S: 'static,
        T: Send + 'static,
        F: FnOnce(&mut Fire<'_, S>, EntityId, T) -> ActionResult<()> + Send + 'static,
    {
        let owner = self.owner;
        ScheduledAction::new(Some(owner), self.label).once(move |fire| f(fire, owner, payload))
    }

    /// A self-interval action; `f` returns the next delay, `<= 0` stops.
    pub fn every<S, F>(self, mut f: F) -> ScheduledAction<S>
    where
        S: 'static,
        F: FnMut(&mut Fire<'_, S>, EntityId) -> ActionResult<i64> + Send + 'static,
    {
        let owner = self.owner;
        ScheduledAction::new(Some(owner), self.label).every(move |fire| f(fire, owner))
    }
}

impl<S: 'static> Scheduler<'_, S> {
    /// Run `f` once, `delay` ms from now, on behalf of `owner`.
    pub fn schedule<F>(&mut self, owner: EntityId, delay: u64, f: F) -> SchedResult<ActionHandle>
    where
        F: FnOnce(&mut Fire<'_, S>, EntityId) -> ActionResult<()> + Send + 'static,
    {
        self.start(EntityTimer::new(owner, "once").once(f), delay)
    }

    /// Run `f` first after `delay` ms and then after whatever delay it
    /// returns, until it returns zero or less.
    pub fn schedule_repeating<F>(
        &mut self,
        owner: EntityId,
        delay: u64,
        f: F,
    ) -> SchedResult<ActionHandle>
    where
        F: FnMut(&mut Fire<'_, S>, EntityId) -> ActionResult<i64> + Send + 'static,
    {
        self.start(EntityTimer::new(owner, "repeating").every(f), delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedConfig;
    use crate::timer::TimerManager;
    use vigil_core::{Entity, ObjectState, RegionId, World, WorldMeta};

    fn world_with(name: &str) -> (World, EntityId) {
        let mut world = World::new(WorldMeta::new("Binder", RegionId(2)));
        let id = world.spawn(Entity::npc(name, 10)).unwrap();
        (world, id)
    }

    #[test]
    fn once_passes_owner_to_callback() {
        let (mut world, goblin) = world_with("Goblin");
        let mut timers: TimerManager<World> = TimerManager::new(RegionId(2), &SchedConfig::default());
        timers
            .scheduler(0)
            .schedule(goblin, 100, |fire, owner| {
                fire.state.get_entity_mut(owner).unwrap().level += 1;
                Ok(())
            })
            .unwrap();

        timers.run_due(&mut world, 100);
        assert_eq!(world.get_entity(goblin).unwrap().level, 11);
    }

    #[test]
    fn payload_is_delivered_once() {
        let (mut world, goblin) = world_with("Goblin");
        let mut timers: TimerManager<World> = TimerManager::new(RegionId(2), &SchedConfig::default());
        let action = EntityTimer::new(goblin, "rename").once_with(
            String::from("Hobgoblin"),
            |fire: &mut Fire<'_, World>, owner, name| {
                fire.state.get_entity_mut(owner).unwrap().name = name;
                Ok(())
            },
        );
        timers.scheduler(0).start(action, 5).unwrap();
        timers.run_due(&mut world, 5);
        assert_eq!(world.get_entity(goblin).unwrap().name, "Hobgoblin");
    }

    #[test]
    fn repeating_stops_when_owner_leaves() {
        let (mut world, goblin) = world_with("Goblin");
        let mut timers: TimerManager<World> = TimerManager::new(RegionId(2), &SchedConfig::default());
        let handle = timers
            .scheduler(0)
            .schedule_repeating(goblin, 100, |fire, owner| {
                fire.state.get_entity_mut(owner).unwrap().health -= 1;
                Ok(100)
            })
            .unwrap();

        timers.run_due(&mut world, 100);
        timers.run_due(&mut world, 200);
        assert_eq!(world.get_entity(goblin).unwrap().health, 98);

        world.set_state(goblin, ObjectState::Inactive).unwrap();
        timers.run_due(&mut world, 300);
        assert!(handle.is_stopped());
        assert_eq!(world.get_entity(goblin).unwrap().health, 98);
    }
}
