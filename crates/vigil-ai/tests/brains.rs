//! Integration tests for AI brains.
use std::any::Any;
use std::sync::{Arc, Mutex};

use vigil_ai::{
    AggressionState, AggroTable, AiConfig, AiError, AiRegion, AiResult, Brain, BrainContext, BrainKind, RegionEventKind,
    RegionWorld, StandardBrain, WorldContext,
};
use vigil_core::{Entity, EntityId, Faction, ObjectState, Point, RegionId, World, WorldMeta};
use vigil_sched::SchedConfig;

/// Records the time of every think it gets.
#[derive(Debug)]
struct Recorder {
    interval: u64,
    ticks: Arc<Mutex<Vec<u64>>>,
    panic_next: bool,
    refuse_attach: bool,
}

impl Recorder {
    fn recording(interval: u64) -> (Self, Arc<Mutex<Vec<u64>>>) {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                interval,
                ticks: Arc::clone(&ticks),
                panic_next: false,
                refuse_attach: false,
            },
            ticks,
        )
    }

    /// Panic on the first think instead of recording it.
    fn panicking_once(mut self) -> Self {
        self.panic_next = true;
        self
    }

    /// Fail `on_attach`.
    fn refusing_attach(mut self) -> Self {
        self.refuse_attach = true;
        self
    }
}

impl Brain for Recorder {
    fn kind(&self) -> BrainKind {
        BrainKind::Standard
    }

    fn think_interval(&self, _config: &AiConfig) -> u64 {
        self.interval
    }

    fn think(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        if self.panic_next {
            self.panic_next = false;
            panic!("cracked golem");
        }
        self.ticks.lock().unwrap().push(ctx.now());
        Ok(())
    }

    fn on_attach(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        if self.refuse_attach {
            return Err(AiError::NotAPet(ctx.body));
        }
        Ok(())
    }

    fn aggression_state(&self) -> AggressionState {
        AggressionState::Passive
    }

    fn aggro(&self) -> Option<&AggroTable> {
        None
    }

    fn aggro_mut(&mut self) -> Option<&mut AggroTable> {
        None
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn region(entities: Vec<Entity>) -> (AiRegion, Vec<EntityId>) {
    let mut world = World::new(WorldMeta::new("Marsh", RegionId(11)));
    let ids = entities.into_iter().map(|e| world.spawn(e).unwrap()).collect();
    let state = RegionWorld::new(world, Arc::new(WorldContext::default()));
    let config = SchedConfig::default().with_realtime(false);
    (AiRegion::new(RegionId(11), state, config).unwrap(), ids)
}

#[test]
fn mob_notices_player_in_range_and_attacks() {
    let (mut region, ids) = region(vec![
        Entity::npc("Ghoul", 15).with_faction(Faction(7)),
        Entity::player("Aldric", 12).at(Point::flat(3000, 0)),
    ]);
    let (ghoul, hero) = (ids[0], ids[1]);
    region.with_scheduler(|state, timers| {
        state
            .attach_brain(timers, ghoul, Box::new(StandardBrain::new(500, 100)))
            .unwrap();
    });

    // Out of range: nothing happens.
    region.advance_by(1500);
    assert!(region.state().aggro_of(ghoul).unwrap().is_empty());
    assert_eq!(region.state().world.get_entity(ghoul).unwrap().attack_target, None);

    region.state_mut().world.get_entity_mut(hero).unwrap().position = Point::flat(400, 0);
    region.advance_by(1500);

    let state = region.state();
    assert_eq!(state.aggro_of(ghoul).unwrap().threat(hero), Some(24));
    assert_eq!(state.most_wanted(ghoul), Some(hero));
    assert_eq!(state.world.get_entity(ghoul).unwrap().attack_target, Some(hero));
    let gained = state
        .events
        .filter(|k| matches!(k, RegionEventKind::AggroGained { target, threat: 24, .. } if *target == hero));
    assert_eq!(gained.len(), 1);
}

#[test]
fn losing_target_keeps_threat() {
    let (mut region, ids) = region(vec![
        Entity::npc("Ghoul", 15).with_faction(Faction(7)),
        Entity::player("Aldric", 12).at(Point::flat(100, 0)),
    ]);
    let (ghoul, hero) = (ids[0], ids[1]);
    region.with_scheduler(|state, timers| {
        state
            .attach_brain(timers, ghoul, Box::new(StandardBrain::new(500, 100)))
            .unwrap();
    });
    region.advance_by(1500);
    assert_eq!(region.state().world.get_entity(ghoul).unwrap().attack_target, Some(hero));

    region.state_mut().world.get_entity_mut(hero).unwrap().stealthed = true;
    region.advance_by(1500);

    let state = region.state();
    assert_eq!(state.world.get_entity(ghoul).unwrap().attack_target, None);
    assert_eq!(state.aggro_of(ghoul).unwrap().threat(hero), Some(24));
}

#[test]
fn brain_swap_is_atomic() {
    let (mut region, ids) = region(vec![Entity::npc("Golem", 10)]);
    let golem = ids[0];
    let (old, old_ticks) = Recorder::recording(500);
    let (new, new_ticks) = Recorder::recording(2000);

    region.with_scheduler(|state, timers| state.attach_brain(timers, golem, Box::new(old)).unwrap());
    region.advance_by(1200);
    assert_eq!(*old_ticks.lock().unwrap(), vec![500, 1000]);

    let swapped_at = region.now();
    region.with_scheduler(|state, timers| {
        let previous = state.swap_brain(timers, golem, Box::new(new)).unwrap();
        assert!(previous.as_any().downcast_ref::<Recorder>().is_some());
    });
    region.advance_by(5000);

    assert_eq!(old_ticks.lock().unwrap().len(), 2);
    let new_ticks = new_ticks.lock().unwrap();
    assert!(!new_ticks.is_empty());
    assert!(new_ticks[0] >= swapped_at + 2000);
}

#[test]
fn think_on_dead_body_is_a_no_op() {
    let (mut region, ids) = region(vec![Entity::npc("Golem", 10)]);
    let golem = ids[0];
    let (recorder, ticks) = Recorder::recording(500);
    region.with_scheduler(|state, timers| state.attach_brain(timers, golem, Box::new(recorder)).unwrap());
    region.state_mut().world.get_entity_mut(golem).unwrap().health = 0;
    region.advance_by(2000);
    assert!(ticks.lock().unwrap().is_empty());
    assert!(region.state().brains.contains(golem));
}

#[test]
fn removed_body_stops_thinking() {
    let (mut region, ids) = region(vec![Entity::npc("Golem", 10)]);
    let golem = ids[0];
    let (recorder, ticks) = Recorder::recording(500);
    region.with_scheduler(|state, timers| state.attach_brain(timers, golem, Box::new(recorder)).unwrap());
    region.advance_by(500);
    region.with_scheduler(|state, timers| state.remove_body(timers, golem).unwrap());
    region.advance_by(2000);
    assert_eq!(ticks.lock().unwrap().len(), 1);
    assert!(region.state().brains.is_empty());
    assert_eq!(region.pending(), 0);
}

#[test]
fn notifications_to_brainless_bodies_are_ignored() {
    let (mut region, ids) = region(vec![
        Entity::npc("Ghoul", 15).with_faction(Faction(7)),
        Entity::player("Aldric", 12).at(Point::flat(100, 0)),
    ]);
    let killed = region.with_scheduler(|state, timers| state.deal_damage(timers, ids[0], ids[1], 10));
    assert!(!killed);
    assert_eq!(region.state().world.get_entity(ids[1]).unwrap().health, 90);
}

#[test]
fn panicking_think_keeps_brain_and_schedule() {
    let (mut region, ids) = region(vec![Entity::npc("Golem", 10)]);
    let golem = ids[0];
    let (recorder, ticks) = Recorder::recording(500);
    region.with_scheduler(|state, timers| {
        state
            .attach_brain(timers, golem, Box::new(recorder.panicking_once()))
            .unwrap();
    });
    region.advance_by(1500);

    assert_eq!(*ticks.lock().unwrap(), vec![1000, 1500]);
    assert_eq!(region.stats().panics, 1);
    assert!(!region.state().brains.is_busy(golem));
    let detached = region.with_scheduler(|state, timers| state.detach_brain(timers, golem));
    assert!(detached.is_ok());
}

#[test]
fn failed_swap_keeps_old_brain() {
    let (mut region, ids) = region(vec![Entity::npc("Golem", 10)]);
    let golem = ids[0];
    let (old, old_ticks) = Recorder::recording(500);
    let (refusing, new_ticks) = Recorder::recording(500);
    region.with_scheduler(|state, timers| state.attach_brain(timers, golem, Box::new(old)).unwrap());
    region.advance_by(500);

    let err = region.with_scheduler(|state, timers| {
        state
            .swap_brain(timers, golem, Box::new(refusing.refusing_attach()))
            .unwrap_err()
    });
    assert!(matches!(err, AiError::NotAPet(_)));

    let brain = region.state().brains.get(golem).unwrap();
    let kept = brain.as_any().downcast_ref::<Recorder>().unwrap();
    assert!(!kept.refuse_attach);

    region.advance_by(1000);
    assert_eq!(*old_ticks.lock().unwrap(), vec![500, 1000, 1500]);
    assert!(new_ticks.lock().unwrap().is_empty());
}

#[test]
fn respawned_body_thinks_again() {
    let (mut region, ids) = region(vec![Entity::npc("Golem", 10)]);
    let golem = ids[0];
    let (recorder, ticks) = Recorder::recording(500);
    region.with_scheduler(|state, timers| state.attach_brain(timers, golem, Box::new(recorder)).unwrap());
    region.advance_by(500);

    region.state_mut().world.set_state(golem, ObjectState::Inactive).unwrap();
    region.advance_by(1000);
    assert_eq!(*ticks.lock().unwrap(), vec![500]);
    assert!(region.state().brains.think_handle(golem).unwrap().is_running());

    region.state_mut().world.set_state(golem, ObjectState::Active).unwrap();
    region.advance_by(500);
    assert_eq!(*ticks.lock().unwrap(), vec![500, 2000]);
}

#[test]
fn clearing_aggro_of_a_running_brain_reports_busy() {
    let (mut region, ids) = region(vec![Entity::npc("Ghoul", 15)]);
    let ghoul = ids[0];
    let cleared = region.with_scheduler(|state, timers| {
        state
            .attach_brain(timers, ghoul, Box::new(StandardBrain::new(500, 0)))
            .unwrap();
        state
            .with_brain(timers, ghoul, |_, ctx| ctx.state.clear_aggro(ctx.body))
            .unwrap()
    });
    assert!(matches!(cleared, Err(AiError::BrainBusy(_))));
    assert!(region.state_mut().clear_aggro(ghoul).is_ok());
}
