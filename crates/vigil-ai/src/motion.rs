use tracing::debug;
use vigil_core::{EntityId, Movement, Point};
use vigil_sched::{ActionHandle, ScheduledAction, SchedResult};

use crate::notify::Notification;
use crate::state::{AiFire, AiScheduler, RegionWorld};

/// How often bodies move along their intents.
pub const MOTION_INTERVAL_MS: u64 = 250;

/// Start the region-wide movement pass. Every pass moves each walking or
/// following body a straight-line step of `speed * interval / 1000`.
pub fn start_motion(timers: &mut AiScheduler<'_>) -> SchedResult<ActionHandle> {
    let action = ScheduledAction::<RegionWorld>::new(None, "motion").every(|fire: &mut AiFire<'_>| {
        move_bodies(fire, MOTION_INTERVAL_MS);
        Ok(MOTION_INTERVAL_MS as i64)
    });
    timers.start(action, MOTION_INTERVAL_MS)
}

enum Step {
    To(Point),
    Arrived(Point),
    Lost(EntityId),
}

/// One movement pass over every body.
pub fn move_bodies(fire: &mut AiFire<'_>, elapsed_ms: u64) {
    let state = &mut *fire.state;
    let mut steps = Vec::new();
    for body in state.world.all_entities().filter(|e| e.is_active()) {
        let reach = u32::try_from(u64::from(body.speed) * elapsed_ms / 1000).unwrap_or(u32::MAX);
        let step = match body.movement {
            Movement::Idle => continue,
            Movement::WalkTo(point) => {
                let next = body.position.step_toward(point, reach);
                if next == point {
                    Step::Arrived(point)
                } else {
                    Step::To(next)
                }
            }
            Movement::Follow { target, min, max } => {
                let Some(leader) = state.world.get_entity(target).filter(|t| t.is_active()) else {
                    steps.push((body.id, Step::Lost(target)));
                    continue;
                };
                let distance = body.position.distance(leader.position);
                if distance > max {
                    Step::Lost(target)
                } else if distance <= min {
                    continue;
                } else {
                    Step::To(body.position.step_toward(leader.position, reach.min(distance - min)))
                }
            }
        };
        steps.push((body.id, step));
    }

    for (body, step) in steps {
        match step {
            Step::To(point) => {
                if let Some(me) = state.world.get_entity_mut(body) {
                    me.position = point;
                }
            }
            Step::Arrived(point) => {
                if let Some(me) = state.world.get_entity_mut(body) {
                    me.position = point;
                    me.movement = Movement::Idle;
                }
            }
            Step::Lost(target) => {
                state.stop_moving(body);
                debug!(region = %state.region(), body = %body, target = %target, "follow_lost_target");
                state.deliver(&mut fire.timers, body, Notification::FollowLostTarget { target });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AiRegion, WorldContext};
    use std::sync::Arc;
    use vigil_core::{Entity, RegionId, World, WorldMeta};
    use vigil_sched::SchedConfig;

    fn region_with(entities: Vec<Entity>) -> (AiRegion, Vec<EntityId>) {
        let mut world = World::new(WorldMeta::new("Moor", RegionId(2)));
        let ids = entities.into_iter().map(|e| world.spawn(e).unwrap()).collect();
        let state = RegionWorld::new(world, Arc::new(WorldContext::default()));
        let mut region = AiRegion::new(RegionId(2), state, SchedConfig::default()).unwrap();
        region.with_scheduler(|_, timers| start_motion(timers).unwrap());
        (region, ids)
    }

    #[test]
    fn walkers_arrive_and_stop() {
        let (mut region, ids) = region_with(vec![Entity::npc("Walker", 5).with_speed(400)]);
        let walker = ids[0];
        region.state_mut().walk_to(walker, Point::flat(250, 0));
        region.advance_by(250);
        let me = region.state().world.get_entity(walker).unwrap();
        assert_eq!(me.position, Point::flat(100, 0));
        region.advance_by(500);
        let me = region.state().world.get_entity(walker).unwrap();
        assert_eq!(me.position, Point::flat(250, 0));
        assert_eq!(me.movement, Movement::Idle);
    }

    #[test]
    fn followers_hold_at_min_distance() {
        let (mut region, ids) = region_with(vec![
            Entity::player("Leader", 10).at(Point::flat(1000, 0)),
            Entity::npc("Hound", 5).with_speed(800),
        ]);
        let (leader, hound) = (ids[0], ids[1]);
        region.state_mut().follow(hound, leader, 100, 5000);
        region.advance_by(2000);
        let hound = region.state().world.get_entity(hound).unwrap();
        assert_eq!(hound.position, Point::flat(900, 0));
        assert!(matches!(hound.movement, Movement::Follow { .. }));
    }

    #[test]
    fn follow_abandoned_beyond_max() {
        let (mut region, ids) = region_with(vec![
            Entity::player("Leader", 10).at(Point::flat(9000, 0)),
            Entity::npc("Hound", 5),
        ]);
        region.state_mut().follow(ids[1], ids[0], 100, 5000);
        region.advance_by(250);
        let hound = region.state().world.get_entity(ids[1]).unwrap();
        assert_eq!(hound.movement, Movement::Idle);
        assert_eq!(hound.position, Point::flat(0, 0));
    }
}
