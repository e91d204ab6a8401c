use std::sync::Arc;

use rand::Rng;
use vigil_core::{Entity, EntityId, Point};

use crate::ambient::AmbientTrigger;
use crate::combat::CastOutcome;
use crate::error::AiResult;
use crate::event::RegionEventKind;
use crate::notify::Notification;
use crate::state::{AiScheduler, RegionWorld, WorldContext};

/// Follow-up a brain asks of the registry once it has been put back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrainRequest {
    /// Release this pet from its owner.
    Release,
    /// End the crowd control on this body.
    EndCrowdControl,
}

/// What a brain sees while it thinks or handles a notification: its body,
/// the region state, and a scheduler.
///
/// The brain itself is out of the registry for the duration, so anything
/// sent back to this same body is dropped.
pub struct BrainContext<'a> {
    /// The body being driven.
    pub body: EntityId,
    /// Region state.
    pub state: &'a mut RegionWorld,
    /// Scheduler for follow-up actions.
    pub timers: AiScheduler<'a>,
    requests: Vec<BrainRequest>,
}

impl<'a> BrainContext<'a> {
    pub(crate) fn new(body: EntityId, state: &'a mut RegionWorld, timers: AiScheduler<'a>) -> Self {
        Self {
            body,
            state,
            timers,
            requests: Vec::new(),
        }
    }

    /// Ask the registry for a follow-up after this call returns.
    pub fn request(&mut self, request: BrainRequest) {
        if !self.requests.contains(&request) {
            self.requests.push(request);
        }
    }

    pub(crate) fn take_requests(&mut self) -> Vec<BrainRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.timers.now()
    }

    /// The server-wide collaborators.
    pub fn shared(&self) -> Arc<WorldContext> {
        Arc::clone(self.state.context())
    }

    /// The body's entity.
    pub fn me(&self) -> Option<&Entity> {
        self.state.world.get_entity(self.body)
    }

    /// The body's entity, mutably.
    pub fn me_mut(&mut self) -> Option<&mut Entity> {
        self.state.world.get_entity_mut(self.body)
    }

    /// Any entity in the region.
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.state.world.get_entity(id)
    }

    /// True while the body is alive.
    pub fn is_alive(&self) -> bool {
        self.me().is_some_and(Entity::is_alive)
    }

    /// Distance from the body to `other`.
    pub fn distance_to(&self, other: EntityId) -> Option<u32> {
        self.state.world.distance_between(self.body, other)
    }

    /// The body's current melee target.
    pub fn attacking(&self) -> Option<EntityId> {
        self.me().and_then(|me| me.attack_target)
    }

    /// Record an event at the current time.
    pub fn emit(&mut self, kind: RegionEventKind, description: impl Into<String>) {
        let now = self.now();
        self.state.emit(now, kind, description);
    }

    /// Roll a percent chance on the region's generator.
    pub fn roll(&mut self, chance: u8) -> bool {
        match chance {
            0 => false,
            100.. => true,
            c => self.state.rng.random_range(0..100u8) < c,
        }
    }

    /// Maybe speak an ambient line.
    pub fn fire_ambient(&mut self, trigger: AmbientTrigger, target: Option<EntityId>) -> Option<String> {
        let now = self.now();
        self.state.fire_ambient(now, self.body, trigger, target)
    }

    /// Tell another body's brain about something.
    pub fn deliver(&mut self, to: EntityId, note: Notification) {
        self.state.deliver(&mut self.timers, to, note);
    }

    // -- Combat and movement ------------------------------------------------

    /// Start swinging at `target`.
    pub fn start_attack(&mut self, target: EntityId) -> AiResult<()> {
        self.state.start_attack(&mut self.timers, self.body, target)
    }

    /// Stop swinging.
    pub fn stop_attack(&mut self) {
        let now = self.now();
        self.state.stop_attack(now, self.body);
    }

    /// Begin casting `spell` on `target`.
    pub fn cast(&mut self, target: EntityId, spell: &str) -> AiResult<CastOutcome> {
        self.state.cast_spell(&mut self.timers, self.body, target, spell)
    }

    /// Walk to a point.
    pub fn walk_to(&mut self, point: Point) {
        self.state.walk_to(self.body, point);
    }

    /// Keep between `min` and `max` of `target`.
    pub fn follow(&mut self, target: EntityId, min: u32, max: u32) {
        self.state.follow(self.body, target, min, max);
    }

    /// Stand still.
    pub fn stop_moving(&mut self) {
        self.state.stop_moving(self.body);
    }
}
