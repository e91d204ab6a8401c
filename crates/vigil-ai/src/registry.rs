use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};
use vigil_core::{EntityId, Movement};
use vigil_sched::{ActionHandle, ActionResult, EntityTimer};

use crate::ambient::AmbientTrigger;
use crate::brain::crowd::{CrowdControl, CrowdControlBrain};
use crate::brain::{Brain, BrainKind, PetCommand};
use crate::context::{BrainContext, BrainRequest};
use crate::error::{AiError, AiResult};
use crate::event::RegionEventKind;
use crate::notify::Notification;
use crate::state::{AiFire, AiScheduler, RegionWorld};

struct BrainSlot {
    /// `None` while the brain is out running.
    brain: Option<Box<dyn Brain>>,
    think: Option<ActionHandle>,
    generation: u64,
    kind: BrainKind,
}

/// Brains attached to the bodies of one region.
///
/// A body holds at most one brain. The slot stays put while its brain runs,
/// so a lookup during that time sees the body as busy rather than brainless.
#[derive(Default)]
pub struct BrainRegistry {
    slots: HashMap<EntityId, BrainSlot>,
    next_generation: u64,
}

impl fmt::Debug for BrainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrainRegistry")
            .field("brains", &self.slots.len())
            .finish()
    }
}

impl BrainRegistry {
    /// Brain of `body`, unless it has none or is running.
    pub fn get(&self, body: EntityId) -> Option<&dyn Brain> {
        self.slots.get(&body)?.brain.as_deref()
    }

    /// Mutable brain of `body`, unless it has none or is running.
    pub fn get_mut(&mut self, body: EntityId) -> Option<&mut (dyn Brain + 'static)> {
        self.slots.get_mut(&body)?.brain.as_deref_mut()
    }

    /// Number of attached brains.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no body has a brain.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True if `body` has a brain, running or not.
    pub fn contains(&self, body: EntityId) -> bool {
        self.slots.contains_key(&body)
    }

    /// Every body with a brain, in attach order.
    pub fn bodies(&self) -> Vec<EntityId> {
        let mut bodies: Vec<(u64, EntityId)> = self.slots.iter().map(|(body, slot)| (slot.generation, *body)).collect();
        bodies.sort_unstable_by_key(|&(generation, _)| generation);
        bodies.into_iter().map(|(_, body)| body).collect()
    }

    /// Variant attached to `body`.
    pub fn kind_of(&self, body: EntityId) -> Option<BrainKind> {
        self.slots.get(&body).map(|slot| slot.kind)
    }

    /// True while `body`'s brain is running.
    pub fn is_busy(&self, body: EntityId) -> bool {
        self.slots.get(&body).is_some_and(|slot| slot.brain.is_none())
    }

    /// Attach counter of `body`'s current brain.
    pub fn generation(&self, body: EntityId) -> Option<u64> {
        self.slots.get(&body).map(|slot| slot.generation)
    }

    /// Think action of `body`'s current brain.
    pub fn think_handle(&self, body: EntityId) -> Option<&ActionHandle> {
        self.slots.get(&body)?.think.as_ref()
    }

    /// Bodies whose brains hold threat on `target`, in attach order.
    pub fn bodies_with_threat_on(&self, target: EntityId) -> Vec<EntityId> {
        let mut found: Vec<(u64, EntityId)> = self
            .slots
            .iter()
            .filter(|(_, slot)| {
                slot.brain
                    .as_ref()
                    .and_then(|brain| brain.aggro())
                    .is_some_and(|table| table.contains(target))
            })
            .map(|(body, slot)| (slot.generation, *body))
            .collect();
        found.sort_unstable_by_key(|&(generation, _)| generation);
        found.into_iter().map(|(_, body)| body).collect()
    }

    fn insert(&mut self, body: EntityId, brain: Box<dyn Brain>) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.slots.insert(
            body,
            BrainSlot {
                kind: brain.kind(),
                brain: Some(brain),
                think: None,
                generation,
            },
        );
        generation
    }

    fn take(&mut self, body: EntityId) -> AiResult<Box<dyn Brain>> {
        let slot = self.slots.get_mut(&body).ok_or(AiError::NoBrain(body))?;
        slot.brain.take().ok_or(AiError::BrainBusy(body))
    }

    fn restore(&mut self, body: EntityId, brain: Box<dyn Brain>) {
        if let Some(slot) = self.slots.get_mut(&body) {
            slot.brain = Some(brain);
        }
    }

    fn remove(&mut self, body: EntityId) -> AiResult<(Box<dyn Brain>, Option<ActionHandle>)> {
        if self.is_busy(body) {
            return Err(AiError::BrainBusy(body));
        }
        let slot = self.slots.remove(&body).ok_or(AiError::NoBrain(body))?;
        let brain = slot.brain.ok_or(AiError::BrainBusy(body))?;
        Ok((brain, slot.think))
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl RegionWorld {
    /// Attach `brain` to `body` and start its think cycle one interval from
    /// now.
    pub fn attach_brain(
        &mut self,
        timers: &mut AiScheduler<'_>,
        body: EntityId,
        brain: Box<dyn Brain>,
    ) -> AiResult<()> {
        self.try_attach(timers, body, brain).map_err(|(err, _)| err)
    }

    /// Attach, handing `brain` back with the error if it could not be
    /// attached.
    fn try_attach(
        &mut self,
        timers: &mut AiScheduler<'_>,
        body: EntityId,
        brain: Box<dyn Brain>,
    ) -> Result<(), (AiError, Option<Box<dyn Brain>>)> {
        if self.world.get_entity(body).is_none() {
            return Err((AiError::BodyNotFound(body), Some(brain)));
        }
        if self.brains.contains(body) {
            return Err((AiError::BrainAttached(body), Some(brain)));
        }

        let kind = brain.kind();
        let generation = self.brains.insert(body, brain);

        let attached = match self.with_brain(timers, body, |brain, ctx| brain.on_attach(ctx)) {
            Ok(result) => result,
            Err(err) => Err(err),
        };
        if let Err(err) = attached {
            let brain = self.brains.slots.remove(&body).and_then(|slot| slot.brain);
            return Err((err, brain));
        }
        let interval = self
            .brains
            .get(body)
            .map_or(1, |brain| brain.think_interval(self.config()))
            .max(1);

        let action = EntityTimer::new(body, "think")
            .every(move |fire: &mut AiFire<'_>, body| think_tick(fire, body, generation));
        let handle = match timers.start(action, interval) {
            Ok(handle) => handle,
            Err(err) => {
                let brain = self.brains.remove(body).ok().map(|(mut brain, _)| {
                    let mut ctx = BrainContext::new(body, self, timers.reborrow());
                    brain.on_detach(&mut ctx);
                    brain
                });
                return Err((err.into(), brain));
            }
        };
        if let Some(slot) = self.brains.slots.get_mut(&body) {
            slot.think = Some(handle);
        }

        let now = timers.now();
        let description = format!("{} is now driven by a {kind} brain", self.name_of(body));
        self.emit(now, RegionEventKind::BrainAttached { body, brain: kind.to_string() }, description);
        debug!(region = %self.region(), body = %body, brain = %kind, interval, "brain_attached");

        self.load_ambient(body);
        self.fire_ambient(now, body, AmbientTrigger::Spawning, None);
        Ok(())
    }

    /// Put `brain` back on `body` after a failed replacement. If it cannot be
    /// attached either, it is parked.
    fn reinstate(&mut self, timers: &mut AiScheduler<'_>, body: EntityId, brain: Box<dyn Brain>) {
        if let Err((err, Some(brain))) = self.try_attach(timers, body, brain) {
            self.park(body, brain, &err);
        }
    }

    /// Keep `brain` on `body` without a think cycle. It still hears
    /// notifications and can be detached or swapped later.
    fn park(&mut self, body: EntityId, brain: Box<dyn Brain>, err: &AiError) {
        warn!(region = %self.region(), body = %body, brain = %brain.kind(), error = %err, "brain_parked");
        if !self.brains.contains(body) {
            self.brains.insert(body, brain);
        }
    }

    /// Detach `body`'s brain. Its think action is stopped before the brain
    /// sees `on_detach`, so no tick can run after this returns.
    pub fn detach_brain(&mut self, timers: &mut AiScheduler<'_>, body: EntityId) -> AiResult<Box<dyn Brain>> {
        let (mut brain, think) = self.brains.remove(body)?;
        if let Some(think) = think {
            think.stop();
        }

        let kind = brain.kind();
        {
            let mut ctx = BrainContext::new(body, self, timers.reborrow());
            brain.on_detach(&mut ctx);
        }

        let now = timers.now();
        let description = format!("{} lost its {kind} brain", self.name_of(body));
        self.emit(now, RegionEventKind::BrainDetached { body, brain: kind.to_string() }, description);
        debug!(region = %self.region(), body = %body, brain = %kind, "brain_detached");
        Ok(brain)
    }

    /// Replace `body`'s brain, returning the old one.
    pub fn swap_brain(
        &mut self,
        timers: &mut AiScheduler<'_>,
        body: EntityId,
        brain: Box<dyn Brain>,
    ) -> AiResult<Box<dyn Brain>> {
        let old = self.detach_brain(timers, body)?;
        match self.try_attach(timers, body, brain) {
            Ok(()) => Ok(old),
            Err((err, _)) => {
                self.reinstate(timers, body, old);
                Err(err)
            }
        }
    }

    /// Run `f` with `body`'s brain taken out of the registry, then put it
    /// back and carry out whatever it requested.
    ///
    /// The brain is put back even if `f` panics; the panic then carries on
    /// to the caller and any requests made so far are dropped.
    pub fn with_brain<R>(
        &mut self,
        timers: &mut AiScheduler<'_>,
        body: EntityId,
        f: impl FnOnce(&mut dyn Brain, &mut BrainContext<'_>) -> R,
    ) -> AiResult<R> {
        let mut brain = self.brains.take(body)?;
        let outcome = {
            let mut ctx = BrainContext::new(body, self, timers.reborrow());
            panic::catch_unwind(AssertUnwindSafe(|| f(brain.as_mut(), &mut ctx)))
                .map(|result| (result, ctx.take_requests()))
        };
        self.brains.restore(body, brain);
        let (result, requests) = match outcome {
            Ok(done) => done,
            Err(payload) => {
                warn!(region = %self.region(), body = %body, "brain_panicked");
                panic::resume_unwind(payload)
            }
        };

        for request in requests {
            let outcome = match request {
                BrainRequest::Release => self.release_pet(timers, body),
                BrainRequest::EndCrowdControl => self.end_crowd_control(timers, body),
            };
            if let Err(err) = outcome {
                warn!(region = %self.region(), body = %body, ?request, error = %err, "brain_request_failed");
            }
        }
        Ok(result)
    }

    /// Hand `note` to `body`'s brain.
    pub fn notify(&mut self, timers: &mut AiScheduler<'_>, body: EntityId, note: Notification) -> AiResult<()> {
        self.with_brain(timers, body, |brain, ctx| brain.notify(ctx, &note))?
    }

    /// Give an order to the pet `pet`.
    pub fn command_pet(&mut self, timers: &mut AiScheduler<'_>, pet: EntityId, command: PetCommand) -> AiResult<()> {
        self.with_brain(timers, pet, |brain, ctx| match brain.as_pet() {
            Some(commands) => commands.command(ctx, command),
            None => Err(AiError::NotAPet(pet)),
        })?
    }

    /// Put `body` under fear or mesmerize for `duration_ms`. A body already
    /// under crowd control has its effect replaced and its timer extended.
    pub fn apply_crowd_control(
        &mut self,
        timers: &mut AiScheduler<'_>,
        body: EntityId,
        effect: CrowdControl,
        duration_ms: u64,
    ) -> AiResult<()> {
        if self.brains.kind_of(body) == Some(BrainKind::CrowdControl) {
            return self.with_brain(timers, body, |brain, ctx| {
                match brain.as_any_mut().downcast_mut::<CrowdControlBrain>() {
                    Some(cc) => cc.extend(ctx, effect, duration_ms),
                    None => Err(AiError::NotCrowdControlled(ctx.body)),
                }
            })?;
        }
        let prior = match self.detach_brain(timers, body) {
            Ok(prior) => Some(prior),
            Err(AiError::NoBrain(_)) => None,
            Err(err) => return Err(err),
        };
        let brain = CrowdControlBrain::new(effect, duration_ms, prior);
        self.attach_brain(timers, body, Box::new(brain))
    }

    /// End the crowd control on `body` and reattach the brain it replaced.
    pub fn end_crowd_control(&mut self, timers: &mut AiScheduler<'_>, body: EntityId) -> AiResult<()> {
        if self.brains.kind_of(body) != Some(BrainKind::CrowdControl) {
            return Err(AiError::NotCrowdControlled(body));
        }
        let cc = self.detach_brain(timers, body)?;
        let Some(prior) = cc.into_prior() else {
            return Ok(());
        };
        match self.try_attach(timers, body, prior) {
            Ok(()) => Ok(()),
            Err((err, prior)) => {
                if let Some(prior) = prior {
                    self.park(body, prior, &err);
                }
                Err(err)
            }
        }
    }

    /// Cut `pet` loose from its owner. It keeps no brain afterwards.
    pub fn release_pet(&mut self, timers: &mut AiScheduler<'_>, pet: EntityId) -> AiResult<()> {
        let owner = self
            .world
            .get_entity(pet)
            .ok_or(AiError::BodyNotFound(pet))?
            .owner
            .ok_or(AiError::NotAPet(pet))?;

        let now = timers.now();
        let description = format!("{} is released by {}", self.name_of(pet), self.name_of(owner));
        self.emit(now, RegionEventKind::PetReleased { pet, owner }, description);

        match self.detach_brain(timers, pet) {
            Ok(_) | Err(AiError::NoBrain(_)) => {}
            Err(err) => return Err(err),
        }
        self.stop_attack(now, pet);
        self.interrupt_cast(pet);
        if let Some(entity) = self.world.get_entity_mut(pet) {
            entity.owner = None;
            entity.movement = Movement::Idle;
        }
        debug!(region = %self.region(), pet = %pet, owner = %owner, "pet_released");
        Ok(())
    }

    /// Detach any brain and take `body` out of the region.
    pub fn remove_body(&mut self, timers: &mut AiScheduler<'_>, body: EntityId) -> AiResult<()> {
        match self.detach_brain(timers, body) {
            Ok(_) | Err(AiError::NoBrain(_)) => {}
            Err(err) => return Err(err),
        }
        self.stop_attack(timers.now(), body);
        self.interrupt_cast(body);
        self.ambient.remove(&body);
        self.world.remove_entity(body)?;
        Ok(())
    }
}

fn think_tick(fire: &mut AiFire<'_>, body: EntityId, generation: u64) -> ActionResult<i64> {
    let state = &mut *fire.state;
    if state.brains.generation(body) != Some(generation) {
        return Ok(0);
    }
    let interval = state.with_brain(&mut fire.timers, body, |brain, ctx| {
        let interval = brain.think_interval(ctx.state.config()).max(1);
        if !ctx.is_alive() || !ctx.state.world.is_present(ctx.body) {
            return Ok(interval);
        }
        brain.think(ctx).map(|()| interval)
    })??;
    Ok(i64::try_from(interval).unwrap_or(i64::MAX))
}
