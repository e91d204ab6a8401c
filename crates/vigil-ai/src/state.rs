use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, warn};
use vigil_core::{EntityId, ObjectState, RegionId, World};
use vigil_sched::{Fire, Presence, Region, Scheduler};

use crate::aggro::AggroTable;
use crate::ambient::{self, AmbientBehaviour, AmbientTrigger};
use crate::cache::BehaviourCache;
use crate::combat::CombatBook;
use crate::config::AiConfig;
use crate::error::{AiError, AiResult};
use crate::event::{EventLog, RegionEvent, RegionEventKind};
use crate::notify::Notification;
use crate::registry::BrainRegistry;
use crate::rules::{CombatRules, StandardRules};

/// A region running brains.
pub type AiRegion = Region<RegionWorld>;
/// Callback context for actions on an [`AiRegion`].
pub type AiFire<'a> = Fire<'a, RegionWorld>;
/// Scheduler handed to anything running on an [`AiRegion`].
pub type AiScheduler<'a> = Scheduler<'a, RegionWorld>;

/// Per-server collaborators shared by every region: tuning, the behaviour
/// cache, and the combat rules.
pub struct WorldContext {
    /// Brain tuning.
    pub config: AiConfig,
    /// Ambient lines by body name.
    pub behaviours: BehaviourCache,
    /// Damage and hostility.
    pub rules: Box<dyn CombatRules>,
}

impl fmt::Debug for WorldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldContext")
            .field("config", &self.config)
            .field("behaviours", &self.behaviours)
            .field("rules", &self.rules)
            .finish()
    }
}

impl WorldContext {
    /// A context from its parts.
    pub fn new(
        config: AiConfig,
        behaviours: BehaviourCache,
        rules: impl CombatRules + 'static,
    ) -> Self {
        Self {
            config,
            behaviours,
            rules: Box::new(rules),
        }
    }

    /// Standard rules and no ambient lines.
    pub fn with_config(config: AiConfig) -> Self {
        Self::new(config, BehaviourCache::empty(), StandardRules::default())
    }
}

impl Default for WorldContext {
    fn default() -> Self {
        Self::with_config(AiConfig::default())
    }
}

/// Everything one region's callbacks operate on.
pub struct RegionWorld {
    /// Bodies in the region.
    pub world: World,
    /// Brains by body.
    pub brains: BrainRegistry,
    /// What happened.
    pub events: EventLog,
    /// Region-local randomness.
    pub rng: StdRng,
    /// Ambient lines loaded per body on attach.
    pub ambient: HashMap<EntityId, Vec<AmbientBehaviour>>,
    /// Swing and cast actions per body.
    pub combat: CombatBook,
    context: Arc<WorldContext>,
}

impl fmt::Debug for RegionWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionWorld")
            .field("region", &self.world.region())
            .field("entities", &self.world.entity_count())
            .field("brains", &self.brains.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// A body waiting to respawn still owns its actions; only removal stops
/// them. Its brain skips thinks until it is active again.
impl Presence for RegionWorld {
    fn is_present(&self, id: EntityId) -> bool {
        self.world
            .get_entity(id)
            .is_some_and(|e| e.state != ObjectState::Deleted)
    }
}

impl RegionWorld {
    /// Wrap `world` for brain-driven simulation.
    pub fn new(world: World, context: Arc<WorldContext>) -> Self {
        let seed = context.config.seed ^ (u64::from(world.region().0) << 32);
        Self {
            events: EventLog::new(context.config.max_events),
            rng: StdRng::seed_from_u64(seed),
            world,
            brains: BrainRegistry::default(),
            ambient: HashMap::new(),
            combat: CombatBook::default(),
            context,
        }
    }

    /// Region identifier.
    pub fn region(&self) -> RegionId {
        self.world.region()
    }

    /// The shared server context.
    pub fn context(&self) -> &Arc<WorldContext> {
        &self.context
    }

    /// Brain tuning.
    pub fn config(&self) -> &AiConfig {
        &self.context.config
    }

    /// Record an event.
    pub fn emit(&mut self, at: u64, kind: RegionEventKind, description: impl Into<String>) {
        self.events.push(RegionEvent::new(at, kind, description));
    }

    /// Display name of `id`.
    pub fn name_of(&self, id: EntityId) -> String {
        self.world.entity_name(id).to_string()
    }

    /// Threat table of `body`'s brain.
    pub fn aggro_of(&self, body: EntityId) -> Option<&AggroTable> {
        self.brains.get(body).and_then(|brain| brain.aggro())
    }

    /// The target `body`'s brain would pick right now.
    pub fn most_wanted(&self, body: EntityId) -> Option<EntityId> {
        let me = self.world.get_entity(body)?;
        let table = self.aggro_of(body)?;
        let max = self.config().max_aggro_distance;
        table.most_wanted_by(|target| {
            self.world
                .get_entity(target)
                .is_some_and(|t| t.is_active() && !t.stealthed && me.position.is_within(t.position, max))
        })
    }

    /// Add threat to `body`'s brain on behalf of an outside collaborator.
    pub fn add_to_aggro(
        &mut self,
        timers: &mut AiScheduler<'_>,
        body: EntityId,
        target: EntityId,
        amount: i64,
    ) -> AiResult<()> {
        self.with_brain(timers, body, |brain, ctx| {
            if let Some(table) = brain.aggro_mut() {
                crate::brain::add_threat(ctx, table, target, amount);
            }
        })
    }

    /// Forget all threat held by `body`'s brain.
    pub fn clear_aggro(&mut self, body: EntityId) -> AiResult<()> {
        if self.brains.is_busy(body) {
            return Err(AiError::BrainBusy(body));
        }
        let brain = self.brains.get_mut(body).ok_or(AiError::NoBrain(body))?;
        if let Some(table) = brain.aggro_mut() {
            table.clear();
        }
        Ok(())
    }

    /// Deliver `note` to `body`'s brain. A body without a brain, or whose
    /// brain is the one currently running, does not hear it.
    pub fn deliver(&mut self, timers: &mut AiScheduler<'_>, body: EntityId, note: Notification) {
        match self.notify(timers, body, note.clone()) {
            Ok(()) | Err(AiError::NoBrain(_)) => {}
            Err(AiError::BrainBusy(_)) => {
                debug!(region = %self.region(), body = %body, note = note.name(), "notification_dropped_busy");
            }
            Err(err) => {
                warn!(region = %self.region(), body = %body, note = note.name(), error = %err, "notification_failed");
            }
        }
    }

    /// Cache the ambient lines for `body` by its name.
    pub(crate) fn load_ambient(&mut self, body: EntityId) {
        let Some(name) = self.world.get_entity(body).map(|e| e.name.clone()) else {
            return;
        };
        match self.context.behaviours.get(&name) {
            Ok(lines) if lines.is_empty() => {
                self.ambient.remove(&body);
            }
            Ok(lines) => {
                self.ambient.insert(body, lines);
            }
            Err(err) => {
                warn!(region = %self.region(), body = %body, name = %name, error = %err, "ambient_load_failed");
            }
        }
    }

    /// Maybe speak an ambient line for `trigger`. Returns the rendered text
    /// if one was spoken.
    pub fn fire_ambient(
        &mut self,
        now: u64,
        body: EntityId,
        trigger: AmbientTrigger,
        target: Option<EntityId>,
    ) -> Option<String> {
        if trigger == AmbientTrigger::Interact && target.is_none() {
            return None;
        }
        let lines = self.ambient.get(&body)?;
        let chosen = ambient::pick(lines, trigger, &mut self.rng)?.clone();

        let speaker = self.world.get_entity(body)?;
        let controller = speaker
            .owner
            .map(|owner| self.world.entity_name(owner).to_string())
            .unwrap_or_default();
        let target_name = target.map(|t| self.world.entity_name(t).to_string());
        let text = chosen.render(&speaker.name, target_name.as_deref(), &controller);
        let voice = chosen.voice();

        let description = format!("{} {voice}: {text}", speaker.name);
        self.emit(
            now,
            RegionEventKind::Ambient {
                body,
                voice,
                text: text.clone(),
            },
            description,
        );
        Some(text)
    }
}
