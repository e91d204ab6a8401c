use std::any::Any;

use tracing::debug;
use vigil_core::EntityId;

use super::{AggressionState, AttackPolicy, Brain, BrainKind, ControlledBrain, PetCommand, PetCommands, WalkState};
use crate::aggro::AggroTable;
use crate::config::AiConfig;
use crate::context::BrainContext;
use crate::error::AiResult;
use crate::notify::Notification;

/// Brain of a pet that fights with spells.
///
/// Casts at range while it can and melees otherwise. After taking a direct
/// hit it gives up on casting for good. A failed cast makes it look for a
/// different target.
#[derive(Debug, Clone)]
pub struct CasterBrain {
    inner: ControlledBrain,
    in_melee: bool,
}

impl CasterBrain {
    /// A defensive caster pet of `owner`.
    pub fn new(owner: EntityId) -> Self {
        Self {
            inner: ControlledBrain::new(owner).with_policy(AttackPolicy::SpellsPreferred),
            in_melee: false,
        }
    }

    /// Start in `aggression` instead of defensive.
    pub fn with_aggression(mut self, aggression: AggressionState) -> Self {
        self.inner = self.inner.with_aggression(aggression);
        self
    }

    /// True once the pet has switched to melee.
    pub fn in_melee(&self) -> bool {
        self.in_melee
    }
}

impl PetCommands for CasterBrain {
    fn owner(&self) -> EntityId {
        self.inner.owner()
    }

    fn command(&mut self, ctx: &mut BrainContext<'_>, command: PetCommand) -> AiResult<()> {
        if matches!(command, PetCommand::Attack(_)) {
            self.inner.set_avoid(None);
        }
        self.inner.command(ctx, command)
    }
}

impl Brain for CasterBrain {
    fn kind(&self) -> BrainKind {
        BrainKind::CasterPet
    }

    fn think_interval(&self, config: &AiConfig) -> u64 {
        self.inner.think_interval(config)
    }

    fn think(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        self.inner.think(ctx)
    }

    fn notify(&mut self, ctx: &mut BrainContext<'_>, note: &Notification) -> AiResult<()> {
        match *note {
            Notification::Attacked { damage, .. } if damage > 0 && !self.in_melee => {
                debug!(region = %ctx.state.region(), pet = %ctx.body, "caster_switched_to_melee");
                self.in_melee = true;
                self.inner.set_policy(AttackPolicy::Melee);
                self.inner.notify(ctx, note)
            }
            Notification::CastFailed { target, reason } => {
                debug!(region = %ctx.state.region(), pet = %ctx.body, target = %target, %reason, "caster_retargeting");
                self.inner.set_avoid(Some(target));
                self.inner.attack_most_wanted(ctx).map(|_| ())
            }
            _ => self.inner.notify(ctx, note),
        }
    }

    fn aggression_state(&self) -> AggressionState {
        self.inner.aggression_state()
    }

    fn walk_state(&self) -> Option<WalkState> {
        self.inner.walk_state()
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
