use std::any::Any;

use tracing::debug;
use vigil_core::{EntityId, Movement, Point};

use super::{
    AggressionState, AttackPolicy, Brain, BrainKind, Perception, PetCommand, PetCommands, WalkState,
    add_threat, engage, perceive, prune_aggro, target_valid,
};
use crate::aggro::AggroTable;
use crate::config::AiConfig;
use crate::context::{BrainContext, BrainRequest};
use crate::error::AiResult;
use crate::notify::Notification;

/// Brain of a pet that takes orders from its owner.
///
/// Follows the owner by default, defends it, and attacks whatever it is told
/// to. An aggressive pet also picks fights on its own within the pet aggro
/// distance.
#[derive(Debug, Clone)]
pub struct ControlledBrain {
    owner: EntityId,
    aggro: AggroTable,
    aggression: AggressionState,
    walk: WalkState,
    follow_target: EntityId,
    ordered_target: Option<EntityId>,
    hold_point: Option<Point>,
    policy: AttackPolicy,
    avoid: Option<EntityId>,
}

impl ControlledBrain {
    /// A defensive pet following `owner`.
    pub fn new(owner: EntityId) -> Self {
        Self {
            owner,
            aggro: AggroTable::new(),
            aggression: AggressionState::Defensive,
            walk: WalkState::Follow,
            follow_target: owner,
            ordered_target: None,
            hold_point: None,
            policy: AttackPolicy::Melee,
            avoid: None,
        }
    }

    /// Start in `aggression` instead of defensive.
    pub fn with_aggression(mut self, aggression: AggressionState) -> Self {
        self.aggression = aggression;
        self
    }

    /// Turn targets into actions with `policy`.
    pub fn with_policy(mut self, policy: AttackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Target the owner last ordered an attack on.
    pub fn ordered_target(&self) -> Option<EntityId> {
        self.ordered_target
    }

    /// Current attack policy.
    pub fn policy(&self) -> AttackPolicy {
        self.policy
    }

    pub(crate) fn set_policy(&mut self, policy: AttackPolicy) {
        self.policy = policy;
    }

    pub(crate) fn set_avoid(&mut self, target: Option<EntityId>) {
        self.avoid = target;
    }

    pub(crate) fn force_passive_follow(&mut self) {
        self.aggression = AggressionState::Passive;
        self.walk = WalkState::Follow;
        self.follow_target = self.owner;
        self.ordered_target = None;
        self.hold_point = None;
        self.aggro.clear();
    }

    fn owner_lost(&self, ctx: &BrainContext<'_>) -> bool {
        let reach = ctx.state.config().max_owner_follow_distance;
        !ctx.state.world.is_present(self.owner)
            || ctx
                .state
                .world
                .distance_between(ctx.body, self.owner)
                .is_none_or(|d| d > reach)
    }

    fn pickable(ctx: &BrainContext<'_>, target: EntityId, range: u32) -> bool {
        target_valid(ctx, target, range) && ctx.entity(target).is_some_and(|t| !t.crowd_controlled)
    }

    /// Fight the ordered target, else the most wanted one. A target being
    /// avoided is only picked when nothing else is left. Returns true if
    /// there was something to fight.
    pub(crate) fn attack_most_wanted(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<bool> {
        if self.aggression == AggressionState::Passive {
            return Ok(false);
        }
        let range = ctx.state.config().max_aggro_distance;
        if let Some(ordered) = self.ordered_target
            && !Self::pickable(ctx, ordered, range)
        {
            self.ordered_target = None;
        }
        let avoid = self.avoid;
        let view: &BrainContext<'_> = ctx;
        let target = self
            .ordered_target
            .or_else(|| {
                self.aggro
                    .most_wanted_by(|id| Some(id) != avoid && Self::pickable(view, id, range))
            })
            .or_else(|| avoid.filter(|&id| self.aggro.contains(id) && Self::pickable(view, id, range)));
        if target.is_some() && target == avoid {
            self.avoid = None;
        }
        match target {
            Some(target) => {
                engage(ctx, target, self.policy)?;
                Ok(true)
            }
            None => {
                ctx.stop_attack();
                Ok(false)
            }
        }
    }

    fn resume_walk(&self, ctx: &mut BrainContext<'_>) {
        let Some(me) = ctx.me() else { return };
        let (movement, position) = (me.movement, me.position);
        match self.walk {
            WalkState::Follow => {
                let following = matches!(movement, Movement::Follow { target, .. } if target == self.follow_target);
                if !following {
                    let config = ctx.state.config();
                    let (min, max) = (config.min_owner_follow_distance, config.max_owner_follow_distance);
                    ctx.follow(self.follow_target, min, max);
                }
            }
            WalkState::Stay | WalkState::ComeHere | WalkState::GoTo => {
                if let Some(point) = self.hold_point
                    && position != point
                    && movement == Movement::Idle
                {
                    ctx.walk_to(point);
                }
            }
        }
    }

    fn halt(&mut self, ctx: &mut BrainContext<'_>) {
        self.ordered_target = None;
        ctx.stop_attack();
    }
}

impl PetCommands for ControlledBrain {
    fn owner(&self) -> EntityId {
        self.owner
    }

    fn command(&mut self, ctx: &mut BrainContext<'_>, command: PetCommand) -> AiResult<()> {
        debug!(region = %ctx.state.region(), pet = %ctx.body, ?command, "pet_command");
        match command {
            PetCommand::Attack(target) => {
                let hostile = match (ctx.me(), ctx.entity(target)) {
                    (Some(me), Some(them)) => ctx.state.context().rules.is_hostile(me, them),
                    _ => false,
                };
                if !hostile {
                    return Ok(());
                }
                if self.aggression == AggressionState::Passive {
                    self.aggression = AggressionState::Defensive;
                }
                self.avoid = None;
                self.ordered_target = Some(target);
                if !self.aggro.contains(target) {
                    add_threat(ctx, &mut self.aggro, target, 1);
                }
                self.attack_most_wanted(ctx)?;
            }
            PetCommand::Follow(target) => {
                self.halt(ctx);
                self.walk = WalkState::Follow;
                self.follow_target = target;
                self.hold_point = None;
                self.resume_walk(ctx);
            }
            PetCommand::Stay => {
                self.halt(ctx);
                self.walk = WalkState::Stay;
                self.hold_point = ctx.me().map(|me| me.position);
                ctx.stop_moving();
            }
            PetCommand::ComeHere => {
                self.halt(ctx);
                self.walk = WalkState::ComeHere;
                self.hold_point = ctx.entity(self.owner).map(|owner| owner.position);
                if let Some(point) = self.hold_point {
                    ctx.walk_to(point);
                }
            }
            PetCommand::Goto(point) => {
                self.halt(ctx);
                self.walk = WalkState::GoTo;
                self.hold_point = Some(point);
                ctx.walk_to(point);
            }
            PetCommand::SetAggression(state) => {
                self.aggression = state;
                if state == AggressionState::Passive {
                    self.aggro.clear();
                    self.halt(ctx);
                    self.resume_walk(ctx);
                }
            }
        }
        Ok(())
    }
}

impl Brain for ControlledBrain {
    fn kind(&self) -> BrainKind {
        BrainKind::ControlledPet
    }

    fn think_interval(&self, config: &AiConfig) -> u64 {
        config.pet_think_interval_ms
    }

    fn think(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        if self.owner_lost(ctx) {
            debug!(region = %ctx.state.region(), pet = %ctx.body, owner = %self.owner, "pet_lost_owner");
            ctx.request(BrainRequest::Release);
            return Ok(());
        }
        if ctx.me().is_some_and(|me| me.crowd_controlled) {
            return Ok(());
        }

        prune_aggro(ctx, &mut self.aggro);
        if self.aggression == AggressionState::Aggressive && ctx.attacking().is_none() {
            let config = ctx.state.config();
            let perception = Perception {
                range: config.max_pet_aggro_distance.min(config.max_aggro_distance),
                aggro_level: 100,
                owner: Some(self.owner),
            };
            perceive(ctx, &mut self.aggro, perception);
        }
        if !self.attack_most_wanted(ctx)? {
            self.resume_walk(ctx);
        }
        Ok(())
    }

    fn notify(&mut self, ctx: &mut BrainContext<'_>, note: &Notification) -> AiResult<()> {
        match *note {
            Notification::Attacked { attacker, damage } | Notification::OwnerAttacked { attacker, damage } => {
                if self.aggression == AggressionState::Passive {
                    return Ok(());
                }
                add_threat(ctx, &mut self.aggro, attacker, i64::from(damage.max(1)));
                if ctx.attacking().is_none() {
                    self.attack_most_wanted(ctx)?;
                }
            }
            Notification::EnemyHealed { healer, target, amount } => {
                if self.aggro.contains(target) && self.aggression != AggressionState::Passive {
                    add_threat(ctx, &mut self.aggro, healer, i64::from(amount.max(1)));
                }
            }
            Notification::EnemyKilled { target } => {
                self.aggro.remove(target);
                if self.ordered_target == Some(target) {
                    self.ordered_target = None;
                }
                if self.avoid == Some(target) {
                    self.avoid = None;
                }
                if !self.attack_most_wanted(ctx)? {
                    self.resume_walk(ctx);
                }
            }
            Notification::Dying { .. } => {
                self.aggro.clear();
                self.halt(ctx);
            }
            Notification::FollowLostTarget { target } => {
                if target == self.owner {
                    ctx.request(BrainRequest::Release);
                } else if !self.attack_most_wanted(ctx)? {
                    self.resume_walk(ctx);
                }
            }
            Notification::CalledForHelp { .. } | Notification::CastFailed { .. } => {}
        }
        Ok(())
    }

    fn aggression_state(&self) -> AggressionState {
        self.aggression
    }

    fn walk_state(&self) -> Option<WalkState> {
        Some(self.walk)
    }

    fn aggro(&self) -> Option<&AggroTable> {
        Some(&self.aggro)
    }

    fn aggro_mut(&mut self) -> Option<&mut AggroTable> {
        Some(&mut self.aggro)
    }

    fn on_attach(&mut self, ctx: &mut BrainContext<'_>) -> AiResult<()> {
        self.resume_walk(ctx);
        Ok(())
    }

    fn on_detach(&mut self, ctx: &mut BrainContext<'_>) {
        ctx.stop_attack();
        ctx.stop_moving();
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
