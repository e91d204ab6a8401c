use std::fmt;

use vigil_core::EntityId;

/// Why a spell did not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastFailure {
    /// The target moved out of the spell's range.
    OutOfRange,
    /// The target died or left the region.
    TargetGone,
    /// The caster was crowd controlled or stopped casting.
    Interrupted,
}

impl fmt::Display for CastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => f.write_str("out of range"),
            Self::TargetGone => f.write_str("target gone"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Push-style events delivered to a body's brain outside its think cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The body was hit (or swung at, with zero damage).
    Attacked {
        /// Who attacked.
        attacker: EntityId,
        /// Damage taken.
        damage: u32,
    },
    /// The body's owner was attacked.
    OwnerAttacked {
        /// Who attacked the owner.
        attacker: EntityId,
        /// Damage the owner took.
        damage: u32,
    },
    /// A same-faction neighbour asks for help against `attacker`.
    CalledForHelp {
        /// The enemy to join against.
        attacker: EntityId,
    },
    /// The body died.
    Dying {
        /// Who dealt the killing blow.
        killer: Option<EntityId>,
    },
    /// The body killed `target`.
    EnemyKilled {
        /// The dead enemy.
        target: EntityId,
    },
    /// Someone healed a body this brain has threat on.
    EnemyHealed {
        /// The healer.
        healer: EntityId,
        /// The healed body.
        target: EntityId,
        /// Health restored.
        amount: u32,
    },
    /// A spell cast by the body failed.
    CastFailed {
        /// The intended target.
        target: EntityId,
        /// Why it failed.
        reason: CastFailure,
    },
    /// The body could no longer keep up with what it was following.
    FollowLostTarget {
        /// The entity that was being followed.
        target: EntityId,
    },
}

impl Notification {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Attacked { .. } => "attacked",
            Self::OwnerAttacked { .. } => "owner_attacked",
            Self::CalledForHelp { .. } => "called_for_help",
            Self::Dying { .. } => "dying",
            Self::EnemyKilled { .. } => "enemy_killed",
            Self::EnemyHealed { .. } => "enemy_healed",
            Self::CastFailed { .. } => "cast_failed",
            Self::FollowLostTarget { .. } => "follow_lost_target",
        }
    }
}
