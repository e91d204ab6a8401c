use vigil_core::EntityId;

use crate::ambient::Voice;

/// What kind of region event occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionEventKind {
    // Brains
    /// A brain started ticking on a body.
    BrainAttached {
        /// The body.
        body: EntityId,
        /// Name of the brain variant.
        brain: String,
    },
    /// A brain stopped ticking on a body.
    BrainDetached {
        /// The body.
        body: EntityId,
        /// Name of the brain variant.
        brain: String,
    },
    /// A pet was released from its owner.
    PetReleased {
        /// The pet.
        pet: EntityId,
        /// The former owner.
        owner: EntityId,
    },

    // Threat
    /// A target entered a brain's threat table.
    AggroGained {
        /// The body whose brain holds the table.
        body: EntityId,
        /// The new target.
        target: EntityId,
        /// Initial threat.
        threat: u64,
    },

    // Combat
    /// A body began swinging at a target.
    AttackStarted {
        /// The attacker.
        attacker: EntityId,
        /// The target.
        target: EntityId,
    },
    /// A body stopped attacking.
    AttackStopped {
        /// The attacker.
        attacker: EntityId,
    },
    /// A swing or spell landed.
    Hit {
        /// Source of the damage.
        attacker: EntityId,
        /// Recipient of the damage.
        target: EntityId,
        /// Damage dealt.
        damage: u32,
    },
    /// A target was healed.
    Healed {
        /// The healer.
        healer: EntityId,
        /// The healed body.
        target: EntityId,
        /// Health restored.
        amount: u32,
    },
    /// A living body died.
    Killed {
        /// The killer.
        killer: EntityId,
        /// The body that died.
        victim: EntityId,
    },
    /// A spell cast began.
    SpellCast {
        /// The caster.
        caster: EntityId,
        /// The target.
        target: EntityId,
        /// Spell name.
        spell: String,
    },
    /// A spell cast could not complete.
    CastFailed {
        /// The caster.
        caster: EntityId,
        /// The intended target.
        target: EntityId,
        /// Why it failed.
        reason: String,
    },

    // Crowd control
    /// A crowd-control effect took over a body's brain.
    CrowdControlStarted {
        /// The affected body.
        body: EntityId,
        /// Effect name.
        effect: String,
    },
    /// A crowd-control effect ended and the prior brain resumed.
    CrowdControlEnded {
        /// The affected body.
        body: EntityId,
    },

    // Ambient
    /// A body spoke an ambient line.
    Ambient {
        /// The speaker.
        body: EntityId,
        /// How the line was delivered.
        voice: Voice,
        /// Rendered text.
        text: String,
    },
}

impl RegionEventKind {
    /// Check whether a given entity is involved in this event.
    pub fn involves(&self, id: EntityId) -> bool {
        match self {
            Self::BrainAttached { body, .. }
            | Self::BrainDetached { body, .. }
            | Self::CrowdControlStarted { body, .. }
            | Self::CrowdControlEnded { body }
            | Self::Ambient { body, .. } => *body == id,
            Self::AttackStopped { attacker } => *attacker == id,
            Self::PetReleased { pet, owner } => *pet == id || *owner == id,
            Self::AggroGained { body, target, .. } => *body == id || *target == id,
            Self::AttackStarted { attacker, target } | Self::Hit { attacker, target, .. } => {
                *attacker == id || *target == id
            }
            Self::Healed { healer, target, .. } => *healer == id || *target == id,
            Self::Killed { killer, victim } => *killer == id || *victim == id,
            Self::SpellCast { caster, target, .. } | Self::CastFailed { caster, target, .. } => {
                *caster == id || *target == id
            }
        }
    }
}

/// A record of something that happened in a region.
#[derive(Debug, Clone)]
pub struct RegionEvent {
    /// Region time when this event occurred.
    pub at: u64,
    /// The specific kind of event that occurred.
    pub kind: RegionEventKind,
    /// A human-readable description of the event.
    pub description: String,
}

impl RegionEvent {
    /// Create a new event.
    pub fn new(at: u64, kind: RegionEventKind, description: impl Into<String>) -> Self {
        Self {
            at,
            kind,
            description: description.into(),
        }
    }
}

/// Bounded record of a region's events.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<RegionEvent>,
    max_events: usize,
}

impl EventLog {
    /// Create a new event log with the given maximum capacity (0 = unlimited).
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            max_events,
        }
    }

    /// Append an event, dropping the oldest events if the log exceeds its capacity.
    pub fn push(&mut self, event: RegionEvent) {
        self.events.push(event);
        if self.max_events > 0 && self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(..drain_count);
        }
    }

    /// Return a slice of all recorded events.
    pub fn events(&self) -> &[RegionEvent] {
        &self.events
    }

    /// Return all events involving the given entity.
    pub fn events_for_entity(&self, id: EntityId) -> Vec<&RegionEvent> {
        self.events.iter().filter(|e| e.kind.involves(id)).collect()
    }

    /// Events matching `pred`.
    pub fn filter(&self, mut pred: impl FnMut(&RegionEventKind) -> bool) -> Vec<&RegionEvent> {
        self.events.iter().filter(|e| pred(&e.kind)).collect()
    }

    /// Return the number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Return `true` if no events have been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove all recorded events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped(at: u64, attacker: EntityId) -> RegionEvent {
        RegionEvent::new(at, RegionEventKind::AttackStopped { attacker }, "stop")
    }

    #[test]
    fn event_log_push_and_query() {
        let mut log = EventLog::new(0);
        let (a, b) = (EntityId::new(), EntityId::new());
        log.push(RegionEvent::new(
            5,
            RegionEventKind::Killed {
                killer: a,
                victim: b,
            },
            "a killed b",
        ));
        log.push(stopped(6, a));
        assert_eq!(log.len(), 2);
        assert_eq!(log.events_for_entity(a).len(), 2);
        assert_eq!(log.events_for_entity(b).len(), 1);
        assert_eq!(
            log.filter(|k| matches!(k, RegionEventKind::Killed { .. }))
                .len(),
            1
        );
    }

    #[test]
    fn event_log_max_events_trims_oldest() {
        let mut log = EventLog::new(2);
        let id = EntityId::new();
        for at in 0..5 {
            log.push(stopped(at, id));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.events()[0].at, 3);
        assert_eq!(log.events()[1].at, 4);
        log.clear();
        assert!(log.is_empty());
    }
}
