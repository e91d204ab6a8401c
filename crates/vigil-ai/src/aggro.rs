use vigil_core::EntityId;

/// Accumulated threat per target, in insertion order.
///
/// Values never go negative; a decrease past zero leaves the entry at zero
/// so the target keeps its place for tie-breaking. Owned by exactly one
/// brain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggroTable {
    entries: Vec<(EntityId, u64)>,
}

impl AggroTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` threat for `target`; negative amounts lower it, clamped
    /// at zero. Returns true if the target was not in the table before.
    pub fn add(&mut self, target: EntityId, amount: i64) -> bool {
        match self.entries.iter_mut().find(|(id, _)| *id == target) {
            Some((_, threat)) => {
                *threat = apply(*threat, amount);
                false
            }
            None => {
                self.entries.push((target, apply(0, amount)));
                true
            }
        }
    }

    /// Current threat of `target`, if present.
    pub fn threat(&self, target: EntityId) -> Option<u64> {
        self.entries
            .iter()
            .find(|(id, _)| *id == target)
            .map(|(_, threat)| *threat)
    }

    /// True if `target` has an entry.
    pub fn contains(&self, target: EntityId) -> bool {
        self.entries.iter().any(|(id, _)| *id == target)
    }

    /// Drop `target`, returning its threat.
    pub fn remove(&mut self, target: EntityId) -> Option<u64> {
        let index = self.entries.iter().position(|(id, _)| *id == target)?;
        Some(self.entries.remove(index).1)
    }

    /// Forget every target.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no target has threat.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, u64)> + '_ {
        self.entries.iter().copied()
    }

    /// Highest-threat entry, earliest inserted on ties.
    pub fn most_wanted(&self) -> Option<EntityId> {
        self.most_wanted_by(|_| true)
    }

    /// Highest-threat entry among those `valid` accepts, earliest inserted on
    /// ties.
    pub fn most_wanted_by(&self, mut valid: impl FnMut(EntityId) -> bool) -> Option<EntityId> {
        let mut best: Option<(EntityId, u64)> = None;
        for &(id, threat) in &self.entries {
            if best.is_some_and(|(_, top)| threat <= top) {
                continue;
            }
            if valid(id) {
                best = Some((id, threat));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Drop every entry `keep` rejects. Returns the removed targets.
    pub fn prune(&mut self, mut keep: impl FnMut(EntityId) -> bool) -> Vec<EntityId> {
        let mut removed = Vec::new();
        self.entries.retain(|&(id, _)| {
            let kept = keep(id);
            if !kept {
                removed.push(id);
            }
            kept
        });
        removed
    }
}

fn apply(threat: u64, amount: i64) -> u64 {
    if amount >= 0 {
        threat.saturating_add(amount as u64)
    } else {
        threat.saturating_sub(amount.unsigned_abs())
    }
}
