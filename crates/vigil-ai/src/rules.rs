use std::fmt;

use rand::Rng;
use rand::rngs::StdRng;
use vigil_core::{Entity, Spell};

/// Combat math and allegiance, supplied by the game on top of this crate.
///
/// Brains and the combat command layer ask these questions; they never
/// compute damage or hostility themselves.
pub trait CombatRules: fmt::Debug + Send + Sync {
    /// May `attacker` fight `target` at all.
    fn is_hostile(&self, attacker: &Entity, target: &Entity) -> bool;

    /// `target` is too weak for `observer` to bother with.
    fn is_grey(&self, observer: &Entity, target: &Entity) -> bool;

    /// Damage of one melee swing.
    fn melee_damage(&self, attacker: &Entity, target: &Entity, rng: &mut StdRng) -> u32;

    /// Damage of an offensive spell.
    fn spell_damage(&self, caster: &Entity, target: &Entity, spell: &Spell, rng: &mut StdRng)
    -> u32;

    /// Health restored by a defensive spell.
    fn heal_amount(&self, caster: &Entity, target: &Entity, spell: &Spell) -> u32;
}

/// Faction-based hostility and level-scaled damage.
#[derive(Debug, Clone)]
pub struct StandardRules {
    /// Targets this many levels or more below the observer are grey.
    pub grey_gap: u8,
}

impl Default for StandardRules {
    fn default() -> Self {
        Self { grey_gap: 10 }
    }
}

impl CombatRules for StandardRules {
    fn is_hostile(&self, attacker: &Entity, target: &Entity) -> bool {
        if attacker.id == target.id {
            return false;
        }
        // A pet never turns on its owner, nor an owner on its pet.
        if attacker.owner == Some(target.id) || target.owner == Some(attacker.id) {
            return false;
        }
        attacker.faction != target.faction
    }

    fn is_grey(&self, observer: &Entity, target: &Entity) -> bool {
        u16::from(target.effective_level()) + u16::from(self.grey_gap)
            <= u16::from(observer.effective_level())
    }

    fn melee_damage(&self, attacker: &Entity, _target: &Entity, rng: &mut StdRng) -> u32 {
        let level = u32::from(attacker.effective_level());
        level * 2 + rng.random_range(0..=level)
    }

    fn spell_damage(&self, caster: &Entity, _target: &Entity, spell: &Spell, rng: &mut StdRng) -> u32 {
        let level = u32::from(caster.effective_level());
        spell.power + level + rng.random_range(0..=level / 2)
    }

    fn heal_amount(&self, _caster: &Entity, _target: &Entity, spell: &Spell) -> u32 {
        spell.power
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use vigil_core::Faction;

    #[test]
    fn factions_decide_hostility() {
        let rules = StandardRules::default();
        let wolf = Entity::npc("Wolf", 10).with_faction(Faction(1));
        let other_wolf = Entity::npc("Wolf", 10).with_faction(Faction(1));
        let player = Entity::player("Aldric", 10);
        assert!(rules.is_hostile(&wolf, &player));
        assert!(!rules.is_hostile(&wolf, &other_wolf));
        assert!(!rules.is_hostile(&wolf, &wolf));
    }

    #[test]
    fn pets_and_owners_never_hostile() {
        let rules = StandardRules::default();
        let owner = Entity::player("Mira", 20);
        let pet = Entity::npc("Spirit", 18)
            .with_faction(Faction(9))
            .owned_by(owner.id);
        assert!(!rules.is_hostile(&pet, &owner));
        assert!(!rules.is_hostile(&owner, &pet));
    }

    #[test]
    fn grey_gap() {
        let rules = StandardRules::default();
        let mob = Entity::npc("Ogre", 30);
        assert!(rules.is_grey(&mob, &Entity::player("Low", 20)));
        assert!(!rules.is_grey(&mob, &Entity::player("Close", 21)));
        assert!(!rules.is_grey(&Entity::npc("Rat", 1), &Entity::player("Any", 1)));
    }

    #[test]
    fn damage_scales_with_level() {
        let rules = StandardRules::default();
        let mut rng = StdRng::seed_from_u64(5);
        let target = Entity::player("Dummy", 1);
        let hit = rules.melee_damage(&Entity::npc("Ogre", 10), &target, &mut rng);
        assert!((20..=30).contains(&hit));
        let bolt = Spell::offensive("Bolt", 1500, 2500, 40);
        let dmg = rules.spell_damage(&Entity::npc("Mage", 10), &target, &bolt, &mut rng);
        assert!((50..=55).contains(&dmg));
        let heal = Spell::defensive("Mend", 1500, 2000, 25);
        assert_eq!(rules.heal_amount(&target, &target, &heal), 25);
    }
}
