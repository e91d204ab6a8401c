use std::path::Path;

use serde::{Deserialize, Serialize};
use vigil_sched::SchedConfig;

use crate::error::{AiError, AiResult};

/// Tuning for brains, combat commands, and the per-region event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// RNG seed for deterministic rolls. Each region mixes in its own id.
    pub seed: u64,
    /// Targets farther than this are never picked as most wanted.
    pub max_aggro_distance: u32,
    /// Targets farther than this are dropped from the threat table.
    pub max_aggro_list_distance: u32,
    /// Pets ignore targets farther than this from themselves.
    pub max_pet_aggro_distance: u32,
    /// Think interval of every pet brain.
    pub pet_think_interval_ms: u64,
    /// Closest a following pet comes to its owner.
    pub min_owner_follow_distance: u32,
    /// A pet farther than this from its owner is released.
    pub max_owner_follow_distance: u32,
    /// Closest an attacker comes to its enemy.
    pub min_enemy_follow_distance: u32,
    /// Chase distance before an attacker gives up on its enemy.
    pub max_enemy_follow_distance: u32,
    /// Same-faction idle NPCs within this range join a fight.
    pub friend_call_range: u32,
    /// Percent chance per idle think that a mob roams.
    pub roam_chance: u8,
    /// Percent chance that a caster prefers a spell over a swing.
    pub spell_chance: u8,
    /// How far a feared body runs from its source.
    pub flee_distance: u32,
    /// Think interval of crowd-control brains.
    pub crowd_control_think_ms: u64,
    /// Event log capacity per region. 0 = unlimited.
    pub max_events: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_aggro_distance: 3600,
            max_aggro_list_distance: 6000,
            max_pet_aggro_distance: 512,
            pet_think_interval_ms: 1500,
            min_owner_follow_distance: 50,
            max_owner_follow_distance: 5000,
            min_enemy_follow_distance: 90,
            max_enemy_follow_distance: 512,
            friend_call_range: 250,
            roam_chance: 10,
            spell_chance: 50,
            flee_distance: 300,
            crowd_control_think_ms: 1000,
            max_events: 1000,
        }
    }
}

impl AiConfig {
    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the pet think interval.
    pub fn with_pet_think_interval_ms(mut self, ms: u64) -> Self {
        self.pet_think_interval_ms = ms;
        self
    }

    /// Set the roam chance.
    pub fn with_roam_chance(mut self, chance: u8) -> Self {
        self.roam_chance = chance.min(100);
        self
    }

    /// Set the caster spell preference.
    pub fn with_spell_chance(mut self, chance: u8) -> Self {
        self.spell_chance = chance.min(100);
        self
    }

    /// Set the event log capacity.
    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }
}

/// Everything a server instance is configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Region scheduling.
    pub scheduler: SchedConfig,
    /// Brain tuning.
    pub ai: AiConfig,
}

impl ServerConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> AiResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> AiResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| AiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> AiResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
