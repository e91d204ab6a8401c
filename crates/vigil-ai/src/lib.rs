//! Creature and pet AI for Vigil.
//!
//! Each region's state is a [`RegionWorld`]: its bodies, the brains attached
//! to them, and a bounded event log. Brains think on repeating scheduled
//! actions and react to [`Notification`]s pushed by the combat layer. A
//! [`WorldServer`] owns the regions and the shared [`WorldContext`].

/// Threat tables.
pub mod aggro;
/// Ambient sentences spoken on triggers.
pub mod ambient;
/// Brain trait, variants, and shared decision helpers.
pub mod brain;
/// Lazy name-keyed cache of ambient sentences.
pub mod cache;
/// Melee swings, spell casts, damage, and movement intents.
pub mod combat;
/// AI and server configuration.
pub mod config;
/// What a brain sees while it runs.
pub mod context;
/// Error types used throughout the crate.
pub mod error;
/// The per-region event log.
pub mod event;
/// Straight-line movement along intents.
pub mod motion;
/// Push events delivered to brains.
pub mod notify;
/// Brain attachment and the think cycle.
pub mod registry;
/// Hostility and damage rules.
pub mod rules;
/// Server instance owning every region.
pub mod server;
/// Region state and the shared server context.
pub mod state;

/// Re-export aggro types.
pub use aggro::AggroTable;
/// Re-export ambient types.
pub use ambient::{AmbientBehaviour, AmbientTrigger, Voice};
/// Re-export brain types.
pub use brain::{
    AggressionState, AttackPolicy, Brain, BrainKind, CasterBrain, ControlledBrain, CrowdControl,
    CrowdControlBrain, FollowBrain, PetCommand, PetCommands, StandardBrain, WalkState,
};
/// Re-export cache types.
pub use cache::{BehaviourCache, BehaviourStore, JsonBehaviourStore, StaticBehaviourStore};
/// Re-export combat types.
pub use combat::{CastOutcome, CombatBook};
/// Re-export configuration.
pub use config::{AiConfig, ServerConfig};
/// Re-export the brain context.
pub use context::{BrainContext, BrainRequest};
/// Re-export error types.
pub use error::{AiError, AiResult};
/// Re-export event types.
pub use event::{EventLog, RegionEvent, RegionEventKind};
/// Re-export motion helpers.
pub use motion::{MOTION_INTERVAL_MS, start_motion};
/// Re-export notification types.
pub use notify::{CastFailure, Notification};
/// Re-export the registry.
pub use registry::BrainRegistry;
/// Re-export rule types.
pub use rules::{CombatRules, StandardRules};
/// Re-export the server.
pub use server::WorldServer;
/// Re-export region state types.
pub use state::{AiFire, AiRegion, AiScheduler, RegionWorld, WorldContext};
