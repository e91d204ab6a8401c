//! Core types for Vigil: entities, stable handles, and the region registry.
//!
//! Every other layer refers to world objects through [`EntityId`] handles
//! resolved against a [`World`], never through direct references, so removing
//! an entity cannot leave a dangling back-reference behind.

/// Entity types, identifiers, and living stats.
pub mod entity;
/// Error types used throughout the crate.
pub mod error;
/// Points and distances inside a region.
pub mod geometry;
/// The per-region entity registry.
pub mod world;

/// Re-export core entity types.
pub use entity::{
    Entity, EntityId, EntityKind, Faction, Movement, ObjectState, RegionId, Spell, SpellKind,
};
/// Re-export error types.
pub use error::{CoreError, CoreResult};
/// Re-export geometry types.
pub use geometry::Point;
/// Re-export world model types.
pub use world::{World, WorldMeta};
