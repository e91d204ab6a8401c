use crate::entity::{EntityId, RegionId};

/// Alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur when manipulating a region's entity registry.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The requested entity ID does not exist in the world.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// An entity with the same handle is already registered.
    #[error("entity already registered: {0}")]
    DuplicateId(EntityId),

    /// The entity belongs to a different region than the registry.
    #[error("entity {entity} belongs to region {found}, not region {expected}")]
    WrongRegion {
        /// The rejected entity.
        entity: EntityId,
        /// Region of the registry.
        expected: RegionId,
        /// Region recorded on the entity.
        found: RegionId,
    },

    /// A generic validation error with a descriptive message.
    #[error("validation error: {0}")]
    Validation(String),
}
